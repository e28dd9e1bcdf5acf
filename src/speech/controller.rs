//! Recognition session controller
//!
//! Owns the lifecycle of speech recording sessions:
//!
//! ```text
//! Idle ──start──▶ Recording ──final / error / stop / timeout──▶ Finalizing ──▶ Idle
//!                     │
//!                     └──transient error (retries left)──▶ Idle + Resetting ──delay──▶ Idle
//! ```
//!
//! The controller runs as a single task. Callers, the backend and the timers
//! all talk to it over channels, so every transition happens on one task and
//! there is nothing to race. Each `start` gets exactly one completion: the
//! completion sender lives inside the active session, and finalizing takes the
//! session out of the controller before sending.

use super::backend::{
    BackendError, BackendEvent, BackendEventSink, RecognitionBackend, SessionEvent,
};
use super::clarity::SpeechClarityScorer;
use super::store::{SpeechSegmentStore, StoreUpdate};
use crate::config::RecognitionConfig;
use crate::error::ScreeningError;
use crate::types::{RejectReason, SpeechAnalysis, SpeechSegment, SpeechSessionEnd};
use log::{debug, info, warn};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Lifecycle state of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionState {
    Idle,
    Recording,
    Finalizing,
}

/// Point-in-time view of the controller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerStatus {
    pub state: RecognitionState,
    /// Backend reset in progress; new sessions are refused
    pub resetting: bool,
    /// Retryable errors absorbed since the last finalized session
    pub retries: u32,
    /// Live transcript of the current session
    pub transcript: String,
    pub session: Option<u64>,
}

enum Command {
    Start {
        expected: String,
        reply: oneshot::Sender<SpeechAnalysis>,
    },
    Stop,
    Status(oneshot::Sender<ControllerStatus>),
}

#[derive(Debug)]
enum TimerEvent {
    Timeout(u64),
    ResetDue,
}

/// Completion of a started session
///
/// Resolves exactly once. If the controller goes away before the session
/// finishes, it resolves to a rejected analysis instead of hanging.
#[derive(Debug)]
pub struct PendingAnalysis {
    rx: oneshot::Receiver<SpeechAnalysis>,
}

impl Future for PendingAnalysis {
    type Output = SpeechAnalysis;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(analysis)) => Poll::Ready(analysis),
            Poll::Ready(Err(_)) => {
                Poll::Ready(SpeechAnalysis::rejected(RejectReason::ControllerClosed))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Handle to a running recognition session controller
///
/// Cheap to clone; every clone drives the same controller. The controller task
/// shuts down when the last handle is dropped, finalizing any session still
/// recording.
#[derive(Debug, Clone)]
pub struct RecognitionSessionController {
    commands: mpsc::Sender<Command>,
    store: SpeechSegmentStore,
}

impl RecognitionSessionController {
    /// Spawn the controller task for `backend`.
    ///
    /// # Panics
    /// Must be called from within a Tokio runtime.
    pub fn spawn<B: RecognitionBackend>(backend: B, config: RecognitionConfig) -> Self {
        let capacity = config.channel_capacity.max(1);
        let (commands_tx, commands_rx) = mpsc::channel(capacity);
        let (events_tx, events_rx) = mpsc::channel(capacity);
        let (timers_tx, timers_rx) = mpsc::channel(8);
        let store = SpeechSegmentStore::new();

        let controller = SessionController {
            backend,
            config,
            store: store.clone(),
            state: RecognitionState::Idle,
            resetting: false,
            retries: 0,
            next_session: 0,
            session: None,
            reset_timer: None,
            events_tx,
            timers_tx,
        };

        tokio::spawn(controller.run(commands_rx, events_rx, timers_rx));

        Self {
            commands: commands_tx,
            store,
        }
    }

    /// Start recording against `expected_text`.
    ///
    /// Always yields exactly one completion. A refused start (already recording,
    /// resetting, backend unavailable) completes immediately with a zero score.
    pub async fn start(&self, expected_text: impl Into<String>) -> PendingAnalysis {
        let (reply, rx) = oneshot::channel();
        let command = Command::Start {
            expected: expected_text.into(),
            reply,
        };
        if self.commands.send(command).await.is_err() {
            // The reply sender was dropped with the command; the pending analysis
            // resolves as rejected.
            debug!("Start requested after the recognition controller shut down");
        }
        PendingAnalysis { rx }
    }

    /// Start recording and invoke `on_complete` once the session finishes
    pub async fn start_with<F>(&self, expected_text: impl Into<String>, on_complete: F)
    where
        F: FnOnce(SpeechAnalysis) + Send + 'static,
    {
        let pending = self.start(expected_text).await;
        tokio::spawn(async move {
            on_complete(pending.await);
        });
    }

    /// Stop the current recording and finalize it.
    ///
    /// Safe to call any number of times from anywhere; a no-op unless a session
    /// is recording.
    pub async fn stop(&self) {
        if self.commands.send(Command::Stop).await.is_err() {
            debug!("Stop requested after the recognition controller shut down");
        }
    }

    /// Current controller status
    pub async fn status(&self) -> Result<ControllerStatus, ScreeningError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Status(reply))
            .await
            .map_err(|_| ScreeningError::ControllerClosed)?;
        rx.await.map_err(|_| ScreeningError::ControllerClosed)
    }

    /// Segments of the current (or last) session, for live display
    pub fn live_segments(&self) -> Arc<[SpeechSegment]> {
        self.store.snapshot()
    }
}

struct ActiveSession {
    id: u64,
    expected: String,
    transcript: String,
    reply: oneshot::Sender<SpeechAnalysis>,
    timeout: JoinHandle<()>,
}

struct SessionController<B> {
    backend: B,
    config: RecognitionConfig,
    store: SpeechSegmentStore,
    state: RecognitionState,
    resetting: bool,
    retries: u32,
    next_session: u64,
    session: Option<ActiveSession>,
    reset_timer: Option<JoinHandle<()>>,
    events_tx: mpsc::Sender<SessionEvent>,
    timers_tx: mpsc::Sender<TimerEvent>,
}

impl<B: RecognitionBackend> SessionController<B> {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::Receiver<SessionEvent>,
        mut timers: mpsc::Receiver<TimerEvent>,
    ) {
        loop {
            // Backend events first so a stop never overtakes data already delivered
            tokio::select! {
                biased;
                Some(event) = events.recv() => self.handle_event(event),
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(timer) = timers.recv() => self.handle_timer(timer),
            }
        }

        self.shutdown();
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { expected, reply } => self.start(expected, reply),
            Command::Stop => self.stop(SpeechSessionEnd::Stopped),
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn status(&self) -> ControllerStatus {
        ControllerStatus {
            state: self.state,
            resetting: self.resetting,
            retries: self.retries,
            transcript: self
                .session
                .as_ref()
                .map(|s| s.transcript.clone())
                .unwrap_or_default(),
            session: self.session.as_ref().map(|s| s.id),
        }
    }

    fn start(&mut self, expected: String, reply: oneshot::Sender<SpeechAnalysis>) {
        let refusal = if self.resetting {
            Some(RejectReason::Resetting)
        } else if self.state != RecognitionState::Idle || self.session.is_some() {
            Some(RejectReason::AlreadyRecording)
        } else if !self.backend.is_available() {
            Some(RejectReason::Unavailable)
        } else {
            None
        };

        if let Some(reason) = refusal {
            info!("Refusing to start recording: {:?}", reason);
            let _ = reply.send(SpeechAnalysis::rejected(reason));
            return;
        }

        self.store.clear();
        self.next_session += 1;
        let id = self.next_session;

        let sink = BackendEventSink::new(id, self.events_tx.clone());
        if let Err(e) = self.backend.begin(sink) {
            warn!("Recognition backend failed to begin session {}: {}", id, e);
            self.release_backend();
            let _ = reply.send(SpeechAnalysis::rejected(RejectReason::BackendStart(
                e.to_string(),
            )));
            return;
        }

        let timeout = self.spawn_timer(self.config.timeout(), TimerEvent::Timeout(id));
        self.session = Some(ActiveSession {
            id,
            expected,
            transcript: String::new(),
            reply,
            timeout,
        });
        self.state = RecognitionState::Recording;
        info!("Recording session {} started", id);
    }

    fn stop(&mut self, end: SpeechSessionEnd) {
        if self.resetting || self.state != RecognitionState::Recording {
            debug!("Stop ignored in state {:?} (resetting: {})", self.state, self.resetting);
            return;
        }
        self.finalize(end);
    }

    fn handle_event(&mut self, SessionEvent { session, event }: SessionEvent) {
        let current = self.session.as_ref().map(|s| s.id);
        if current != Some(session) || self.state != RecognitionState::Recording {
            debug!("Dropping backend event for inactive session {}", session);
            return;
        }

        match event {
            BackendEvent::Update(update) => {
                if let StoreUpdate::Ignored { dropped } = self.store.replace_all(update.segments) {
                    debug!("Update with {} unusable segments left the store unchanged", dropped);
                }
                if let Some(active) = self.session.as_mut() {
                    active.transcript = update.text;
                }
                if update.is_final {
                    self.finalize(SpeechSessionEnd::FinalResult);
                }
            }
            BackendEvent::Error(error) => self.handle_backend_error(error),
        }
    }

    fn handle_backend_error(&mut self, error: BackendError) {
        if !error.is_transient() {
            warn!("Recognition error: {}", error);
            self.finalize(SpeechSessionEnd::BackendError(error.to_string()));
            return;
        }

        if self.retries < self.config.max_retries && !self.resetting {
            self.retries += 1;
            warn!(
                "{}; resetting recognizer (retry {} of {})",
                error, self.retries, self.config.max_retries
            );
            self.begin_reset();
        } else {
            warn!("{}; no retries left, finishing session", error);
            self.finalize(SpeechSessionEnd::RetriesExhausted(error.to_string()));
        }
    }

    fn handle_timer(&mut self, timer: TimerEvent) {
        match timer {
            TimerEvent::Timeout(id) => {
                if self.session.as_ref().map(|s| s.id) == Some(id) {
                    info!("Recording session {} timed out", id);
                    self.stop(SpeechSessionEnd::TimedOut);
                }
            }
            TimerEvent::ResetDue => {
                self.reset_timer = None;
                if let Err(e) = self.backend.reinitialize() {
                    warn!("Recognizer reinitialization failed: {}", e);
                }
                self.resetting = false;
                info!("Recognizer reset complete");
            }
        }
    }

    /// Compute the result, release resources and deliver the completion
    fn finalize(&mut self, end: SpeechSessionEnd) {
        let Some(session) = self.session.take() else {
            debug!("Finalize requested with no active session");
            return;
        };
        self.state = RecognitionState::Finalizing;

        let snapshot = self.store.snapshot();
        let analysis = if snapshot.is_empty() {
            SpeechAnalysis::neutral(session.transcript.clone(), end)
        } else {
            let score =
                SpeechClarityScorer::score(&snapshot, &session.transcript, &session.expected);
            SpeechAnalysis {
                clarity: score.clarity,
                confidence: score.confidence,
                transcript: session.transcript.clone(),
                text_similarity: score.text_similarity,
                segments: score.segments,
                end,
            }
        };

        session.timeout.abort();
        self.release_backend();
        self.retries = 0;
        self.state = RecognitionState::Idle;

        info!(
            "Recording session {} finished ({:?}): clarity {:.3}, confidence {:.3}",
            session.id, analysis.end, analysis.clarity, analysis.confidence
        );
        if session.reply.send(analysis).is_err() {
            debug!("Completion for session {} had no receiver", session.id);
        }
    }

    /// Abandon the current session and schedule a recognizer rebuild
    fn begin_reset(&mut self) {
        self.resetting = true;

        if let Some(session) = self.session.take() {
            session.timeout.abort();
            self.release_backend();
            let analysis =
                SpeechAnalysis::neutral(session.transcript, SpeechSessionEnd::BackendReset);
            if session.reply.send(analysis).is_err() {
                debug!("Completion for session {} had no receiver", session.id);
            }
        }

        self.store.clear();
        self.state = RecognitionState::Idle;

        let delay = self.config.reset_delay(self.retries);
        debug!("Recognizer reset scheduled in {:?}", delay);
        self.reset_timer = Some(self.spawn_timer(delay, TimerEvent::ResetDue));
    }

    fn release_backend(&mut self) {
        if let Err(e) = self.backend.release() {
            warn!("Failed to release recognition backend: {}", e);
        }
    }

    fn spawn_timer(&self, delay: Duration, event: TimerEvent) -> JoinHandle<()> {
        let tx = self.timers_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event).await;
        })
    }

    fn shutdown(&mut self) {
        if let Some(timer) = self.reset_timer.take() {
            timer.abort();
        }
        if self.session.is_some() {
            info!("Recognition controller shutting down with a session in progress");
            self.finalize(SpeechSessionEnd::Stopped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::backend::TranscriptionUpdate;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::sleep;

    const SENTENCE: &str = "The quick brown fox jumps over the lazy dog";

    #[derive(Default)]
    struct Probe {
        unavailable: AtomicBool,
        fail_begin: AtomicBool,
        begins: AtomicUsize,
        releases: AtomicUsize,
        reinits: AtomicUsize,
        sink: Mutex<Option<BackendEventSink>>,
    }

    impl Probe {
        fn sink(&self) -> BackendEventSink {
            self.sink.lock().unwrap().clone().expect("backend never began")
        }
    }

    struct ScriptedBackend {
        probe: Arc<Probe>,
    }

    impl RecognitionBackend for ScriptedBackend {
        fn is_available(&self) -> bool {
            !self.probe.unavailable.load(Ordering::SeqCst)
        }

        fn begin(&mut self, sink: BackendEventSink) -> Result<(), BackendError> {
            self.probe.begins.fetch_add(1, Ordering::SeqCst);
            if self.probe.fail_begin.load(Ordering::SeqCst) {
                return Err(BackendError::Fatal("audio engine failed".to_string()));
            }
            *self.probe.sink.lock().unwrap() = Some(sink);
            Ok(())
        }

        fn release(&mut self) -> Result<(), BackendError> {
            self.probe.releases.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::Fatal("audio session busy".to_string()))
        }

        fn reinitialize(&mut self) -> Result<(), BackendError> {
            self.probe.reinits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn controller() -> (RecognitionSessionController, Arc<Probe>) {
        controller_with(RecognitionConfig::default())
    }

    fn controller_with(config: RecognitionConfig) -> (RecognitionSessionController, Arc<Probe>) {
        let probe = Arc::new(Probe::default());
        let backend = ScriptedBackend {
            probe: Arc::clone(&probe),
        };
        (RecognitionSessionController::spawn(backend, config), probe)
    }

    fn update(text: &str, is_final: bool) -> BackendEvent {
        let segments = text
            .split_whitespace()
            .enumerate()
            .map(|(i, w)| SpeechSegment::new(w, 0.9, i as f64 * 0.4, 0.35))
            .collect();
        BackendEvent::Update(TranscriptionUpdate {
            text: text.to_string(),
            segments,
            is_final,
        })
    }

    fn transient() -> BackendEvent {
        BackendEvent::Error(BackendError::Transient("local recognition service".to_string()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_result_completes_with_score() {
        let (controller, probe) = controller();
        let pending = controller.start(SENTENCE).await;

        let sink = {
            // Let the controller process the start
            controller.status().await.unwrap();
            probe.sink()
        };
        sink.send(update("the quick brown", false)).await;
        sink.send(update("the quick brown fox", true)).await;

        let analysis = pending.await;
        assert_eq!(analysis.end, SpeechSessionEnd::FinalResult);
        assert_eq!(analysis.segments, 4);
        assert_eq!(analysis.transcript, "the quick brown fox");
        assert!((analysis.text_similarity - 4.0 / 9.0).abs() < 1e-12);
        assert!((analysis.confidence - 0.9).abs() < 1e-12);
        assert!((analysis.clarity - (0.9 + 4.0 / 9.0) / 2.0).abs() < 1e-12);

        // Release failures are logged, not fatal
        assert_eq!(probe.releases.load(Ordering::SeqCst), 1);
        let status = controller.status().await.unwrap();
        assert_eq!(status.state, RecognitionState::Idle);
        assert_eq!(status.session, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_backend_completes_immediately() {
        let (controller, probe) = controller();
        probe.unavailable.store(true, Ordering::SeqCst);

        let analysis = controller.start(SENTENCE).await.await;
        assert_eq!(analysis.end, SpeechSessionEnd::Rejected(RejectReason::Unavailable));
        assert_eq!((analysis.clarity, analysis.confidence), (0.0, 0.0));
        assert_eq!(probe.begins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_while_recording_is_refused() {
        let (controller, probe) = controller();
        let first = controller.start(SENTENCE).await;
        let second = controller.start(SENTENCE).await.await;

        assert_eq!(
            second.end,
            SpeechSessionEnd::Rejected(RejectReason::AlreadyRecording)
        );
        assert_eq!(probe.begins.load(Ordering::SeqCst), 1);

        controller.stop().await;
        assert_eq!(first.await.end, SpeechSessionEnd::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_finalizes_silent_session() {
        let (controller, probe) = controller();
        let started = tokio::time::Instant::now();

        let analysis = controller.start(SENTENCE).await.await;

        assert_eq!(analysis.end, SpeechSessionEnd::TimedOut);
        assert_eq!((analysis.clarity, analysis.confidence), (0.5, 0.0));
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert_eq!(probe.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_scores_partial_transcript() {
        let (controller, probe) = controller();
        let pending = controller.start(SENTENCE).await;
        controller.status().await.unwrap();
        probe.sink().send(update("the quick", false)).await;

        let analysis = pending.await;
        assert_eq!(analysis.end, SpeechSessionEnd::TimedOut);
        assert_eq!(analysis.segments, 2);
        assert!(analysis.confidence > 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_triggers_deliver_once() {
        let (controller, probe) = controller();
        let deliveries = Arc::new(AtomicUsize::new(0));
        let results = Arc::new(Mutex::new(Vec::new()));

        {
            let deliveries = Arc::clone(&deliveries);
            let results = Arc::clone(&results);
            controller
                .start_with(SENTENCE, move |analysis| {
                    deliveries.fetch_add(1, Ordering::SeqCst);
                    results.lock().unwrap().push(analysis);
                })
                .await;
        }
        controller.status().await.unwrap();

        let sink = probe.sink();
        sink.send(update("the quick brown fox", true)).await;
        sink.send(BackendEvent::Error(BackendError::Fatal("no speech detected".to_string())))
            .await;
        controller.stop().await;
        controller.stop().await;

        sleep(Duration::from_secs(60)).await;

        assert_eq!(deliveries.load(Ordering::SeqCst), 1);
        let results = results.lock().unwrap();
        assert_eq!(results[0].end, SpeechSessionEnd::FinalResult);
        assert_eq!(probe.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_finalizes_with_segments() {
        let (controller, probe) = controller();
        let pending = controller.start(SENTENCE).await;
        controller.status().await.unwrap();

        let sink = probe.sink();
        sink.send(update("the quick", false)).await;
        sink.send(BackendEvent::Error(BackendError::Fatal("network".to_string())))
            .await;

        let analysis = pending.await;
        assert!(matches!(analysis.end, SpeechSessionEnd::BackendError(_)));
        assert_eq!(analysis.segments, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_resets_backend() {
        let (controller, probe) = controller();
        let pending = controller.start(SENTENCE).await;
        controller.status().await.unwrap();
        probe.sink().send(transient()).await;

        let interrupted = pending.await;
        assert_eq!(interrupted.end, SpeechSessionEnd::BackendReset);
        assert_eq!((interrupted.clarity, interrupted.confidence), (0.5, 0.0));

        let status = controller.status().await.unwrap();
        assert!(status.resetting);
        assert_eq!(status.retries, 1);
        assert_eq!(status.state, RecognitionState::Idle);

        let refused = controller.start(SENTENCE).await.await;
        assert_eq!(refused.end, SpeechSessionEnd::Rejected(RejectReason::Resetting));

        // Stop during a reset must not release the backend again
        controller.stop().await;
        assert_eq!(probe.releases.load(Ordering::SeqCst), 1);

        sleep(RecognitionConfig::default().reset_delay(1) + Duration::from_millis(10)).await;

        let status = controller.status().await.unwrap();
        assert!(!status.resetting);
        assert_eq!(probe.reinits.load(Ordering::SeqCst), 1);

        let pending = controller.start(SENTENCE).await;
        controller.status().await.unwrap();
        probe.sink().send(update(SENTENCE, true)).await;
        let analysis = pending.await;
        assert_eq!(analysis.end, SpeechSessionEnd::FinalResult);
        assert_eq!(analysis.text_similarity, 1.0);
        assert_eq!(controller.status().await.unwrap().retries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_finalizes() {
        let (controller, probe) = controller();

        for attempt in 1..=2u32 {
            let pending = controller.start(SENTENCE).await;
            controller.status().await.unwrap();
            probe.sink().send(transient()).await;
            assert_eq!(pending.await.end, SpeechSessionEnd::BackendReset);
            sleep(RecognitionConfig::default().reset_delay(attempt) + Duration::from_millis(10))
                .await;
        }

        let pending = controller.start(SENTENCE).await;
        controller.status().await.unwrap();
        let sink = probe.sink();
        sink.send(update("the quick brown", false)).await;
        sink.send(transient()).await;

        let analysis = pending.await;
        assert!(matches!(analysis.end, SpeechSessionEnd::RetriesExhausted(_)));
        assert_eq!(analysis.segments, 3);
        assert_eq!(probe.reinits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_events_are_ignored() {
        let (controller, probe) = controller();

        let first = controller.start(SENTENCE).await;
        controller.status().await.unwrap();
        let old_sink = probe.sink();
        controller.stop().await;
        assert_eq!(first.await.end, SpeechSessionEnd::Stopped);

        let second = controller.start(SENTENCE).await;
        controller.status().await.unwrap();
        assert!(old_sink.send(update("lazy dog", true)).await);

        let status = controller.status().await.unwrap();
        assert_eq!(status.state, RecognitionState::Recording);
        assert_eq!(status.transcript, "");

        probe.sink().send(update("the quick", true)).await;
        let analysis = second.await;
        assert_eq!(analysis.transcript, "the quick");
    }

    #[tokio::test(start_paused = true)]
    async fn test_begin_failure_rejects_and_releases() {
        let (controller, probe) = controller();
        probe.fail_begin.store(true, Ordering::SeqCst);

        let analysis = controller.start(SENTENCE).await.await;
        assert!(matches!(
            analysis.end,
            SpeechSessionEnd::Rejected(RejectReason::BackendStart(_))
        ));
        assert_eq!(probe.releases.load(Ordering::SeqCst), 1);
        assert_eq!(
            controller.status().await.unwrap().state,
            RecognitionState::Idle
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_when_idle_is_noop() {
        let (controller, probe) = controller();
        controller.stop().await;
        controller.stop().await;
        assert_eq!(
            controller.status().await.unwrap().state,
            RecognitionState::Idle
        );
        assert_eq!(probe.releases.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_controller_finalizes_session() {
        let (controller, probe) = controller();
        let pending = controller.start(SENTENCE).await;
        controller.status().await.unwrap();
        drop(controller);

        let analysis = pending.await;
        assert_eq!(analysis.end, SpeechSessionEnd::Stopped);
        assert_eq!(probe.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_segments_follow_updates() {
        let (controller, probe) = controller();
        let _pending = controller.start(SENTENCE).await;
        controller.status().await.unwrap();
        probe.sink().send(update("the quick", false)).await;
        controller.status().await.unwrap();

        assert_eq!(controller.live_segments().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_timeout_keeps_controller_alive() {
        let (controller, _probe) = controller_with(RecognitionConfig {
            timeout_secs: 1e20,
            ..RecognitionConfig::default()
        });

        let pending = controller.start(SENTENCE).await;
        assert_eq!(
            controller.status().await.unwrap().state,
            RecognitionState::Recording
        );
        controller.stop().await;

        assert_eq!(pending.await.end, SpeechSessionEnd::Stopped);
        assert!(controller.status().await.is_ok());
    }

    #[tokio::test]
    async fn test_backend_thread_delivers_with_blocking_send() {
        let (controller, probe) = controller();
        let pending = controller.start(SENTENCE).await;
        controller.status().await.unwrap();

        let sink = probe.sink();
        let recognizer = std::thread::spawn(move || {
            ["the", "the quick", "the quick brown"]
                .into_iter()
                .all(|text| sink.blocking_send(update(text, false)))
        });
        assert!(recognizer.join().unwrap());

        controller.stop().await;
        let analysis = pending.await;
        assert_eq!(analysis.end, SpeechSessionEnd::Stopped);
        assert_eq!(analysis.transcript, "the quick brown");
        assert_eq!(analysis.segments, 3);
    }
}
