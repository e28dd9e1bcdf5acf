//! Recognition backend boundary
//!
//! The platform speech recognizer lives outside this crate. It is driven through
//! the [`RecognitionBackend`] trait and reports back by pushing [`BackendEvent`]s
//! into a bounded channel through a [`BackendEventSink`]. Every sink is bound to
//! one recording session, so events that arrive after that session was torn down
//! are recognized as stale and dropped.

use crate::types::SpeechSegment;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// A partial or final transcription from the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionUpdate {
    /// Best transcript so far
    pub text: String,
    /// Full segment list for the best transcript
    pub segments: Vec<SpeechSegment>,
    #[serde(default)]
    pub is_final: bool,
}

/// Errors reported by the recognition backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Recognition service hiccup that a reset usually clears
    #[error("transient recognition service error: {0}")]
    Transient(String),

    #[error("recognition error: {0}")]
    Fatal(String),
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient(_))
    }
}

/// Something the backend reports while recording
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    Update(TranscriptionUpdate),
    Error(BackendError),
}

#[derive(Debug)]
pub(crate) struct SessionEvent {
    pub(crate) session: u64,
    pub(crate) event: BackendEvent,
}

/// Handle the backend uses to deliver events for one recording session
#[derive(Debug, Clone)]
pub struct BackendEventSink {
    session: u64,
    tx: mpsc::Sender<SessionEvent>,
}

impl BackendEventSink {
    pub(crate) fn new(session: u64, tx: mpsc::Sender<SessionEvent>) -> Self {
        Self { session, tx }
    }

    /// Session this sink belongs to
    pub fn session(&self) -> u64 {
        self.session
    }

    fn wrap(&self, event: BackendEvent) -> SessionEvent {
        SessionEvent {
            session: self.session,
            event,
        }
    }

    /// Deliver an event, waiting for channel capacity. Returns false once the
    /// controller has shut down.
    pub async fn send(&self, event: BackendEvent) -> bool {
        self.tx.send(self.wrap(event)).await.is_ok()
    }

    /// Deliver an event from a non-async backend thread.
    ///
    /// Must not be called from within an async context.
    pub fn blocking_send(&self, event: BackendEvent) -> bool {
        self.tx.blocking_send(self.wrap(event)).is_ok()
    }

    /// Deliver an event without waiting; false if the channel is full or closed
    pub fn try_send(&self, event: BackendEvent) -> bool {
        self.tx.try_send(self.wrap(event)).is_ok()
    }
}

/// Platform speech recognizer driven by the session controller
///
/// Implementations own the audio tap, the recognition request and the audio
/// session. All methods are called from the controller task and must not block
/// for long.
pub trait RecognitionBackend: Send + 'static {
    /// Microphone and recognition permissions granted and the recognizer usable
    fn is_available(&self) -> bool;

    /// Start capturing and deliver transcription events through `sink` until released
    fn begin(&mut self, sink: BackendEventSink) -> Result<(), BackendError>;

    /// Stop capturing: remove the audio tap, end the request, deactivate the audio session
    fn release(&mut self) -> Result<(), BackendError>;

    /// Rebuild the recognizer after a transient failure
    fn reinitialize(&mut self) -> Result<(), BackendError>;
}
