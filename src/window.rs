//! Windowed observation accumulation
//!
//! A window is opened on demand, collects per-frame measurements pushed by the
//! capture thread, and is closed by a timer rather than a frame count. Closing
//! reduces the measurements to one score and a confidence:
//!
//! - score: mean over every frame produced during the window (neutral when empty)
//! - confidence: `min(tracked_frames / 10, 1.0)`

use crate::config::AnalysisConfig;
use crate::geometry::{ArmMeasurement, FaceMeasurement, GeometricAsymmetryScorer};
use crate::types::{ArmAnalysis, FaceAnalysis, FaceFrame, PoseFrame};
use log::debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Tracked frames at which window confidence saturates
pub const CONFIDENCE_SATURATION_FRAMES: usize = 10;

/// A per-frame measurement that may or may not have been derived from tracked landmarks
pub trait Measurement: Copy + Send + 'static {
    fn is_tracked(&self) -> bool;
}

impl Measurement for FaceMeasurement {
    fn is_tracked(&self) -> bool {
        FaceMeasurement::is_tracked(self)
    }
}

impl Measurement for ArmMeasurement {
    fn is_tracked(&self) -> bool {
        self.tracked
    }
}

#[derive(Debug)]
struct WindowState<M> {
    open: bool,
    measurements: Vec<M>,
}

/// Shared accumulator for one analysis window
///
/// Cloning yields another handle to the same window, so the capture thread and
/// the test runner can each hold one.
#[derive(Debug)]
pub struct ObservationWindow<M> {
    state: Arc<Mutex<WindowState<M>>>,
    length: Duration,
}

impl<M> Clone for ObservationWindow<M> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            length: self.length,
        }
    }
}

impl<M: Measurement> Default for ObservationWindow<M> {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

impl<M: Measurement> ObservationWindow<M> {
    /// Window lasting `config.window_secs`
    pub fn new(config: &AnalysisConfig) -> Self {
        Self::with_length(config.window())
    }

    pub fn with_length(length: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(WindowState {
                open: false,
                measurements: Vec::new(),
            })),
            length,
        }
    }

    /// How long a timed run keeps the window open
    pub fn length(&self) -> Duration {
        self.length
    }

    fn lock(&self) -> MutexGuard<'_, WindowState<M>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the window, discarding anything left from an earlier one
    pub fn open(&self) {
        let mut state = self.lock();
        state.open = true;
        state.measurements.clear();
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Record a measurement; ignored (returns false) while the window is closed
    pub fn record(&self, measurement: M) -> bool {
        let mut state = self.lock();
        if !state.open {
            return false;
        }
        state.measurements.push(measurement);
        true
    }

    /// Close the window and hand back everything it collected
    pub fn close(&self) -> Vec<M> {
        let mut state = self.lock();
        state.open = false;
        std::mem::take(&mut state.measurements)
    }

    /// Close the window and drop what it collected
    pub fn cancel(&self) {
        let discarded = self.close().len();
        debug!("Analysis window cancelled, {} measurements discarded", discarded);
    }

    /// Open the window, wait for it to elapse, then close it
    ///
    /// Never waits on the producer: a producer that stops early or never starts
    /// simply leaves fewer measurements.
    pub async fn collect_for(&self, duration: Duration) -> Vec<M> {
        self.open();
        tokio::time::sleep(duration).await;
        let measurements = self.close();
        debug!(
            "Analysis window closed after {:?} with {} measurements",
            duration,
            measurements.len()
        );
        measurements
    }
}

/// Window over face frames
pub type FaceWindow = ObservationWindow<FaceMeasurement>;

/// Window over pose frames
pub type ArmWindow = ObservationWindow<ArmMeasurement>;

impl ObservationWindow<FaceMeasurement> {
    /// Score a face frame and record it if the window is open
    pub fn push_frame(&self, scorer: &GeometricAsymmetryScorer, frame: &FaceFrame) -> bool {
        // Score outside the lock so the critical section stays a push
        let measurement = scorer.face(frame);
        self.record(measurement)
    }

    /// Run one timed face window
    pub async fn analyze(&self) -> FaceAnalysis {
        reduce_face(&self.collect_for(self.length).await)
    }
}

impl ObservationWindow<ArmMeasurement> {
    /// Score a pose frame and record it if the window is open
    pub fn push_frame(&self, scorer: &GeometricAsymmetryScorer, frame: &PoseFrame) -> bool {
        let measurement = scorer.arm(frame);
        self.record(measurement)
    }

    /// Run one timed arm window
    pub async fn analyze(&self) -> ArmAnalysis {
        reduce_arm(&self.collect_for(self.length).await)
    }
}

/// Confidence from the number of tracked frames
pub fn window_confidence(tracked_frames: usize) -> f64 {
    (tracked_frames as f64 / CONFIDENCE_SATURATION_FRAMES as f64).min(1.0)
}

/// Reduce face measurements to one analysis
pub fn reduce_face(measurements: &[FaceMeasurement]) -> FaceAnalysis {
    if measurements.is_empty() {
        return FaceAnalysis::neutral();
    }

    let valid_frames = measurements.iter().filter(|m| m.is_tracked()).count();
    let asymmetry = mean(measurements.iter().map(|m| m.asymmetry));

    FaceAnalysis {
        asymmetry: asymmetry.clamp(0.0, 1.0),
        confidence: window_confidence(valid_frames),
        frames: measurements.len(),
        valid_frames,
    }
}

/// Reduce arm measurements to one analysis
pub fn reduce_arm(measurements: &[ArmMeasurement]) -> ArmAnalysis {
    if measurements.is_empty() {
        return ArmAnalysis::neutral();
    }

    let valid_frames = measurements.iter().filter(|m| m.tracked).count();

    ArmAnalysis {
        drift: mean(measurements.iter().map(|m| m.drift)).clamp(0.0, 1.0),
        strength: mean(measurements.iter().map(|m| m.strength)).clamp(0.0, 1.0),
        confidence: window_confidence(valid_frames),
        frames: measurements.len(),
        valid_frames,
    }
}

/// Score a complete batch of face frames without a timer
pub fn analyze_face_frames(
    scorer: &GeometricAsymmetryScorer,
    frames: &[FaceFrame],
) -> FaceAnalysis {
    let measurements: Vec<FaceMeasurement> = frames.iter().map(|f| scorer.face(f)).collect();
    reduce_face(&measurements)
}

/// Score a complete batch of pose frames without a timer
pub fn analyze_pose_frames(
    scorer: &GeometricAsymmetryScorer,
    frames: &[PoseFrame],
) -> ArmAnalysis {
    let measurements: Vec<ArmMeasurement> = frames.iter().map(|f| scorer.arm(f)).collect();
    reduce_arm(&measurements)
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        crate::types::NEUTRAL_SCORE
    } else {
        sum / count as f64
    }
}
