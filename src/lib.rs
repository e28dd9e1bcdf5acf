//! FAST Screen - On-device scoring core for FAST stroke screening
//!
//! FAST Screen turns already-extracted perceptual data into per-test verdicts and
//! an overall risk tier through a deterministic pipeline: landmark frames →
//! geometric asymmetry → windowed accumulation → verdict, and transcription
//! segments → segment store → clarity score → verdict, with three verdicts →
//! risk aggregation → saved session.
//!
//! ## Modules
//!
//! - **Face and arm tests**: [`geometry`] scores single frames, [`window`] accumulates
//!   them over a fixed analysis window
//! - **Speech test**: [`speech`] holds segment storage, clarity scoring and the
//!   recognition session controller that drives a platform recognizer
//! - **Risk**: [`risk`] derives verdicts and aggregates them into a tier
//! - **Sessions**: [`session`] records results and persists history

pub mod config;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod risk;
pub mod session;
pub mod speech;
pub mod types;
pub mod window;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::{AggregationPolicy, LowConfidencePolicy, ScreeningConfig};
pub use error::ScreeningError;
pub use geometry::GeometricAsymmetryScorer;
pub use pipeline::{
    assess_json, score_face_frames_json, score_pose_frames_json, score_speech_json,
    ScreeningProcessor, TestResult,
};
pub use risk::{RiskAggregator, RiskAssessment, VerdictPolicy};
pub use session::{
    InMemorySessionRepository, JsonFileSessionRepository, Session, SessionRepository,
};
pub use speech::{
    RecognitionBackend, RecognitionSessionController, SpeechClarityScorer, SpeechSegmentStore,
};
pub use types::{RiskTier, TestKind, TestVerdict};
pub use window::{ArmWindow, FaceWindow, ObservationWindow};

/// Library version
pub const FAST_SCREEN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "fast-screen";
