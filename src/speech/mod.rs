//! Speech test: segment storage, clarity scoring and the recognition session controller

pub mod backend;
pub mod clarity;
pub mod controller;
pub mod store;

pub use backend::{
    BackendError, BackendEvent, BackendEventSink, RecognitionBackend, TranscriptionUpdate,
};
pub use clarity::{text_similarity, ClarityScore, SpeechClarityScorer};
pub use controller::{
    ControllerStatus, PendingAnalysis, RecognitionSessionController, RecognitionState,
};
pub use store::{SpeechSegmentStore, StoreUpdate};
