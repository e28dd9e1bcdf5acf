//! Error types for FAST Screen

use thiserror::Error;

/// Errors that can occur while scoring, configuring or persisting screenings.
///
/// Scoring itself never fails on bad numbers: non-finite inputs are filtered and
/// unusable observations yield neutral results. These errors cover malformed
/// payloads, configuration and storage.
#[derive(Debug, Error)]
pub enum ScreeningError {
    #[error("Failed to parse payload: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Session storage error: {0}")]
    StorageError(String),

    #[error("No active screening session")]
    NoActiveSession,

    #[error("Recognition controller is no longer running")]
    ControllerClosed,
}
