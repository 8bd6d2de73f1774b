//! Queue errors.

use std::time::Duration;

use thiserror::Error;

/// Queue error types.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Job type string does not name a known kind.
    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    /// A required payload field is missing or has the wrong shape.
    #[error("Invalid payload field '{field}': {reason}")]
    InvalidPayload { field: String, reason: String },

    /// Handler reported a failure.
    #[error("Handler failed: {0}")]
    Handler(String),

    /// A collaborator called by a handler failed.
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Handler attempt exceeded the configured timeout.
    #[error("Handler timed out after {0:?}")]
    Timeout(Duration),

    /// Handler task panicked.
    #[error("Handler panicked: {0}")]
    HandlerPanicked(String),

    /// Handler task was cancelled before it finished, e.g. by runtime shutdown.
    #[error("Handler task cancelled: {0}")]
    HandlerCancelled(String),

    /// Scheduler is not running.
    #[error("Scheduler is not running")]
    NotRunning,

    /// Scheduler is already running.
    #[error("Scheduler is already running")]
    AlreadyRunning,

    /// Dead-letter store error.
    #[error("Store error: {0}")]
    Store(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QueueError {
    /// Build an [`QueueError::InvalidPayload`].
    pub fn invalid_payload(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;
