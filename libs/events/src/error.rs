//! Error types for event handling.

use thiserror::Error;

/// Errors that can occur when handling events.
#[derive(Debug, Error, Clone)]
pub enum EventError {
    /// The event type is unknown.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// The subscription category is unknown.
    #[error("unknown subscription category: {0}")]
    UnknownCategory(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Serialization(err.to_string())
    }
}
