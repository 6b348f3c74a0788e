//! Error types for identifier parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The name string is empty.
    #[error("{kind} cannot be empty")]
    Empty { kind: &'static str },

    /// The offset is negative.
    #[error("offset must be non-negative, got {0}")]
    NegativeOffset(i64),

    /// The numeric value could not be parsed.
    #[error("invalid {kind}: {message}")]
    InvalidNumber {
        kind: &'static str,
        message: String,
    },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty { .. })
    }
}
