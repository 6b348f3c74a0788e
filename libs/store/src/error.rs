//! Errors surfaced by notification callbacks.

use thiserror::Error;

/// Error returned by a notification callback.
///
/// Callbacks are ultimately plugin hooks; the store never swallows these and
/// hands them back to whoever fed it the event.
#[derive(Debug, Error)]
pub enum HookError {
    /// The hook failed while doing I/O (log file, socket, ...).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The hook rejected the event.
    #[error("{hook} failed: {message}")]
    Handler { hook: &'static str, message: String },
}

impl HookError {
    /// Convenience constructor for [`HookError::Handler`].
    pub fn handler(hook: &'static str, message: impl Into<String>) -> Self {
        HookError::Handler {
            hook,
            message: message.into(),
        }
    }
}
