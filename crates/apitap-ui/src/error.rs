//! Error types for the UI crate.

use thiserror::Error;

/// UI-specific errors.
#[derive(Debug, Error)]
pub enum UiError {
    /// The window could not be created or the event loop failed.
    #[error("window error: {0}")]
    Window(String),
}

/// Result type for UI operations.
pub type Result<T> = std::result::Result<T, UiError>;
