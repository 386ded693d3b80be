//! Storage error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error on the capture file or an export target.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// IO error with the path it happened on.
    #[error("{path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writer error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Excel writer error.
    #[error("Excel error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    /// The table cannot be exported in the requested format.
    #[error("Export error: {0}")]
    Export(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error from the core crate.
    #[error(transparent)]
    Core(#[from] apitap_core::CoreError),
}

impl StorageError {
    /// Wraps an IO error with the path it happened on.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
