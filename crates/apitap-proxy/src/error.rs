//! Error types for the proxy.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Proxy error type.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The proxy executable does not exist.
    #[error("Proxy executable not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The proxy executable exists but could not be launched.
    #[error("Failed to launch {}: {source}", executable.display())]
    Spawn {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The proxy exited within the startup grace period.
    #[error("Proxy exited during startup ({status}): {stderr}")]
    StartupFailed { status: String, stderr: String },

    /// The configured hook script does not exist.
    #[error("Hook script not found: {}", .0.display())]
    HookNotFound(PathBuf),

    /// The bundled hook script could not be written.
    #[error("Failed to install hook script {}: {source}", path.display())]
    HookInstall {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `--version` exited unsuccessfully.
    #[error("{} --version failed ({status})", executable.display())]
    ProbeFailed { executable: PathBuf, status: String },

    /// `--version` did not finish in time and was killed.
    #[error("{} --version did not finish within {timeout:?}", executable.display())]
    ProbeTimeout {
        executable: PathBuf,
        timeout: Duration,
    },
}

impl ProxyError {
    /// Maps a spawn failure, separating a missing executable from other causes.
    pub(crate) fn spawn(executable: &std::path::Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(executable.to_path_buf())
        } else {
            Self::Spawn {
                executable: executable.to_path_buf(),
                source,
            }
        }
    }
}

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;
