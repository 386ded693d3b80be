//! The capture hook handed to the proxy with `--scripts`.
//!
//! A mitmproxy addon ships inside the binary. Before launch it is written to
//! disk unless the settings point at a script of their own. The addon pipes
//! every response into `apitap sink`, which filters and appends to the
//! capture file.

use std::path::{Path, PathBuf};

use apitap_core::DEFAULT_HOOK_SCRIPT;
use tracing::{debug, info};

use crate::error::{ProxyError, Result};

/// Source of the bundled mitmproxy addon.
pub const HOOK_SOURCE: &str = include_str!("../assets/mitm_writer.py");

/// Environment variable naming the executable the hook runs as its sink.
pub const SINK_EXECUTABLE_ENV: &str = "APITAP_BIN";

/// Writes the bundled hook into `dir` and returns its path.
///
/// An existing file with the same content is left untouched.
pub fn install_hook(dir: &Path) -> Result<PathBuf> {
    let path = dir.join(DEFAULT_HOOK_SCRIPT);
    let install_error = |source| ProxyError::HookInstall {
        path: path.clone(),
        source,
    };

    if let Ok(existing) = std::fs::read_to_string(&path) {
        if existing == HOOK_SOURCE {
            debug!("Hook script up to date at {}", path.display());
            return Ok(path);
        }
    }

    std::fs::create_dir_all(dir).map_err(install_error)?;
    std::fs::write(&path, HOOK_SOURCE).map_err(install_error)?;
    info!("Installed hook script at {}", path.display());
    Ok(path)
}

/// Resolves the script to pass with `--scripts`.
///
/// A script that exists is used as is. The default name, when missing, is
/// replaced by the bundled hook installed into `install_dir`. Any other
/// missing path is an error.
pub fn resolve_hook(configured: &Path, install_dir: &Path) -> Result<PathBuf> {
    if configured.is_file() {
        return Ok(configured.to_path_buf());
    }
    if configured == Path::new(DEFAULT_HOOK_SCRIPT) {
        return install_hook(install_dir);
    }
    Err(ProxyError::HookNotFound(configured.to_path_buf()))
}
