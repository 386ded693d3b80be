//! Proxy executable discovery and availability probing.
//!
//! The probe runs `<executable> --version` with a hard deadline. A proxy that
//! waits for input or hangs is killed when the deadline passes, so probing
//! never blocks the caller for longer than the timeout.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{ProxyError, Result};
use crate::output::OutputCollector;

/// Executable used when none is configured.
pub const DEFAULT_EXECUTABLE: &str = "mitmdump";

/// Default deadline for `--version`.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const WAIT_POLL: Duration = Duration::from_millis(20);

/// A successful probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    /// The executable that answered.
    pub executable: PathBuf,
    /// First non-empty line of its `--version` output.
    pub version: String,
}

/// Runs `executable --version` and waits at most `timeout` for it.
pub fn probe(executable: &Path, timeout: Duration) -> Result<ProbeReport> {
    debug!("Probing {:?}", executable);

    let mut command = Command::new(executable);
    command
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    hide_console(&mut command);

    let mut child = command
        .spawn()
        .map_err(|e| ProxyError::spawn(executable, e))?;

    let mut stdout = child.stdout.take().map(OutputCollector::spawn);

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            warn!("{:?} --version timed out, killing it", executable);
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProxyError::ProbeTimeout {
                executable: executable.to_path_buf(),
                timeout,
            });
        }
        std::thread::sleep(WAIT_POLL);
    };

    if !status.success() {
        return Err(ProxyError::ProbeFailed {
            executable: executable.to_path_buf(),
            status: status.to_string(),
        });
    }

    let output = stdout
        .as_mut()
        .map(|collector| collector.finish(Duration::from_millis(500)))
        .unwrap_or_default();
    let version = output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string();

    Ok(ProbeReport {
        executable: executable.to_path_buf(),
        version,
    })
}

/// Picks the proxy executable to launch.
///
/// Order: the explicitly configured path, then the default name on `PATH`,
/// then a copy next to the running binary. The default name is returned
/// when nothing answers, so the eventual spawn error names it.
pub fn locate(explicit: Option<&Path>, timeout: Duration) -> PathBuf {
    if let Some(path) = explicit {
        debug!("Using configured proxy executable {:?}", path);
        return path.to_path_buf();
    }

    let candidates = std::iter::once(PathBuf::from(DEFAULT_EXECUTABLE)).chain(bundled_executable());
    for candidate in candidates {
        match probe(&candidate, timeout) {
            Ok(report) => {
                info!("Found proxy {:?} ({})", report.executable, report.version);
                return report.executable;
            }
            Err(e) => debug!("Proxy candidate {:?} unavailable: {}", candidate, e),
        }
    }

    PathBuf::from(DEFAULT_EXECUTABLE)
}

/// The default executable in the directory of the running binary, if present.
fn bundled_executable() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let name = format!("{}{}", DEFAULT_EXECUTABLE, std::env::consts::EXE_SUFFIX);
    let path = exe.parent()?.join(name);
    path.is_file().then_some(path)
}

/// Keeps probe and proxy processes from flashing a console window.
#[cfg(target_os = "windows")]
pub(crate) fn hide_console(command: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    command.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(target_os = "windows"))]
pub(crate) fn hide_console(_command: &mut Command) {}
