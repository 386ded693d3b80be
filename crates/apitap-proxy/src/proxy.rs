//! Intercepting proxy process.
//!
//! [`ProxyProcess`] owns one child process. [`ProxyProcess::spawn`] only
//! returns once the child has survived the startup grace period, and
//! [`ProxyProcess::stop`] always returns within a bounded time.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use apitap_core::{
    AllowList, ALLOWED_DOMAINS_ENV, DEFAULT_HOOK_SCRIPT, DEFAULT_LISTEN_HOST, DEFAULT_PROXY_PORT,
};
use tracing::{debug, error, info, warn};

use crate::error::{ProxyError, Result};
use crate::hook::SINK_EXECUTABLE_ENV;
use crate::locate::{hide_console, DEFAULT_EXECUTABLE};
use crate::output::OutputCollector;

/// Environment variable carrying the capture file path to the hook.
pub const CAPTURE_FILE_ENV: &str = "CAPTURE_FILE";

/// Page served by the proxy for installing its certificate.
pub const CERT_INSTALL_URL: &str = "http://mitm.it/";

/// How long the child must stay alive to count as started.
pub const DEFAULT_STARTUP_GRACE: Duration = Duration::from_secs(1);

/// How long each stop phase waits for the child to exit.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

const WAIT_POLL: Duration = Duration::from_millis(25);
const STDERR_SETTLE: Duration = Duration::from_millis(500);

/// Proxy launch configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Executable to launch.
    pub executable: PathBuf,
    /// Address the proxy binds to.
    pub listen_host: String,
    /// Port the proxy listens on.
    pub port: u16,
    /// Hook script passed with `--scripts`.
    pub hook_script: PathBuf,
    /// Hosts the hook records, passed through `ALLOWED_DOMAINS`.
    pub allow_list: AllowList,
    /// Capture file the hook appends to, passed through `CAPTURE_FILE`.
    pub capture_file: Option<PathBuf>,
    /// Executable the hook runs as its sink, passed through `APITAP_BIN`.
    pub sink_executable: Option<PathBuf>,
    /// Working directory for the child.
    pub working_dir: Option<PathBuf>,
    /// Startup grace period.
    pub startup_grace: Duration,
    /// Per-phase stop timeout.
    pub stop_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from(DEFAULT_EXECUTABLE),
            listen_host: DEFAULT_LISTEN_HOST.to_string(),
            port: DEFAULT_PROXY_PORT,
            hook_script: PathBuf::from(DEFAULT_HOOK_SCRIPT),
            allow_list: AllowList::new(),
            capture_file: None,
            sink_executable: None,
            working_dir: None,
            startup_grace: DEFAULT_STARTUP_GRACE,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

impl ProxyConfig {
    /// Creates a configuration for `executable` with default settings.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            ..Self::default()
        }
    }

    /// Sets the listen port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the listen address.
    pub fn with_listen_host(mut self, host: impl Into<String>) -> Self {
        self.listen_host = host.into();
        self
    }

    /// Sets the hook script.
    pub fn with_hook_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.hook_script = script.into();
        self
    }

    /// Sets the allow-list handed to the hook.
    pub fn with_allow_list(mut self, allow_list: AllowList) -> Self {
        self.allow_list = allow_list;
        self
    }

    /// Sets the capture file handed to the hook.
    pub fn with_capture_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.capture_file = Some(path.into());
        self
    }

    /// Sets the executable the hook pipes exchanges into.
    pub fn with_sink_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.sink_executable = Some(path.into());
        self
    }

    /// Sets the child's working directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Sets the startup grace period.
    pub fn with_startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    /// Sets the per-phase stop timeout.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Command-line arguments for the proxy.
    pub fn args(&self) -> Vec<OsString> {
        vec![
            "--listen-port".into(),
            self.port.to_string().into(),
            "--listen-host".into(),
            self.listen_host.clone().into(),
            "--scripts".into(),
            self.hook_script.clone().into_os_string(),
        ]
    }

    /// Address clients on this machine use to reach the proxy.
    pub fn local_addr(&self) -> String {
        format!("{}:{}", crate::diagnostics::connect_host(&self.listen_host), self.port)
    }

    /// Proxy URL for HTTP clients on this machine.
    pub fn proxy_url(&self) -> String {
        format!("http://{}", self.local_addr())
    }

    /// One-line instructions shown after a successful start.
    pub fn connection_hint(&self) -> String {
        format!(
            "Proxy listening on {}:{}. Point your device at this machine's address and port {}, then install the certificate from {}",
            self.listen_host, self.port, self.port, CERT_INSTALL_URL
        )
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.executable);
        command
            .args(self.args())
            .env(ALLOWED_DOMAINS_ENV, self.allow_list.to_env_value())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        if let Some(path) = &self.capture_file {
            command.env(CAPTURE_FILE_ENV, path);
        }
        if let Some(path) = &self.sink_executable {
            command.env(SINK_EXECUTABLE_ENV, path);
        }
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        hide_console(&mut command);
        command
    }
}

/// How a stop request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The child exited after the termination request.
    Graceful,
    /// The child had to be killed.
    Killed,
    /// The child had already exited.
    AlreadyExited,
    /// The child did not exit even after being killed; the handle was dropped.
    Abandoned,
}

impl StopOutcome {
    /// Returns display text.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Graceful => "stopped",
            Self::Killed => "killed",
            Self::AlreadyExited => "already exited",
            Self::Abandoned => "abandoned",
        }
    }
}

/// A running proxy child process.
///
/// Dropping a still-running process kills it.
#[derive(Debug)]
pub struct ProxyProcess {
    child: Child,
    config: ProxyConfig,
    stderr: Option<OutputCollector>,
    started_at: Instant,
}

impl ProxyProcess {
    /// Launches the proxy and waits out the startup grace period.
    ///
    /// Fails with [`ProxyError::StartupFailed`] carrying the child's stderr
    /// if it exits before the grace period ends.
    pub fn spawn(config: ProxyConfig) -> Result<Self> {
        info!(
            "Starting proxy {:?} on {}:{}",
            config.executable, config.listen_host, config.port
        );

        let mut child = config
            .command()
            .spawn()
            .map_err(|e| ProxyError::spawn(&config.executable, e))?;
        let mut stderr = child.stderr.take().map(OutputCollector::spawn);

        let deadline = Instant::now() + config.startup_grace;
        loop {
            let exited = match child.try_wait() {
                Ok(exited) => exited,
                Err(e) => return Err(abort_startup(&mut child, e)),
            };
            if let Some(status) = exited {
                let stderr = stderr
                    .as_mut()
                    .map(|collector| collector.finish(STDERR_SETTLE))
                    .unwrap_or_default();
                error!("Proxy exited during startup: {}", status);
                return Err(ProxyError::StartupFailed {
                    status: status.to_string(),
                    stderr: stderr.trim().to_string(),
                });
            }
            if Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(WAIT_POLL);
        }

        info!("Proxy running (pid {})", child.id());
        Ok(Self {
            child,
            config,
            stderr,
            started_at: Instant::now(),
        })
    }

    /// OS process id.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// The configuration the process was started with.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Time since the process passed its startup check.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Returns the exit status if the process has exited.
    pub fn try_status(&mut self) -> Result<Option<ExitStatus>> {
        Ok(self.child.try_wait()?)
    }

    /// Returns true while the process is alive.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Stderr captured so far.
    pub fn stderr_output(&self) -> String {
        self.stderr
            .as_ref()
            .map(OutputCollector::text)
            .unwrap_or_default()
    }

    /// Stops the process without ever blocking indefinitely.
    ///
    /// Requests termination, waits up to the stop timeout, kills, waits
    /// again, and finally gives up on the handle.
    pub fn stop(mut self) -> StopOutcome {
        let pid = self.child.id();
        let timeout = self.config.stop_timeout;

        match self.child.try_wait() {
            Ok(Some(status)) => {
                info!("Proxy (pid {}) had already exited: {}", pid, status);
                return StopOutcome::AlreadyExited;
            }
            Ok(None) => {}
            Err(e) => warn!("Could not query proxy status: {}", e),
        }

        if request_termination(pid) {
            if wait_for_exit(&mut self.child, timeout) {
                info!("Proxy (pid {}) stopped", pid);
                return StopOutcome::Graceful;
            }
            warn!("Proxy (pid {}) ignored termination for {:?}", pid, timeout);
        } else {
            debug!("Termination request for pid {} not delivered", pid);
        }

        if let Err(e) = self.child.kill() {
            warn!("Failed to kill proxy (pid {}): {}", pid, e);
        }
        if wait_for_exit(&mut self.child, timeout) {
            info!("Proxy (pid {}) killed", pid);
            return StopOutcome::Killed;
        }

        error!("Proxy (pid {}) did not exit, abandoning it", pid);
        StopOutcome::Abandoned
    }

    /// Path of the executable.
    pub fn executable(&self) -> &Path {
        &self.config.executable
    }
}

impl Drop for ProxyProcess {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            debug!("Killing proxy (pid {}) on drop", self.child.id());
            let _ = self.child.kill();
            let _ = wait_for_exit(&mut self.child, WAIT_POLL * 4);
        }
    }
}

/// Kills and reaps a child whose status could not be read during startup.
fn abort_startup(child: &mut Child, cause: std::io::Error) -> ProxyError {
    error!("Could not query proxy (pid {}) during startup: {}", child.id(), cause);
    if let Err(e) = child.kill() {
        debug!("Kill after failed status query: {}", e);
    }
    if let Err(e) = child.wait() {
        debug!("Reap after failed status query: {}", e);
    }
    ProxyError::Io(cause)
}

fn wait_for_exit(child: &mut Child, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) => {}
            Err(_) => return false,
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(WAIT_POLL);
    }
}

/// Asks the process to exit. Returns whether the request was delivered.
#[cfg(unix)]
fn request_termination(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: kill(2) takes no pointers. The pid belongs to a child this
    // process has not reaped yet, so it cannot have been recycled.
    unsafe { libc::kill(pid, libc::SIGTERM) == 0 }
}

#[cfg(target_os = "windows")]
fn request_termination(pid: u32) -> bool {
    let mut command = Command::new("taskkill");
    command
        .args(["/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    hide_console(&mut command);
    command
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(not(any(unix, target_os = "windows")))]
fn request_termination(_pid: u32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ProxyConfig::default();
        assert_eq!(config.executable, PathBuf::from("mitmdump"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.listen_host, "0.0.0.0");
        assert_eq!(config.startup_grace, Duration::from_secs(1));
        assert_eq!(config.stop_timeout, Duration::from_secs(5));
    }

    #[test]
    fn args_follow_cli_contract() {
        let config = ProxyConfig::new("mitmdump")
            .with_port(9000)
            .with_listen_host("127.0.0.1")
            .with_hook_script("hooks/writer.py");

        let args: Vec<String> = config
            .args()
            .into_iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            [
                "--listen-port",
                "9000",
                "--listen-host",
                "127.0.0.1",
                "--scripts",
                "hooks/writer.py"
            ]
        );
    }

    #[test]
    fn hint_names_port_and_certificate_page() {
        let hint = ProxyConfig::default().with_port(8888).connection_hint();
        assert!(hint.contains("8888"));
        assert!(hint.contains(CERT_INSTALL_URL));
    }

    #[test]
    fn wildcard_listen_host_connects_locally() {
        assert_eq!(ProxyConfig::default().proxy_url(), "http://127.0.0.1:8080");
    }
}

#[cfg(all(test, unix))]
mod process_tests {
    use super::*;
    use crate::test_support::{script, SPAWN_LOCK};
    use tempfile::TempDir;

    fn config_for(exe: PathBuf) -> ProxyConfig {
        ProxyConfig::new(exe)
            .with_startup_grace(Duration::from_millis(300))
            .with_stop_timeout(Duration::from_millis(500))
    }

    #[test]
    fn running_process_stops_gracefully() {
        let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = TempDir::new().unwrap();
        let exe = script(&dir, "proxy", "exec sleep 30");

        let mut process = ProxyProcess::spawn(config_for(exe)).unwrap();
        assert!(process.is_running());

        assert_eq!(process.stop(), StopOutcome::Graceful);
    }

    #[test]
    fn early_exit_is_startup_failure_with_stderr() {
        let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = TempDir::new().unwrap();
        let exe = script(&dir, "proxy", "echo 'Address already in use' >&2\nexit 3");

        let err = ProxyProcess::spawn(config_for(exe).with_startup_grace(Duration::from_secs(3)))
            .unwrap_err();

        match err {
            ProxyError::StartupFailed { stderr, .. } => {
                assert!(stderr.contains("Address already in use"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_executable_is_not_found() {
        let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let err = ProxyProcess::spawn(config_for(PathBuf::from("/nonexistent/mitmdump")))
            .unwrap_err();
        assert!(matches!(err, ProxyError::NotFound(_)));
    }

    #[test]
    fn child_receives_allow_list_capture_file_and_sink() {
        let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("env.txt");
        let sink_out = dir.path().join("sink.txt");
        let exe = script(
            &dir,
            "proxy",
            &format!(
                "printf '%s' \"$ALLOWED_DOMAINS\" > \"$CAPTURE_FILE\"\nprintf '%s' \"$APITAP_BIN\" > \"{}\"\nexec sleep 30",
                sink_out.display()
            ),
        );

        let config = config_for(exe)
            .with_allow_list(AllowList::parse("a.example.com,b.example.com"))
            .with_capture_file(&out)
            .with_sink_executable("/usr/local/bin/apitap");
        let process = ProxyProcess::spawn(config).unwrap();
        process.stop();

        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "a.example.com,b.example.com"
        );
        assert_eq!(
            std::fs::read_to_string(&sink_out).unwrap(),
            "/usr/local/bin/apitap"
        );
    }

    #[test]
    fn ignored_termination_falls_back_to_kill() {
        let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = TempDir::new().unwrap();
        let exe = script(&dir, "proxy", "trap '' TERM\nwhile :; do sleep 1; done");

        let process = ProxyProcess::spawn(config_for(exe)).unwrap();
        let started = Instant::now();

        assert_eq!(process.stop(), StopOutcome::Killed);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn termination_runs_child_shutdown_handler() {
        let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("terminated");
        let exe = script(
            &dir,
            "proxy",
            &format!(
                "trap 'echo done > \"{}\"; exit 0' TERM\nwhile :; do sleep 0.05; done",
                marker.display()
            ),
        );

        let process = ProxyProcess::spawn(config_for(exe)).unwrap();

        assert_eq!(process.stop(), StopOutcome::Graceful);
        assert!(marker.exists());
    }

    #[test]
    fn failed_startup_query_reaps_child() {
        let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = TempDir::new().unwrap();
        let exe = script(&dir, "proxy", "exec sleep 30");
        let mut child = Command::new(exe).spawn().unwrap();

        let err = abort_startup(&mut child, std::io::Error::other("status unavailable"));

        assert!(matches!(err, ProxyError::Io(_)));
        assert!(child.try_wait().unwrap().is_some());
    }

    #[test]
    fn stop_after_exit_reports_already_exited() {
        let _guard = SPAWN_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = TempDir::new().unwrap();
        let exe = script(&dir, "proxy", "sleep 0.5");

        let process = ProxyProcess::spawn(config_for(exe)).unwrap();
        std::thread::sleep(Duration::from_millis(800));

        assert_eq!(process.stop(), StopOutcome::AlreadyExited);
    }
}
