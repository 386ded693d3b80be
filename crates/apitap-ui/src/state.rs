//! Viewer state and user actions.
//!
//! Everything the viewer does lives here so it can be driven without a
//! window; the views only read fields and call these methods.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use apitap_core::AllowList;
use apitap_proxy::{port_in_use, ProxyConfig, ProxyProcess, StopOutcome, DEFAULT_CONNECT_TIMEOUT};
use apitap_storage::{export_table, ExportOutcome, PollOutcome, Settings, SharedEngine};
use directories::UserDirs;
use eframe::egui::Color32;
use tracing::{info, warn};

use crate::theme::status;

/// Default export file name.
pub const EXPORT_FILE_NAME: &str = "apitap_export.xlsx";

/// State of the external proxy as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyStatus {
    /// Not started, or stopped by the user.
    #[default]
    Stopped,
    /// Started and still alive.
    Running,
    /// Failed to start or exited on its own.
    Error,
}

impl ProxyStatus {
    /// Returns display text.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Running => "Running",
            Self::Error => "Error",
        }
    }

    /// Returns the indicator color for this status.
    pub fn color(&self) -> Color32 {
        match self {
            Self::Stopped => status::IDLE,
            Self::Running => status::SUCCESS,
            Self::Error => status::ERROR,
        }
    }
}

/// Everything the viewer needs at startup.
pub struct ViewerOptions {
    /// Engine shared with the push API, if one is running.
    pub engine: SharedEngine,
    /// Proxy launch template; allow-list and capture file are filled in on start.
    pub proxy: ProxyConfig,
    /// Loaded settings.
    pub settings: Settings,
    /// Where to persist settings changes, if anywhere.
    pub settings_path: Option<PathBuf>,
}

/// Application state for the viewer.
pub struct AppState {
    /// Shared ingestion engine.
    pub engine: SharedEngine,

    /// Proxy status indicator.
    pub proxy_status: ProxyStatus,

    /// Comma-separated hosts to record, applied on the next start.
    pub domain_filter: String,

    /// Target path for export; `.xlsx` writes a workbook, anything else CSV.
    pub export_path: String,

    /// File to load with "Load file".
    pub load_path: String,

    /// Open the exported file afterwards.
    pub open_after_export: bool,

    /// Whether the clear confirmation is showing.
    pub confirm_clear: bool,

    /// Error message to display.
    pub error_message: Option<String>,

    /// Success message to display.
    pub success_message: Option<String>,

    /// Background status (poll problems, unexpected proxy exit).
    pub status_message: Option<String>,

    proxy_template: ProxyConfig,
    proxy: Option<ProxyProcess>,
    poll_interval: Duration,
    last_poll: Option<Instant>,
    last_poll_error: Option<String>,
    settings: Settings,
    settings_path: Option<PathBuf>,
}

impl AppState {
    /// Creates viewer state.
    pub fn new(options: ViewerOptions) -> Self {
        let export_path = UserDirs::new()
            .and_then(|dirs| dirs.document_dir().map(|dir| dir.join(EXPORT_FILE_NAME)))
            .unwrap_or_else(|| PathBuf::from(EXPORT_FILE_NAME));

        Self {
            engine: options.engine,
            proxy_status: ProxyStatus::Stopped,
            domain_filter: options.settings.allowed_domains.join(", "),
            export_path: export_path.display().to_string(),
            load_path: String::new(),
            open_after_export: true,
            confirm_clear: false,
            error_message: None,
            success_message: None,
            status_message: None,
            proxy_template: options.proxy,
            proxy: None,
            poll_interval: options.settings.poll_interval(),
            last_poll: None,
            last_poll_error: None,
            settings: options.settings,
            settings_path: options.settings_path,
        }
    }

    /// Time between capture-file polls.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Returns true when the next poll is due.
    pub fn poll_due(&self, now: Instant) -> bool {
        self.last_poll
            .map(|last| now.duration_since(last) >= self.poll_interval)
            .unwrap_or(true)
    }

    /// Polls the capture file.
    ///
    /// A failure is put on the status bar once; repeats of the same failure
    /// stay quiet until a poll succeeds again.
    pub fn poll(&mut self) -> Option<PollOutcome> {
        self.last_poll = Some(Instant::now());
        let result = self.engine.lock().poll();

        match result {
            Ok(outcome) => {
                if self.last_poll_error.take().is_some() {
                    self.status_message = None;
                }
                Some(outcome)
            }
            Err(e) => {
                let text = e.to_string();
                if self.last_poll_error.as_deref() != Some(text.as_str()) {
                    warn!("Capture poll failed: {}", text);
                    self.status_message = Some(format!("Reading capture file failed: {}", text));
                    self.last_poll_error = Some(text);
                }
                None
            }
        }
    }

    /// Returns true while a proxy process is owned.
    pub fn proxy_running(&self) -> bool {
        self.proxy.is_some()
    }

    /// The launch configuration the next start would use.
    pub fn next_proxy_config(&self) -> ProxyConfig {
        let capture = self.engine.lock().capture().path().to_path_buf();
        self.proxy_template
            .clone()
            .with_allow_list(AllowList::parse(&self.domain_filter))
            .with_capture_file(capture)
    }

    /// Starts the proxy with the current domain filter.
    pub fn start_proxy(&mut self) {
        if self.proxy.is_some() {
            self.set_error("The proxy is already running");
            return;
        }

        let config = self.next_proxy_config();
        if port_in_use(&config.listen_host, config.port, DEFAULT_CONNECT_TIMEOUT) {
            self.proxy_status = ProxyStatus::Error;
            self.set_error(format!(
                "Port {} is already in use; stop the other program or pick another port",
                config.port
            ));
            return;
        }

        self.remember_domains(config.allow_list.hosts());
        let hint = config.connection_hint();

        match ProxyProcess::spawn(config) {
            Ok(process) => {
                info!("Proxy started from viewer (pid {})", process.pid());
                self.proxy = Some(process);
                self.proxy_status = ProxyStatus::Running;
                self.status_message = None;
                self.set_success(hint);
            }
            Err(e) => {
                self.proxy_status = ProxyStatus::Error;
                self.set_error(format!("Failed to start proxy: {}", e));
            }
        }
    }

    /// Stops the proxy, if running.
    pub fn stop_proxy(&mut self) {
        let Some(process) = self.proxy.take() else {
            self.proxy_status = ProxyStatus::Stopped;
            return;
        };

        let outcome = process.stop();
        self.proxy_status = ProxyStatus::Stopped;
        match outcome {
            StopOutcome::Abandoned => {
                self.set_error("The proxy did not exit and was abandoned")
            }
            other => self.set_success(format!("Proxy {}", other.as_str())),
        }
    }

    /// Notices a proxy that exited on its own.
    pub fn check_proxy(&mut self) {
        let exited = match self.proxy.as_mut() {
            Some(process) => !process.is_running(),
            None => false,
        };
        if !exited {
            return;
        }

        if let Some(process) = self.proxy.take() {
            let stderr = process.stderr_output();
            let reason = stderr.lines().last().unwrap_or("no output").trim().to_string();
            warn!("Proxy exited unexpectedly: {}", reason);
            self.proxy_status = ProxyStatus::Error;
            self.status_message = Some(format!("Proxy exited unexpectedly: {}", reason));
        }
    }

    /// Asks for confirmation before clearing.
    pub fn request_clear(&mut self) {
        self.confirm_clear = true;
    }

    /// Clears the table and the capture file.
    pub fn clear(&mut self) {
        self.confirm_clear = false;
        let result = self.engine.lock().clear();
        match result {
            Ok(()) => self.set_success("Captured data cleared"),
            Err(e) => self.set_error(format!("Table cleared, but truncating the capture file failed: {}", e)),
        }
    }

    /// Exports the table to the export path.
    ///
    /// Returns the written file on success.
    pub fn export(&mut self) -> Option<PathBuf> {
        let path = self.export_path.trim();
        if path.is_empty() {
            self.set_error("Choose a file to export to");
            return None;
        }
        let path = PathBuf::from(path);

        let result = {
            let engine = self.engine.lock();
            export_table(engine.table(), &path)
        };

        match result {
            Ok(ExportOutcome::NothingToExport) => {
                self.set_error("Nothing to export: no rows captured yet");
                None
            }
            Ok(ExportOutcome::Written { rows, path }) => {
                self.set_success(format!("Exported {} rows to {}", rows, path.display()));
                Some(path)
            }
            Err(e) => {
                self.set_error(format!("Export failed: {}", e));
                None
            }
        }
    }

    /// Loads the file at the load path into the table.
    pub fn load_file(&mut self) {
        let path = self.load_path.trim();
        if path.is_empty() {
            self.set_error("Choose a file to load");
            return;
        }
        let path = PathBuf::from(path);

        let result = {
            let mut engine = self.engine.lock();
            let before = engine.row_count();
            engine
                .load_file(&path)
                .map(|_| engine.row_count() - before)
        };

        match result {
            Ok(0) => self.set_error(format!("No rows found in {}", path.display())),
            Ok(added) => self.set_success(format!("Loaded {} rows from {}", added, path.display())),
            Err(e) => self.set_error(format!("Could not load file: {}", e)),
        }
    }

    /// Status bar text: proxy status and row count.
    pub fn status_text(&self) -> String {
        let rows = self.engine.lock().row_count();
        format!("Proxy: {} | Rows captured: {}", self.proxy_status.as_str(), rows)
    }

    /// Stops the proxy on exit.
    pub fn shutdown(&mut self) {
        if self.proxy.is_some() {
            info!("Stopping proxy on exit");
            self.stop_proxy();
        }
    }

    /// Set an error message.
    pub fn set_error(&mut self, msg: impl Into<String>) {
        self.error_message = Some(msg.into());
        self.success_message = None;
    }

    /// Set a success message.
    pub fn set_success(&mut self, msg: impl Into<String>) {
        self.success_message = Some(msg.into());
        self.error_message = None;
    }

    fn remember_domains(&mut self, hosts: &[String]) {
        if self.settings.allowed_domains == hosts {
            return;
        }
        self.settings.allowed_domains = hosts.to_vec();

        if let Some(path) = &self.settings_path {
            if let Err(e) = self.settings.save(path) {
                warn!("Failed to save domain filter: {}", e);
            }
        }
    }
}
