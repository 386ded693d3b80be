//! Persistent user settings.
//!
//! Stored as JSON in the platform config directory. Every field has a
//! default, so a missing file or missing keys fall back to the defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use apitap_core::{
    AllowList, DEFAULT_CAPTURE_FILE, DEFAULT_HOOK_SCRIPT, DEFAULT_LISTEN_HOST, DEFAULT_PROXY_PORT,
    DEFAULT_PUSH_PORT,
};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::DEFAULT_POLL_INTERVAL;
use crate::error::{Result, StorageError};

const SETTINGS_FILE: &str = "settings.json";

/// Push API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushApiSettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for PushApiSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PUSH_PORT,
        }
    }
}

/// Application settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Port the proxy listens on.
    pub proxy_port: u16,
    /// Address the proxy binds to.
    pub listen_host: String,
    /// Hook script handed to the proxy.
    pub hook_script: PathBuf,
    /// Proxy executable; discovered when unset.
    pub proxy_executable: Option<PathBuf>,
    /// Capture file shared with the hook.
    pub capture_file: PathBuf,
    /// Hosts to record; empty records everything.
    pub allowed_domains: Vec<String>,
    /// Milliseconds between capture-file polls.
    pub poll_interval_ms: u64,
    pub push_api: PushApiSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            proxy_port: DEFAULT_PROXY_PORT,
            listen_host: DEFAULT_LISTEN_HOST.to_string(),
            hook_script: PathBuf::from(DEFAULT_HOOK_SCRIPT),
            proxy_executable: None,
            capture_file: PathBuf::from(DEFAULT_CAPTURE_FILE),
            allowed_domains: Vec::new(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            push_api: PushApiSettings::default(),
        }
    }
}

impl Settings {
    /// Get the default settings path.
    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "apitap", "apitap").ok_or_else(|| {
            StorageError::Config("Could not determine app config directory".into())
        })?;

        Ok(dirs.config_dir().join(SETTINGS_FILE))
    }

    /// Loads settings from `path`, using defaults if the file is missing.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path).map_err(|e| StorageError::file(path, e))?;
        let settings = serde_json::from_str(&text)?;
        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Saves settings to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|e| StorageError::file(path, e))?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Overrides the allow-list from `ALLOWED_DOMAINS` when it is set.
    pub fn apply_env(&mut self) {
        if let Some(list) = AllowList::from_env() {
            debug!("Allow-list taken from environment");
            self.allowed_domains = list.hosts().to_vec();
        }
    }

    /// Returns the configured allow-list.
    pub fn allow_list(&self) -> AllowList {
        AllowList::from_hosts(&self.allowed_domains)
    }

    /// Returns the poll interval, never shorter than 100ms.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(100))
    }
}
