//! Settings resolution: file, then environment, then command line.

use std::path::{Path, PathBuf};

use apitap_core::AllowList;
use apitap_proxy::{locate, resolve_hook, ProxyConfig, DEFAULT_PROBE_TIMEOUT};
use apitap_server::ServerConfig;
use apitap_storage::Settings;
use directories::ProjectDirs;
use tracing::warn;

/// Values given on the command line that win over the settings file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub capture_file: Option<PathBuf>,
    pub proxy_port: Option<u16>,
    pub domains: Option<String>,
}

impl Overrides {
    /// Applies the overrides that were given.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(path) = &self.capture_file {
            settings.capture_file = path.clone();
        }
        if let Some(port) = self.proxy_port {
            settings.proxy_port = port;
        }
        if let Some(domains) = &self.domains {
            settings.allowed_domains = AllowList::parse(domains).hosts().to_vec();
        }
    }
}

/// Picks the settings file: `--config` when given, else the platform default.
pub fn settings_path(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => match Settings::default_path() {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("No settings location: {}", e);
                None
            }
        },
    }
}

/// Loads settings and layers `ALLOWED_DOMAINS` and `overrides` on top.
pub fn load_settings(path: Option<&Path>, overrides: &Overrides) -> anyhow::Result<Settings> {
    let mut settings = match path {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    settings.apply_env();
    overrides.apply(&mut settings);
    Ok(settings)
}

/// Directory the bundled hook script is installed into.
pub fn hooks_dir(settings: &Settings) -> PathBuf {
    match ProjectDirs::from("", "apitap", "apitap") {
        Some(dirs) => dirs.data_dir().join("hooks"),
        None => settings
            .capture_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    }
}

/// The hook script the proxy will actually load.
///
/// Falls back to the configured path when it cannot be resolved, so the
/// proxy reports the problem itself.
pub fn hook_script(settings: &Settings, install_dir: &Path) -> PathBuf {
    match resolve_hook(&settings.hook_script, install_dir) {
        Ok(path) => path,
        Err(e) => {
            warn!("{}", e);
            settings.hook_script.clone()
        }
    }
}

/// Proxy launch template: executable, address and hook script.
///
/// Discovers the executable when the settings do not name one.
pub fn proxy_template(settings: &Settings) -> ProxyConfig {
    proxy_template_with(settings, &hooks_dir(settings))
}

fn proxy_template_with(settings: &Settings, hook_dir: &Path) -> ProxyConfig {
    let executable = locate(settings.proxy_executable.as_deref(), DEFAULT_PROBE_TIMEOUT);
    let config = ProxyConfig::new(executable)
        .with_port(settings.proxy_port)
        .with_listen_host(settings.listen_host.clone())
        .with_hook_script(hook_script(settings, hook_dir));

    match std::env::current_exe() {
        Ok(exe) => config.with_sink_executable(exe),
        Err(e) => {
            warn!("Cannot locate own executable, hook will run `apitap` from PATH: {}", e);
            config
        }
    }
}

/// Full proxy configuration, including allow-list and capture file.
pub fn proxy_config(settings: &Settings) -> ProxyConfig {
    proxy_template(settings)
        .with_allow_list(settings.allow_list())
        .with_capture_file(settings.capture_file.clone())
}

/// Push API address from settings.
pub fn server_config(settings: &Settings) -> ServerConfig {
    ServerConfig::new(settings.push_api.host.clone(), settings.push_api.port)
}
