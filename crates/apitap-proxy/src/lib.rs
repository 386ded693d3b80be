//! apitap Proxy - lifecycle of the external intercepting proxy.
//!
//! apitap does not intercept traffic itself. It launches an external proxy
//! (mitmproxy's `mitmdump` by default) with a hook script that appends
//! captured exchanges to the capture file, and manages that process:
//!
//! - [`locate`] and [`probe`]: find a working executable, with a bounded
//!   `--version` check
//! - [`resolve_hook`]: the capture hook, bundled or user supplied
//! - [`ProxyProcess`]: spawn with a startup grace period, bounded stop
//! - [`port_in_use`]: pre-flight port check
//!
//! ## Lifecycle
//!
//! ```text
//! spawn ──▶ alive after grace? ──yes──▶ Running ──stop──▶ TERM ─▶ wait
//!                 │                                          │
//!                 no                                   still alive?
//!                 ▼                                          ▼
//!          StartupFailed(stderr)                     kill ─▶ wait ─▶ abandon
//! ```

pub mod diagnostics;
mod error;
mod hook;
mod locate;
mod output;
mod proxy;

pub use diagnostics::{connect_host, port_in_use, DEFAULT_CONNECT_TIMEOUT};
pub use error::{ProxyError, Result};
pub use hook::{install_hook, resolve_hook, HOOK_SOURCE, SINK_EXECUTABLE_ENV};
pub use locate::{locate, probe, ProbeReport, DEFAULT_EXECUTABLE, DEFAULT_PROBE_TIMEOUT};
pub use output::MAX_CAPTURED_BYTES;
pub use proxy::{
    ProxyConfig, ProxyProcess, StopOutcome, CAPTURE_FILE_ENV, CERT_INSTALL_URL,
    DEFAULT_STARTUP_GRACE, DEFAULT_STOP_TIMEOUT,
};

pub use apitap_core::DEFAULT_PROXY_PORT;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_correct() {
        assert_eq!(DEFAULT_PROXY_PORT, 8080);
    }
}
