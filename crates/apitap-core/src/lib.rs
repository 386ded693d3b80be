//! apitap Core - capture model and table normalization.
//!
//! This crate holds the pieces of apitap that do not touch the filesystem or
//! any process:
//!
//! - [`CapturedExchange`]: one recorded HTTP exchange, as written to the
//!   capture file
//! - [`AllowList`]: the optional host filter applied before recording
//! - [`Table`]: the growing, column-stable table that captured JSON is
//!   flattened into
//! - [`Ingestible`]: the closed set of JSON shapes the table accepts
//!
//! ## Normalization
//!
//! ```text
//! JSON value ──▶ Ingestible ──┬─ Object ──────────▶ row keyed by its keys
//!                             ├─ Array  ──┐
//!                             └─ Scalar ──┴───────▶ row under `$value`
//! ```
//!
//! Bulk loads use a different rule set, see [`bulk_rows`].

pub mod allowlist;
pub mod error;
pub mod exchange;
pub mod normalize;
pub mod table;

pub use allowlist::{AllowList, ALLOWED_DOMAINS_ENV};
pub use error::{CoreError, Result};
pub use exchange::{format_timestamp, CapturedExchange, DecodedExchange, TIMESTAMP_FORMAT};
pub use normalize::{bulk_rows, Ingestible, VALUE_COLUMN};
pub use table::{Cell, Row, Table};

/// Default capture file name, relative to the working directory.
pub const DEFAULT_CAPTURE_FILE: &str = "captured_data.json";

/// Default port the intercepting proxy listens on.
pub const DEFAULT_PROXY_PORT: u16 = 8080;

/// Default address the intercepting proxy binds to.
pub const DEFAULT_LISTEN_HOST: &str = "0.0.0.0";

/// Default name of the capture hook script handed to the proxy.
pub const DEFAULT_HOOK_SCRIPT: &str = "mitm_writer.py";

/// Default port of the local push API.
pub const DEFAULT_PUSH_PORT: u16 = 48766;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capture_file_name() {
        assert_eq!(DEFAULT_CAPTURE_FILE, "captured_data.json");
    }

    #[test]
    fn default_proxy_endpoint() {
        assert_eq!(DEFAULT_PROXY_PORT, 8080);
        assert_eq!(DEFAULT_LISTEN_HOST, "0.0.0.0");
    }
}
