//! Captured HTTP exchanges.
//!
//! A [`DecodedExchange`] is what a proxy hook hands over after it has
//! decoded a response. A [`CapturedExchange`] is the record that ends up as
//! one line of the capture file.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};

/// Format used for the `timestamp` field of a captured exchange.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One recorded request/response pair.
///
/// Serialized as a single JSON object per capture-file line. The response
/// body lives under the `response_data` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedExchange {
    /// Full request URL.
    pub url: String,
    /// Request method.
    pub method: String,
    /// Request host, used for allow-list filtering.
    pub host: String,
    /// Request path including the query string.
    pub path: String,
    /// Response status code.
    pub status_code: u16,
    /// Parsed response body.
    #[serde(rename = "response_data")]
    pub response_body: Value,
    /// Local completion time (`YYYY-MM-DD HH:MM:SS`), or empty.
    #[serde(default)]
    pub timestamp: String,
}

impl CapturedExchange {
    /// Builds a capture record from a decoded exchange.
    ///
    /// Fails when the response body is not JSON.
    pub fn from_decoded(decoded: &DecodedExchange) -> Result<Self> {
        let response_body = decoded.parse_body()?;

        Ok(Self {
            url: decoded.url.clone(),
            method: decoded.method.clone(),
            host: decoded.host.clone(),
            path: decoded.path.clone(),
            status_code: decoded.status_code,
            response_body,
            timestamp: format_timestamp(decoded.completed_at()),
        })
    }

    /// Serializes the record as one newline-terminated line.
    ///
    /// Compact JSON escapes control characters inside strings, so the only
    /// newline in the output is the terminator.
    pub fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// A response already decoded by the external proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedExchange {
    pub url: String,
    pub method: String,
    pub host: String,
    pub path: String,
    pub status_code: u16,
    /// Response body as text.
    #[serde(default)]
    pub body: String,
    /// Response completion time as UNIX seconds, when the proxy knows it.
    #[serde(default)]
    pub timestamp_end: Option<f64>,
}

impl DecodedExchange {
    /// Parses the response body as JSON.
    pub fn parse_body(&self) -> Result<Value> {
        serde_json::from_str(&self.body).map_err(CoreError::Json)
    }

    /// Returns the completion time in local time, if available and valid.
    pub fn completed_at(&self) -> Option<DateTime<Local>> {
        let ts = self.timestamp_end?;
        if !ts.is_finite() || ts < 0.0 {
            return None;
        }

        let secs = ts.trunc() as i64;
        let nanos = (ts.fract() * 1_000_000_000.0) as u32;
        DateTime::from_timestamp(secs, nanos).map(|utc| utc.with_timezone(&Local))
    }
}

/// Formats a completion time, or returns an empty string when absent.
pub fn format_timestamp(time: Option<DateTime<Local>>) -> String {
    time.map(|t| t.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}
