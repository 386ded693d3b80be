//! Capture sink: the writer side of the capture file.
//!
//! The sink runs inside the proxy's hook for every completed response. It
//! never fails the exchange: a filtered host, a non-JSON body, or an I/O
//! error is logged and reported through [`SinkOutcome`], and proxying goes on.

use std::io::{BufRead, ErrorKind};

use apitap_core::{AllowList, CapturedExchange, DecodedExchange};
use tracing::{debug, warn};

use crate::capture_file::CaptureFile;

/// What happened to one exchange handed to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOutcome {
    /// The exchange was appended to the capture file.
    Recorded,
    /// The host is not on the allow-list.
    FilteredHost,
    /// The response body is not JSON.
    NotJson,
    /// Writing the record failed.
    Failed,
}

/// Running totals for a stream of exchanges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkSummary {
    pub recorded: usize,
    pub filtered: usize,
    pub not_json: usize,
    pub failed: usize,
    /// Input lines that were not a decoded exchange at all.
    pub unreadable: usize,
}

impl SinkSummary {
    fn count(&mut self, outcome: SinkOutcome) {
        match outcome {
            SinkOutcome::Recorded => self.recorded += 1,
            SinkOutcome::FilteredHost => self.filtered += 1,
            SinkOutcome::NotJson => self.not_json += 1,
            SinkOutcome::Failed => self.failed += 1,
        }
    }
}

/// Records JSON responses into the capture file.
#[derive(Debug, Clone)]
pub struct CaptureSink {
    file: CaptureFile,
    allow: AllowList,
}

impl CaptureSink {
    /// Creates a sink writing to `file`, recording only hosts in `allow`.
    pub fn new(file: CaptureFile, allow: AllowList) -> Self {
        Self { file, allow }
    }

    /// Returns the capture file this sink writes to.
    pub fn file(&self) -> &CaptureFile {
        &self.file
    }

    /// Returns the active allow-list.
    pub fn allow_list(&self) -> &AllowList {
        &self.allow
    }

    /// Handles one completed response.
    pub fn record(&self, decoded: &DecodedExchange) -> SinkOutcome {
        if !self.allow.allows(&decoded.host) {
            debug!("Skipping {} (host not allowed)", decoded.host);
            return SinkOutcome::FilteredHost;
        }

        let exchange = match CapturedExchange::from_decoded(decoded) {
            Ok(exchange) => exchange,
            Err(e) => {
                debug!("Skipping non-JSON response from {}: {}", decoded.url, e);
                return SinkOutcome::NotJson;
            }
        };

        match self.file.append(&exchange) {
            Ok(()) => {
                debug!(
                    "Captured {} {} ({})",
                    exchange.method, exchange.url, exchange.status_code
                );
                SinkOutcome::Recorded
            }
            Err(e) => {
                warn!("Failed to record {}: {}", exchange.url, e);
                SinkOutcome::Failed
            }
        }
    }

    /// Handles a stream of decoded exchanges, one JSON object per line.
    ///
    /// Blank lines are ignored. A line that is not a decoded exchange,
    /// including one that is not valid UTF-8, is counted as unreadable and
    /// the following lines are still handled. Reading stops at end of input
    /// or on an I/O error.
    pub fn record_lines<R: BufRead>(&self, mut reader: R) -> SinkSummary {
        let mut summary = SinkSummary::default();
        let mut line = Vec::new();

        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Stopped reading exchanges: {}", e);
                    break;
                }
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            match serde_json::from_slice::<DecodedExchange>(&line) {
                Ok(decoded) => summary.count(self.record(&decoded)),
                Err(e) => {
                    warn!("Ignoring unreadable exchange: {}", e);
                    summary.unreadable += 1;
                }
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn decoded(host: &str, body: &str) -> DecodedExchange {
        DecodedExchange {
            url: format!("https://{host}/v1/items"),
            method: "GET".to_string(),
            host: host.to_string(),
            path: "/v1/items".to_string(),
            status_code: 200,
            body: body.to_string(),
            timestamp_end: Some(1_700_000_000.0),
        }
    }

    fn lines(file: &CaptureFile) -> Vec<Value> {
        let snapshot = file.read_complete_lines().unwrap().unwrap_or_default();
        snapshot
            .lines()
            .map(|line| serde_json::from_slice(line).unwrap())
            .collect()
    }

    #[test]
    fn records_json_response() {
        let dir = TempDir::new().unwrap();
        let file = CaptureFile::new(dir.path().join("captured_data.json"));
        let sink = CaptureSink::new(file.clone(), AllowList::new());

        let outcome = sink.record(&decoded("api.example.com", r#"[{"id":1}]"#));

        assert_eq!(outcome, SinkOutcome::Recorded);
        let records = lines(&file);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["host"], json!("api.example.com"));
        assert_eq!(records[0]["status_code"], json!(200));
        assert_eq!(records[0]["response_data"], json!([{"id": 1}]));
        assert_eq!(records[0]["timestamp"].as_str().unwrap().len(), 19);
    }

    #[test]
    fn filtered_host_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let file = CaptureFile::new(dir.path().join("captured_data.json"));
        let sink = CaptureSink::new(file.clone(), AllowList::parse("api.example.com"));

        let outcome = sink.record(&decoded("tracker.example.net", "{}"));

        assert_eq!(outcome, SinkOutcome::FilteredHost);
        assert!(!file.exists());
    }

    #[test]
    fn non_json_body_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let file = CaptureFile::new(dir.path().join("captured_data.json"));
        let sink = CaptureSink::new(file.clone(), AllowList::new());

        assert_eq!(
            sink.record(&decoded("api.example.com", "<html></html>")),
            SinkOutcome::NotJson
        );
        assert!(!file.exists());
    }

    #[test]
    fn unwritable_target_is_reported_not_raised() {
        let dir = TempDir::new().unwrap();
        let file = CaptureFile::new(dir.path().join("missing-dir").join("captured_data.json"));
        let sink = CaptureSink::new(file, AllowList::new());

        assert_eq!(
            sink.record(&decoded("api.example.com", "{}")),
            SinkOutcome::Failed
        );
    }

    #[test]
    fn record_lines_counts_outcomes() {
        let dir = TempDir::new().unwrap();
        let file = CaptureFile::new(dir.path().join("captured_data.json"));
        let sink = CaptureSink::new(file.clone(), AllowList::parse("api.example.com"));

        let input = [
            serde_json::to_string(&decoded("api.example.com", r#"{"a":1}"#)).unwrap(),
            String::new(),
            serde_json::to_string(&decoded("other.example.com", r#"{"a":2}"#)).unwrap(),
            serde_json::to_string(&decoded("api.example.com", "not json")).unwrap(),
            "garbage".to_string(),
            serde_json::to_string(&decoded("api.example.com", r#"{"a":3}"#)).unwrap(),
        ]
        .join("\n");

        let summary = sink.record_lines(Cursor::new(input));

        assert_eq!(
            summary,
            SinkSummary {
                recorded: 2,
                filtered: 1,
                not_json: 1,
                failed: 0,
                unreadable: 1,
            }
        );
        assert_eq!(lines(&file).len(), 2);
    }

    #[test]
    fn record_lines_survives_undecodable_bytes() {
        let dir = TempDir::new().unwrap();
        let file = CaptureFile::new(dir.path().join("captured_data.json"));
        let sink = CaptureSink::new(file.clone(), AllowList::new());

        let exchange = |n: u32| {
            serde_json::to_string(&decoded("api.example.com", &format!(r#"{{"n":{n}}}"#))).unwrap()
        };
        let mut input = Vec::new();
        input.extend_from_slice(exchange(1).as_bytes());
        input.extend_from_slice(b"\n\xff\xfe garbage\n");
        input.extend_from_slice(exchange(2).as_bytes());
        input.push(b'\n');
        input.extend_from_slice(exchange(3).as_bytes());

        let summary = sink.record_lines(Cursor::new(input));

        assert_eq!(summary.recorded, 3);
        assert_eq!(summary.unreadable, 1);
        let records = lines(&file);
        assert_eq!(records.len(), 3);
        assert_eq!(records[2]["response_data"], json!({"n": 3}));
    }
}
