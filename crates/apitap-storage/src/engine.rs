//! Incremental ingestion of the capture file into a [`Table`].
//!
//! The engine remembers how many complete lines of the capture file it has
//! already consumed. Each [`IngestionEngine::poll`] only parses the lines
//! after that offset, so a line is turned into a row at most once.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use apitap_core::Table;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::capture_file::CaptureFile;
use crate::error::{Result, StorageError};

/// Default time between two polls of the capture file.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Engine shared between the UI, the push API, and background pollers.
pub type SharedEngine = Arc<Mutex<IngestionEngine>>;

/// What a single poll did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Rows appended to the table.
    pub new_rows: usize,
    /// Complete lines consumed, including blank and skipped ones.
    pub lines_consumed: usize,
    /// Lines that were not valid JSON.
    pub skipped: usize,
}

impl PollOutcome {
    /// Returns true when the poll appended at least one row.
    pub fn has_new_rows(&self) -> bool {
        self.new_rows > 0
    }
}

/// Owns the table and the ingested-line offset for one capture file.
#[derive(Debug)]
pub struct IngestionEngine {
    capture: CaptureFile,
    table: Table,
    ingested_lines: usize,
}

impl IngestionEngine {
    /// Creates an engine with an empty table for `capture`.
    pub fn new(capture: CaptureFile) -> Self {
        Self {
            capture,
            table: Table::new(),
            ingested_lines: 0,
        }
    }

    /// Wraps the engine for sharing across threads.
    pub fn into_shared(self) -> SharedEngine {
        Arc::new(Mutex::new(self))
    }

    /// Returns the capture file being ingested.
    pub fn capture(&self) -> &CaptureFile {
        &self.capture
    }

    /// Returns the table built so far.
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Number of rows in the table.
    pub fn row_count(&self) -> usize {
        self.table.len()
    }

    /// Number of capture-file lines already consumed.
    pub fn ingested_lines(&self) -> usize {
        self.ingested_lines
    }

    /// Ingests every complete line appended since the last poll.
    ///
    /// A missing file is not an error; nothing changes. Blank, malformed, or
    /// non-UTF-8 lines are consumed without producing a row. If the file now
    /// holds fewer complete lines than were already consumed, it was
    /// truncated behind our back and is read again from the start.
    pub fn poll(&mut self) -> Result<PollOutcome> {
        let Some(snapshot) = self.capture.read_complete_lines()? else {
            return Ok(PollOutcome::default());
        };

        let total = snapshot.line_count();
        if total < self.ingested_lines {
            warn!(
                "Capture file shrank from {} to {} lines, re-reading from start",
                self.ingested_lines, total
            );
            self.ingested_lines = 0;
        }

        let mut outcome = PollOutcome::default();
        for line in snapshot.lines().skip(self.ingested_lines) {
            outcome.lines_consumed += 1;

            let Ok(text) = std::str::from_utf8(line) else {
                debug!("Skipping non-UTF-8 capture line");
                outcome.skipped += 1;
                continue;
            };
            let text = text.trim();
            if text.is_empty() {
                continue;
            }

            match serde_json::from_str::<Value>(text) {
                Ok(value) => {
                    self.table.normalize_and_append(value);
                    outcome.new_rows += 1;
                }
                Err(e) => {
                    debug!("Skipping malformed capture line: {}", e);
                    outcome.skipped += 1;
                }
            }
        }

        self.ingested_lines += outcome.lines_consumed;
        if outcome.has_new_rows() {
            debug!(
                "Ingested {} new rows ({} lines total)",
                outcome.new_rows, self.ingested_lines
            );
        }

        Ok(outcome)
    }

    /// Appends one pushed item as exactly one row.
    pub fn add_single(&mut self, item: Value) -> usize {
        self.table.normalize_and_append(item)
    }

    /// Appends the rows a bulk value yields. Returns true if any were added.
    pub fn load_bulk(&mut self, value: Value) -> bool {
        self.table.load_bulk(value) > 0
    }

    /// Loads a saved capture or JSON document from disk.
    ///
    /// The file is parsed as one JSON document first; if that fails, each
    /// non-blank line is parsed on its own and the parsed lines are loaded as
    /// one list. Rows are appended to the current table; the ingested-line
    /// offset is untouched.
    pub fn load_file(&mut self, path: &Path) -> Result<bool> {
        let text =
            std::fs::read_to_string(path).map_err(|e| StorageError::file(path, e))?;

        let value = match serde_json::from_str::<Value>(&text) {
            Ok(value) => value,
            Err(_) => {
                let items: Vec<Value> = text
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .filter_map(|line| serde_json::from_str(line).ok())
                    .collect();
                Value::Array(items)
            }
        };

        let before = self.table.len();
        let added = self.load_bulk(value);
        info!(
            "Loaded {} rows from {}",
            self.table.len() - before,
            path.display()
        );
        Ok(added)
    }

    /// Empties the table and the capture file.
    ///
    /// The table is always cleared. When the file cannot be truncated the
    /// error is returned and the offset moves past every line currently in
    /// the file, so stale data is not ingested again.
    pub fn clear(&mut self) -> Result<()> {
        self.clear_with(CaptureFile::truncate)
    }

    fn clear_with<F>(&mut self, truncate: F) -> Result<()>
    where
        F: FnOnce(&CaptureFile) -> Result<()>,
    {
        self.table.clear();

        match truncate(&self.capture) {
            Ok(()) => {
                self.ingested_lines = 0;
                info!("Cleared capture data");
                Ok(())
            }
            Err(e) => {
                warn!("Failed to truncate capture file: {}", e);
                self.ingested_lines = self
                    .capture
                    .complete_line_count()
                    .unwrap_or(self.ingested_lines);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apitap_core::VALUE_COLUMN;
    use serde_json::json;
    use tempfile::TempDir;

    fn engine_in(dir: &TempDir) -> IngestionEngine {
        IngestionEngine::new(CaptureFile::new(dir.path().join("captured_data.json")))
    }

    fn append(engine: &IngestionEngine, text: &str) {
        engine.capture().append_line(text).unwrap();
    }

    #[test]
    fn poll_without_file_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_in(&dir);

        assert_eq!(engine.poll().unwrap(), PollOutcome::default());
        assert_eq!(engine.row_count(), 0);
        assert_eq!(engine.ingested_lines(), 0);
    }

    #[test]
    fn each_line_is_ingested_once() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_in(&dir);

        append(&engine, "{\"id\":1}\n{\"id\":2}\n");
        let first = engine.poll().unwrap();
        assert_eq!(first.new_rows, 2);

        let second = engine.poll().unwrap();
        assert_eq!(second, PollOutcome::default());

        append(&engine, "{\"id\":3}\n");
        assert_eq!(engine.poll().unwrap().new_rows, 1);
        assert_eq!(engine.row_count(), 3);
        assert_eq!(engine.ingested_lines(), 3);
    }

    #[test]
    fn partial_line_waits_for_its_newline() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_in(&dir);

        append(&engine, "{\"id\":1}\n{\"id\":");
        assert_eq!(engine.poll().unwrap().new_rows, 1);
        assert_eq!(engine.ingested_lines(), 1);

        append(&engine, "2}\n");
        let outcome = engine.poll().unwrap();
        assert_eq!(outcome.new_rows, 1);
        assert_eq!(outcome.skipped, 0);
        assert_eq!(engine.table().cell(1, "id").display(), "2");
    }

    #[test]
    fn malformed_line_is_skipped_and_consumed() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_in(&dir);

        append(&engine, "{\"a\":1}\nnot json\n{\"a\":2}\n");
        let outcome = engine.poll().unwrap();

        assert_eq!(
            outcome,
            PollOutcome {
                new_rows: 2,
                lines_consumed: 3,
                skipped: 1,
            }
        );
        assert_eq!(engine.ingested_lines(), 3);
        assert_eq!(engine.poll().unwrap(), PollOutcome::default());
    }

    #[test]
    fn blank_lines_advance_offset_without_rows() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_in(&dir);

        append(&engine, "\n  \n{\"a\":1}\n");
        let outcome = engine.poll().unwrap();

        assert_eq!(outcome.new_rows, 1);
        assert_eq!(outcome.skipped, 0);
        assert_eq!(engine.ingested_lines(), 3);
    }

    #[test]
    fn non_utf8_line_is_skipped() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_in(&dir);

        std::fs::write(engine.capture().path(), b"\xff\xfe\n{\"a\":1}\n").unwrap();
        let outcome = engine.poll().unwrap();

        assert_eq!(outcome.new_rows, 1);
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn polled_non_objects_wrap_under_value_column() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_in(&dir);

        append(&engine, "[1,2]\n\"text\"\n");
        engine.poll().unwrap();

        assert_eq!(engine.table().columns(), [VALUE_COLUMN]);
        assert_eq!(engine.table().cell(0, VALUE_COLUMN).display(), "[1,2]");
        assert_eq!(engine.table().cell(1, VALUE_COLUMN).display(), "text");
    }

    #[test]
    fn late_column_shows_empty_for_earlier_rows() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_in(&dir);

        let mut text = String::new();
        for i in 0..10 {
            if i == 4 {
                text.push_str(&format!("{{\"id\":{i},\"extra\":\"x\"}}\n"));
            } else {
                text.push_str(&format!("{{\"id\":{i}}}\n"));
            }
        }
        append(&engine, &text);
        engine.poll().unwrap();

        let table = engine.table();
        assert_eq!(table.columns(), ["id", "extra"]);
        for row in 0..4 {
            assert_eq!(table.display_row(row)[1], "");
        }
        assert_eq!(table.display_row(4)[1], "x");
    }

    #[test]
    fn clear_truncates_and_restarts_offset() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_in(&dir);

        append(&engine, "{\"a\":1}\n{\"a\":2}\n");
        engine.poll().unwrap();

        engine.clear().unwrap();
        assert_eq!(engine.row_count(), 0);
        assert_eq!(engine.ingested_lines(), 0);
        assert!(engine.table().columns().is_empty());
        assert_eq!(engine.capture().complete_line_count().unwrap(), 0);

        append(&engine, "{\"b\":1}\n");
        assert_eq!(engine.poll().unwrap().new_rows, 1);
        assert_eq!(engine.table().columns(), ["b"]);
    }

    #[test]
    fn clear_without_file_succeeds() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_in(&dir);
        engine.add_single(json!({"a": 1}));

        engine.clear().unwrap();
        assert_eq!(engine.row_count(), 0);
        assert!(!engine.capture().exists());
    }

    #[test]
    fn clear_on_unopenable_file_still_empties_table() {
        let dir = TempDir::new().unwrap();
        // A directory cannot be opened for truncation.
        let path = dir.path().join("captured_data.json");
        std::fs::create_dir(&path).unwrap();
        let mut engine = IngestionEngine::new(CaptureFile::new(&path));
        engine.add_single(json!({"a": 1}));

        assert!(engine.clear().is_err());
        assert_eq!(engine.row_count(), 0);
    }

    #[test]
    fn clear_failure_skips_stale_lines() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_in(&dir);
        append(&engine, "{\"a\":1}\n{\"a\":2}\n{\"a\":3}\n");
        assert_eq!(engine.poll().unwrap().new_rows, 3);
        // Written after the last poll, never shown.
        append(&engine, "{\"a\":4}\n\n");

        let result = engine.clear_with(|_| {
            Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        });

        assert!(result.is_err());
        assert_eq!(engine.row_count(), 0);
        assert_eq!(engine.ingested_lines(), 5);
        assert_eq!(
            engine.ingested_lines(),
            engine.capture().complete_line_count().unwrap()
        );
        assert_eq!(engine.poll().unwrap(), PollOutcome::default());
        assert_eq!(engine.row_count(), 0);

        append(&engine, "{\"a\":5}\n");
        assert_eq!(engine.poll().unwrap().new_rows, 1);
        assert_eq!(engine.table().cell(0, "a").display(), "5");
    }

    #[test]
    fn fresh_engines_agree_on_columns() {
        let dir = TempDir::new().unwrap();
        let mut first = engine_in(&dir);
        append(&first, "{\"id\":1,\"name\":\"a\"}\n[1,2]\nnot json\n{\"extra\":true,\"id\":2}\n");

        let mut second = engine_in(&dir);
        first.poll().unwrap();
        second.poll().unwrap();

        assert_eq!(first.table().columns(), ["id", "name", "$value", "extra"]);
        assert_eq!(first.table().columns(), second.table().columns());
        assert_eq!(first.row_count(), second.row_count());
    }

    #[test]
    fn external_truncation_rereads_from_start() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_in(&dir);

        append(&engine, "{\"a\":1}\n{\"a\":2}\n{\"a\":3}\n");
        engine.poll().unwrap();

        std::fs::write(engine.capture().path(), "{\"a\":4}\n").unwrap();
        let outcome = engine.poll().unwrap();

        assert_eq!(outcome.new_rows, 1);
        assert_eq!(engine.row_count(), 4);
        assert_eq!(engine.ingested_lines(), 1);
    }

    #[test]
    fn add_single_appends_exactly_one_row() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_in(&dir);

        engine.add_single(json!({"a": 1}));
        engine.add_single(json!([{"a": 2}, {"a": 3}]));
        engine.add_single(json!(7));

        assert_eq!(engine.row_count(), 3);
        assert_eq!(engine.table().columns(), ["a", VALUE_COLUMN]);
        assert_eq!(engine.ingested_lines(), 0);
    }

    #[test]
    fn load_bulk_reports_whether_rows_were_added() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_in(&dir);

        assert!(engine.load_bulk(json!({"data": [{"a": 1}, {"a": 2}]})));
        assert!(!engine.load_bulk(json!([1, 2, 3])));
        assert!(!engine.load_bulk(json!("scalar")));
        assert_eq!(engine.row_count(), 2);
    }

    #[test]
    fn load_file_reads_whole_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("export.json");
        std::fs::write(&path, r#"{"items": [{"id": 1}, {"id": 2}]}"#).unwrap();
        let mut engine = engine_in(&dir);

        assert!(engine.load_file(&path).unwrap());
        assert_eq!(engine.row_count(), 2);
    }

    #[test]
    fn load_file_falls_back_to_json_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saved.json");
        std::fs::write(&path, "{\"id\":1}\n\nbroken\n{\"id\":2}\n").unwrap();
        let mut engine = engine_in(&dir);

        assert!(engine.load_file(&path).unwrap());
        assert_eq!(engine.row_count(), 2);
        assert_eq!(engine.ingested_lines(), 0);
    }

    #[test]
    fn load_file_missing_is_error() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine_in(&dir);

        assert!(engine.load_file(&dir.path().join("nope.json")).is_err());
    }

    #[test]
    fn shared_engine_is_usable_across_threads() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(&dir).into_shared();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    engine.lock().add_single(json!({"worker": i}));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.lock().row_count(), 4);
    }
}
