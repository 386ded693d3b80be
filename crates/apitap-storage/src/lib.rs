//! apitap Storage - the capture file and everything that reads or writes it.
//!
//! This crate handles:
//!
//! - [`CaptureFile`]: the append-only JSON-lines file shared between the
//!   proxy hook and the viewer
//! - [`CaptureSink`]: the writer side, filtering and recording decoded
//!   exchanges
//! - [`IngestionEngine`]: the reader side, turning new lines into table rows
//!   exactly once
//! - [`export_table`]: spreadsheet export of the table (xlsx or CSV)
//! - [`Settings`]: persisted user settings
//!
//! # Example
//!
//! ```no_run
//! use apitap_storage::{CaptureFile, IngestionEngine};
//!
//! let mut engine = IngestionEngine::new(CaptureFile::new("captured_data.json"));
//! let outcome = engine.poll().unwrap();
//! println!("{} new rows", outcome.new_rows);
//! ```

pub mod capture_file;
pub mod engine;
pub mod error;
pub mod export;
pub mod settings;
pub mod sink;

pub use capture_file::{CaptureFile, LineSnapshot};
pub use engine::{IngestionEngine, PollOutcome, SharedEngine, DEFAULT_POLL_INTERVAL};
pub use error::{Result, StorageError};
pub use export::{export_csv, export_table, export_xlsx, ExportFormat, ExportOutcome};
pub use settings::{PushApiSettings, Settings};
pub use sink::{CaptureSink, SinkOutcome, SinkSummary};
