//! The append-only capture file.
//!
//! Writers only ever append whole lines with a single append-mode write.
//! Readers only ever look at newline-terminated lines, so a line that is
//! still being written is picked up by a later read.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use apitap_core::CapturedExchange;

use crate::error::{Result, StorageError};

/// Handle to the capture file at a fixed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFile {
    path: PathBuf,
}

impl CaptureFile {
    /// Creates a handle; the file itself is created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true when the file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Appends one record as a single line.
    pub fn append(&self, exchange: &CapturedExchange) -> Result<()> {
        let line = exchange.to_line()?;
        self.append_line(&line)
    }

    /// Appends raw text, which must be one newline-terminated line.
    ///
    /// The line goes out in one `write_all` on an `O_APPEND` handle; there is
    /// no read or seek beforehand.
    pub fn append_line(&self, line: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StorageError::file(&self.path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| StorageError::file(&self.path, e))?;
        Ok(())
    }

    /// Reads every complete line currently in the file.
    ///
    /// Returns `None` when the file does not exist yet.
    pub fn read_complete_lines(&self) -> Result<Option<LineSnapshot>> {
        let mut bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::file(&self.path, e)),
        };

        match bytes.iter().rposition(|b| *b == b'\n') {
            Some(last) => bytes.truncate(last + 1),
            None => bytes.clear(),
        }

        Ok(Some(LineSnapshot { bytes }))
    }

    /// Counts the complete lines currently in the file.
    pub fn complete_line_count(&self) -> Result<usize> {
        Ok(self
            .read_complete_lines()?
            .map(|snapshot| snapshot.line_count())
            .unwrap_or(0))
    }

    /// Truncates the file to zero length. A missing file is left missing.
    pub fn truncate(&self) -> Result<()> {
        match OpenOptions::new().write(true).truncate(true).open(&self.path) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::file(&self.path, e)),
        }
    }
}

/// Newline-terminated content of the capture file at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineSnapshot {
    bytes: Vec<u8>,
}

impl LineSnapshot {
    /// Number of complete lines.
    pub fn line_count(&self) -> usize {
        self.bytes.iter().filter(|b| **b == b'\n').count()
    }

    /// Iterates the lines without their terminators.
    pub fn lines(&self) -> impl Iterator<Item = &[u8]> {
        let body = self.bytes.strip_suffix(b"\n");
        body.into_iter().flat_map(|body| body.split(|b| *b == b'\n'))
    }
}
