//! Spreadsheet export of the table.
//!
//! [`export_table`] picks the format from the target's extension: `.xlsx`
//! writes an Excel workbook, anything else writes CSV with a UTF-8
//! byte-order mark so spreadsheet applications pick the right encoding.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use apitap_core::{Cell, Table};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use serde_json::{Number, Value};
use tracing::info;

use crate::error::{Result, StorageError};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Excel sheet limits, header row included.
const XLSX_MAX_ROWS: usize = 1_048_576;
const XLSX_MAX_COLUMNS: usize = 16_384;
const XLSX_MAX_STRING_CHARS: usize = 32_767;

/// Largest integer an Excel number holds exactly.
const XLSX_MAX_EXACT_INT: u64 = 1 << 53;

/// Result of an export request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The table has no rows; no file was written.
    NothingToExport,
    /// The file was written.
    Written { rows: usize, path: PathBuf },
}

/// Spreadsheet formats the table can be written as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Xlsx,
    Csv,
}

impl ExportFormat {
    /// Chooses the format from the file extension; CSV unless `.xlsx`.
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("xlsx") => Self::Xlsx,
            _ => Self::Csv,
        }
    }
}

/// Writes the table to `path` in the format its extension names.
pub fn export_table(table: &Table, path: &Path) -> Result<ExportOutcome> {
    match ExportFormat::for_path(path) {
        ExportFormat::Xlsx => export_xlsx(table, path),
        ExportFormat::Csv => export_csv(table, path),
    }
}

fn nothing_to_export(table: &Table) -> bool {
    table.is_empty() || table.columns().is_empty()
}

fn written(table: &Table, path: &Path) -> ExportOutcome {
    info!("Exported {} rows to {}", table.len(), path.display());
    ExportOutcome::Written {
        rows: table.len(),
        path: path.to_path_buf(),
    }
}

/// Writes the table to `path` as CSV: one header row, one row per table row.
pub fn export_csv(table: &Table, path: &Path) -> Result<ExportOutcome> {
    if nothing_to_export(table) {
        return Ok(ExportOutcome::NothingToExport);
    }

    let mut file = File::create(path).map_err(|e| StorageError::file(path, e))?;
    file.write_all(UTF8_BOM)
        .map_err(|e| StorageError::file(path, e))?;

    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(table.columns())?;
    for index in 0..table.len() {
        writer.write_record(table.display_row(index))?;
    }
    writer.flush().map_err(|e| StorageError::file(path, e))?;

    Ok(written(table, path))
}

/// Writes the table to `path` as an Excel workbook with one sheet.
///
/// Numbers and booleans keep their type; strings are written verbatim and
/// nested values as compact JSON. Absent and null cells stay empty.
pub fn export_xlsx(table: &Table, path: &Path) -> Result<ExportOutcome> {
    if nothing_to_export(table) {
        return Ok(ExportOutcome::NothingToExport);
    }
    if table.len() + 1 > XLSX_MAX_ROWS || table.columns().len() > XLSX_MAX_COLUMNS {
        return Err(StorageError::Export(format!(
            "{} rows x {} columns does not fit in an Excel sheet",
            table.len(),
            table.columns().len()
        )));
    }

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    let header = Format::new().set_bold();

    for (col, name) in table.columns().iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, clip(name), &header)?;
    }
    for (index, row) in table.rows().enumerate() {
        let sheet_row = (index + 1) as u32;
        for col in 0..table.columns().len() {
            write_cell(sheet, sheet_row, col as u16, row.get(col))?;
        }
    }
    sheet.set_freeze_panes(1, 0)?;

    workbook.save(path)?;
    Ok(written(table, path))
}

fn write_cell(sheet: &mut Worksheet, row: u32, col: u16, cell: Cell<'_>) -> std::result::Result<(), XlsxError> {
    match cell.value() {
        None | Some(Value::Null) => {}
        Some(Value::Bool(b)) => {
            sheet.write_boolean(row, col, *b)?;
        }
        Some(Value::Number(n)) => match exact_f64(n) {
            Some(n) => {
                sheet.write_number(row, col, n)?;
            }
            None => {
                sheet.write_string(row, col, &n.to_string())?;
            }
        },
        Some(Value::String(s)) => {
            sheet.write_string(row, col, clip(s))?;
        }
        Some(_) => {
            sheet.write_string(row, col, clip(&cell.display()))?;
        }
    }
    Ok(())
}

/// The number as an `f64`, unless that would change an integer's value.
fn exact_f64(n: &Number) -> Option<f64> {
    if let Some(i) = n.as_i64() {
        return (i.unsigned_abs() <= XLSX_MAX_EXACT_INT).then_some(i as f64);
    }
    if let Some(u) = n.as_u64() {
        return (u <= XLSX_MAX_EXACT_INT).then_some(u as f64);
    }
    n.as_f64()
}

/// Cuts text to the longest string an Excel cell holds.
fn clip(text: &str) -> &str {
    match text.char_indices().nth(XLSX_MAX_STRING_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample() -> Table {
        let mut table = Table::new();
        table.normalize_and_append(json!({"id": 1, "name": "a, b"}));
        table.normalize_and_append(json!({"id": 2, "tags": ["x"]}));
        table
    }

    #[test]
    fn empty_table_writes_nothing() {
        let dir = TempDir::new().unwrap();
        for name in ["out.csv", "out.xlsx"] {
            let path = dir.path().join(name);

            let outcome = export_table(&Table::new(), &path).unwrap();

            assert_eq!(outcome, ExportOutcome::NothingToExport);
            assert!(!path.exists());
        }
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(ExportFormat::for_path(Path::new("a.xlsx")), ExportFormat::Xlsx);
        assert_eq!(ExportFormat::for_path(Path::new("a.XLSX")), ExportFormat::Xlsx);
        assert_eq!(ExportFormat::for_path(Path::new("a.csv")), ExportFormat::Csv);
        assert_eq!(ExportFormat::for_path(Path::new("export")), ExportFormat::Csv);
    }

    #[test]
    fn writes_header_and_display_cells() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        let outcome = export_csv(&sample(), &path).unwrap();

        assert_eq!(
            outcome,
            ExportOutcome::Written {
                rows: 2,
                path: path.clone()
            }
        );
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id,name,tags");
        assert_eq!(lines[1], "1,\"a, b\",");
        assert_eq!(lines[2], "2,,\"[\"\"x\"\"]\"");
    }

    #[test]
    fn writes_xlsx_workbook() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.xlsx");
        let mut table = sample();
        table.normalize_and_append(json!({"id": 9_007_199_254_740_993u64, "ok": true, "name": null}));

        let outcome = export_table(&table, &path).unwrap();

        assert_eq!(
            outcome,
            ExportOutcome::Written {
                rows: 3,
                path: path.clone()
            }
        );
        // xlsx is a zip container.
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"PK\x03\x04"));
    }

    #[test]
    fn unwritable_target_is_error() {
        let dir = TempDir::new().unwrap();
        for name in ["out.csv", "out.xlsx"] {
            let path = dir.path().join("missing").join(name);
            assert!(export_table(&sample(), &path).is_err());
        }
    }

    #[test]
    fn large_integers_are_not_rounded() {
        assert_eq!(exact_f64(&Number::from(42)), Some(42.0));
        assert_eq!(exact_f64(&Number::from(-7i64)), Some(-7.0));
        assert_eq!(exact_f64(&Number::from(9_007_199_254_740_993u64)), None);
        assert_eq!(exact_f64(&Number::from_f64(1.5).unwrap()), Some(1.5));
    }

    #[test]
    fn long_text_is_clipped_to_cell_limit() {
        let long = "é".repeat(XLSX_MAX_STRING_CHARS + 10);
        assert_eq!(clip(&long).chars().count(), XLSX_MAX_STRING_CHARS);
        assert_eq!(clip("short"), "short");
    }
}
