//! Column-stable table of normalized rows.
//!
//! Columns are kept in first-appearance order and never reordered. Rows are
//! append-only; a row stores one slot per column that existed when it was
//! appended, so columns discovered later read as [`Cell::Absent`] for older
//! rows without touching them.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::normalize::{bulk_rows, Ingestible};

/// A single cell lookup result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell<'a> {
    /// The row has no value for this column.
    Absent,
    /// The row's value for this column.
    Present(&'a Value),
}

impl<'a> Cell<'a> {
    /// Returns the underlying value, if present.
    pub fn value(&self) -> Option<&'a Value> {
        match *self {
            Cell::Absent => None,
            Cell::Present(value) => Some(value),
        }
    }

    /// Returns true when the row has no value for the column.
    pub fn is_absent(&self) -> bool {
        matches!(self, Cell::Absent)
    }

    /// Renders the cell as text for display and export.
    ///
    /// Strings are shown verbatim, nested values as compact JSON, and
    /// absent or null cells as an empty string.
    pub fn display(&self) -> String {
        match self {
            Cell::Absent | Cell::Present(Value::Null) => String::new(),
            Cell::Present(Value::String(s)) => s.clone(),
            Cell::Present(other) => other.to_string(),
        }
    }
}

/// One appended row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<Option<Value>>,
}

impl Row {
    /// Returns the cell at a column position.
    pub fn get(&self, column: usize) -> Cell<'_> {
        match self.cells.get(column) {
            Some(Some(value)) => Cell::Present(value),
            _ => Cell::Absent,
        }
    }
}

/// Growing table with dynamically discovered columns.
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<String>,
    positions: HashMap<String, usize>,
    rows: Vec<Row>,
}

impl Table {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Column names in first-appearance order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true when the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows in insertion order.
    pub fn rows(&self) -> impl ExactSizeIterator<Item = &Row> {
        self.rows.iter()
    }

    /// Returns a row by index.
    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    /// Returns the position of a column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Looks up a cell by row index and column name.
    ///
    /// Unknown rows and columns read as [`Cell::Absent`].
    pub fn cell(&self, row: usize, column: &str) -> Cell<'_> {
        match (self.rows.get(row), self.column_index(column)) {
            (Some(row), Some(column)) => row.get(column),
            _ => Cell::Absent,
        }
    }

    /// Renders a row as display strings, one per column.
    pub fn display_row(&self, index: usize) -> Vec<String> {
        let Some(row) = self.rows.get(index) else {
            return Vec::new();
        };
        (0..self.columns.len())
            .map(|column| row.get(column).display())
            .collect()
    }

    /// Appends one row built from a mapping and returns its index.
    ///
    /// New keys become new columns at the end of the column list.
    pub fn push_row(&mut self, record: Map<String, Value>) -> usize {
        let mut cells: Vec<Option<Value>> = vec![None; self.columns.len()];

        for (key, value) in record {
            let position = match self.positions.get(&key) {
                Some(&position) => position,
                None => {
                    let position = self.columns.len();
                    self.positions.insert(key.clone(), position);
                    self.columns.push(key);
                    position
                }
            };
            if position >= cells.len() {
                cells.resize(position + 1, None);
            }
            cells[position] = Some(value);
        }

        self.rows.push(Row { cells });
        self.rows.len() - 1
    }

    /// Normalizes any JSON value into exactly one appended row.
    pub fn normalize_and_append(&mut self, value: Value) -> usize {
        self.push_row(Ingestible::from(value).into_record())
    }

    /// Appends the rows a bulk value yields and returns how many were added.
    pub fn load_bulk(&mut self, value: Value) -> usize {
        let records = bulk_rows(value);
        let added = records.len();
        for record in records {
            self.push_row(record);
        }
        added
    }

    /// Removes every row and column.
    pub fn clear(&mut self) {
        self.columns.clear();
        self.positions.clear();
        self.rows.clear();
    }
}
