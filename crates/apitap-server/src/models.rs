//! API request and response models.

use serde::Serialize;
use serde_json::Value;

/// Response body for GET /api/health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Response body for GET /api/table.
#[derive(Debug, Serialize)]
pub struct TableResponse {
    /// Column names in first-appearance order.
    pub columns: Vec<String>,
    /// One array per row, aligned with `columns`; absent cells are `null`.
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
    /// Capture-file lines consumed so far.
    pub ingested_lines: usize,
}

/// Response body for POST /api/items.
#[derive(Debug, Serialize)]
pub struct PushResponse {
    /// Rows appended by this request.
    pub added: usize,
    /// Rows in the table afterwards.
    pub row_count: usize,
}

/// Response body for POST /api/clear.
#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub row_count: usize,
}
