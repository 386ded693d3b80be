//! API route handlers.

use axum::extract::State;
use axum::Json;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{ClearResponse, HealthResponse, PushResponse, TableResponse};
use crate::state::AppState;

/// GET /api/health - Liveness check.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// GET /api/table - Snapshot of the current table.
pub async fn get_table(State(state): State<AppState>) -> Json<TableResponse> {
    let engine = state.engine.lock();
    let table = engine.table();

    let rows: Vec<Vec<Value>> = table
        .rows()
        .map(|row| {
            (0..table.columns().len())
                .map(|column| row.get(column).value().cloned().unwrap_or(Value::Null))
                .collect()
        })
        .collect();

    Json(TableResponse {
        columns: table.columns().to_vec(),
        rows,
        row_count: table.len(),
        ingested_lines: engine.ingested_lines(),
    })
}

/// POST /api/items - Push records into the table.
///
/// An array pushes each element as its own row; any other value is one row.
pub async fn push_items(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<PushResponse>> {
    let items = match body {
        Value::Array(items) => items,
        other => vec![other],
    };

    let mut engine = state.engine.lock();
    let added = items.len();
    for item in items {
        engine.add_single(item);
    }
    debug!("Pushed {} items", added);

    Ok(Json(PushResponse {
        added,
        row_count: engine.row_count(),
    }))
}

/// POST /api/clear - Clear the table and the capture file.
pub async fn clear(State(state): State<AppState>) -> Result<Json<ClearResponse>> {
    let mut engine = state.engine.lock();
    engine.clear()?;
    info!("Capture data cleared via API");

    Ok(Json(ClearResponse {
        row_count: engine.row_count(),
    }))
}
