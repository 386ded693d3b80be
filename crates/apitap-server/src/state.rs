//! Application state for the API server.

use apitap_storage::{CaptureFile, IngestionEngine, SharedEngine};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Ingestion engine shared with the UI and pollers.
    pub engine: SharedEngine,
}

impl AppState {
    /// Creates state around an existing shared engine.
    pub fn new(engine: SharedEngine) -> Self {
        Self { engine }
    }

    /// Creates state with a fresh engine for `capture`.
    pub fn for_capture(capture: CaptureFile) -> Self {
        Self::new(IngestionEngine::new(capture).into_shared())
    }
}
