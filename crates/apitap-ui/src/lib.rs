//! apitap UI - desktop capture viewer.
//!
//! Shows the captured table as it grows and lets the user:
//!
//! - start and stop the external proxy, with a host filter
//! - load a saved capture or JSON file
//! - export the table to xlsx or CSV
//! - clear the table and the capture file
//! - copy any cell from its context menu
//!
//! # Usage
//!
//! ```no_run
//! use apitap_proxy::ProxyConfig;
//! use apitap_storage::{CaptureFile, IngestionEngine, Settings};
//! use apitap_ui::{run_viewer, ViewerOptions};
//!
//! let settings = Settings::default();
//! let engine = IngestionEngine::new(CaptureFile::new(&settings.capture_file)).into_shared();
//!
//! run_viewer(ViewerOptions {
//!     engine,
//!     proxy: ProxyConfig::default(),
//!     settings,
//!     settings_path: None,
//! })
//! .expect("Failed to run viewer");
//! ```

mod app;
pub mod error;
pub mod state;
pub mod theme;
pub mod views;

pub use app::ViewerApp;
pub use error::{Result, UiError};
pub use state::{AppState, ProxyStatus, ViewerOptions};

/// Runs the capture viewer until its window is closed.
pub fn run_viewer(options: ViewerOptions) -> Result<()> {
    let app = ViewerApp::new(options);
    let native_options = ViewerApp::window_options();

    eframe::run_native(
        "apitap",
        native_options,
        Box::new(|_cc| Ok(Box::new(app))),
    )
    .map_err(|e| UiError::Window(e.to_string()))
}
