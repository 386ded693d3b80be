//! apitap Server - local push API.
//!
//! Lets other local tools push JSON records into the live table and read it
//! back, sharing the same ingestion engine as the GUI.
//!
//! ## Endpoints
//!
//! - `GET /api/health` - Liveness check
//! - `GET /api/table` - Columns, rows, and ingestion progress
//! - `POST /api/items` - Push one record, or each element of an array
//! - `POST /api/clear` - Clear the table and truncate the capture file
//!
//! ## Example
//!
//! ```no_run
//! use apitap_server::{AppState, Server, ServerConfig};
//! use apitap_storage::CaptureFile;
//!
//! #[tokio::main]
//! async fn main() {
//!     let state = AppState::for_capture(CaptureFile::new("captured_data.json"));
//!     let server = Server::with_state(ServerConfig::default(), state).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod error;
mod handlers;
pub mod models;
pub mod state;

use std::future::Future;
use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use error::{ApiError, Result};
pub use state::AppState;

/// Default server port.
pub const DEFAULT_PORT: u16 = apitap_core::DEFAULT_PUSH_PORT;

/// Default server host (localhost only).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1).
    pub host: String,
    /// Port to bind to (default: 48766).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// Creates a config for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    BindError(SocketAddr, std::io::Error),

    /// Server runtime error.
    #[error("server error: {0}")]
    Runtime(String),
}

/// Builds the API router around `state`.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/table", get(handlers::get_table))
        .route("/api/items", post(handlers::push_items))
        .route("/api/clear", post(handlers::clear))
        .layer(cors)
        .with_state(state)
}

/// The HTTP API server.
pub struct Server {
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Creates a server with the given application state.
    pub fn with_state(
        config: ServerConfig,
        state: AppState,
    ) -> std::result::Result<Self, ServerError> {
        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| ServerError::Runtime(format!("invalid address: {}", e)))?;

        Ok(Self {
            router: router(state),
            addr,
        })
    }

    /// Returns the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the server until it fails.
    pub async fn run(self) -> std::result::Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the server until `shutdown` completes.
    pub async fn run_until<F>(self, shutdown: F) -> std::result::Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Starting apitap push API on {}", self.addr);
        let listener = bind(self.addr)?;

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Runtime(e.to_string()))?;

        info!("Push API stopped");
        Ok(())
    }

    /// Returns the router for testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Binds with SO_REUSEADDR so a restart does not trip over lingering sockets.
fn bind(addr: SocketAddr) -> std::result::Result<tokio::net::TcpListener, ServerError> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| ServerError::BindError(addr, e))?;
    socket
        .set_reuse_address(true)
        .map_err(|e| ServerError::BindError(addr, e))?;
    socket
        .bind(&addr.into())
        .map_err(|e| ServerError::BindError(addr, e))?;
    socket
        .listen(128)
        .map_err(|e| ServerError::BindError(addr, e))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| ServerError::BindError(addr, e))?;

    let std_listener: std::net::TcpListener = socket.into();
    tokio::net::TcpListener::from_std(std_listener).map_err(|e| ServerError::BindError(addr, e))
}
