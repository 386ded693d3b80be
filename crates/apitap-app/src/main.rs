//! apitap - capture JSON API responses into a live table.
//!
//! This is the main binary:
//! - Desktop viewer with proxy controls (default)
//! - Headless watcher for servers and scripts
//! - Capture sink for proxy hooks
//! - One-shot export and diagnostics

use std::panic;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod config;

use commands::WatchOptions;
use config::{load_settings, settings_path, Overrides};

/// apitap - capture JSON API responses into a live table
#[derive(Parser, Debug)]
#[command(name = "apitap", version, about)]
struct Args {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Settings file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Capture file shared with the proxy hook
    #[arg(long, global = true)]
    capture_file: Option<PathBuf>,

    /// Port the proxy listens on
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Comma-separated hosts to record (overrides ALLOWED_DOMAINS)
    #[arg(long, global = true)]
    domains: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the desktop viewer (default)
    Gui,

    /// Run the proxy and ingest captures without a window, until Ctrl-C
    Watch {
        /// Only watch the capture file; do not launch the proxy
        #[arg(long)]
        no_proxy: bool,

        /// Do not start the push API
        #[arg(long)]
        no_push_api: bool,

        /// Export the table to this file on shutdown (.xlsx or CSV)
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Record decoded exchanges read as JSON lines from stdin
    Sink,

    /// Load a saved capture or JSON file and export it as xlsx or CSV
    Export {
        /// File to load
        #[arg(long)]
        input: PathBuf,

        /// File to write; `.xlsx` writes a workbook, anything else CSV
        #[arg(long)]
        output: PathBuf,
    },

    /// Check the proxy, hook script, port and capture file
    Doctor {
        /// Send a test request to this URL through the running proxy
        #[arg(long)]
        probe_url: Option<String>,
    },
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            capture_file: self.capture_file.clone(),
            proxy_port: self.port,
            domains: self.domains.clone(),
        }
    }

    /// Console output alongside the log file.
    fn logs_to_console(&self) -> bool {
        self.debug || matches!(self.command, Some(Command::Watch { .. }))
    }
}

/// Get the logs directory path.
fn logs_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "apitap", "apitap").map(|dirs| dirs.data_dir().join("logs"))
}

/// Initialize logging with file rotation.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("apitap={},warn", log_level)));

    if let Some(log_dir) = logs_dir() {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("apitap")
                .filename_suffix("log")
                .build(&log_dir)
                .ok();

            if let Some(appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                if args.logs_to_console() {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt::layer().with_writer(std::io::stdout))
                        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                        .init();
                } else {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                        .init();
                }

                tracing::debug!("Logging to {:?}", log_dir);
                return Some(guard);
            }
        }
    }

    // Fallback: console logging only
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::warn!("File logging unavailable, using console only");
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Keep the guard alive for the duration of the program
    let _log_guard = init_logging(&args);

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        tracing::error!("PANIC: {}", panic_info);
        default_hook(panic_info);
    }));

    tracing::info!("Starting apitap {}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Args: {:?}", args);

    let settings_path = settings_path(args.config.as_deref());
    let settings = load_settings(settings_path.as_deref(), &args.overrides())?;

    match args.command.unwrap_or(Command::Gui) {
        Command::Gui => commands::gui(settings, settings_path)?,
        Command::Watch {
            no_proxy,
            no_push_api,
            export,
        } => {
            commands::watch(
                settings,
                WatchOptions {
                    no_proxy,
                    no_push_api,
                    export,
                },
            )
            .await?
        }
        Command::Sink => {
            commands::sink(&settings, std::io::stdin().lock())?;
        }
        Command::Export { input, output } => {
            commands::export(&settings, &input, &output)?;
        }
        Command::Doctor { probe_url } => {
            commands::doctor(&settings, probe_url.as_deref()).await?
        }
    }

    tracing::info!("apitap shutting down");
    Ok(())
}
