//! Subcommand implementations.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use apitap_proxy::{
    locate, port_in_use, probe, ProxyProcess, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PROBE_TIMEOUT,
};
use apitap_server::{AppState as ApiState, Server};
use apitap_storage::{
    export_table, CaptureFile, CaptureSink, ExportOutcome, IngestionEngine, Settings, SharedEngine,
    SinkSummary,
};
use apitap_ui::{run_viewer, ViewerOptions};
use tracing::{error, info, warn};

use crate::config::{hook_script, hooks_dir, proxy_config, proxy_template, server_config};

const PROBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Starts the push API in the background when it is enabled.
fn spawn_push_api(settings: &Settings, engine: SharedEngine) -> Option<tokio::task::JoinHandle<()>> {
    if !settings.push_api.enabled {
        return None;
    }

    match Server::with_state(server_config(settings), ApiState::new(engine)) {
        Ok(server) => Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Push API error: {}", e);
            }
        })),
        Err(e) => {
            error!("Failed to configure push API: {}", e);
            None
        }
    }
}

fn shared_engine(settings: &Settings) -> SharedEngine {
    IngestionEngine::new(CaptureFile::new(&settings.capture_file)).into_shared()
}

/// Runs the desktop viewer.
pub fn gui(settings: Settings, settings_path: Option<PathBuf>) -> anyhow::Result<()> {
    let engine = shared_engine(&settings);
    let _push_api = spawn_push_api(&settings, engine.clone());

    let proxy = proxy_template(&settings);
    run_viewer(ViewerOptions {
        engine,
        proxy,
        settings,
        settings_path,
    })
    .context("Viewer failed")
}

/// Options for headless watching.
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub no_proxy: bool,
    pub no_push_api: bool,
    pub export: Option<PathBuf>,
}

/// Polls the capture file until Ctrl-C, optionally running the proxy.
pub async fn watch(settings: Settings, options: WatchOptions) -> anyhow::Result<()> {
    let engine = shared_engine(&settings);
    if !options.no_push_api {
        spawn_push_api(&settings, engine.clone());
    }

    let mut proxy = if options.no_proxy {
        None
    } else {
        let config = proxy_config(&settings);
        if port_in_use(&config.listen_host, config.port, DEFAULT_CONNECT_TIMEOUT) {
            bail!(
                "Port {} is already in use; stop the other program or pick another port",
                config.port
            );
        }
        let process = tokio::task::spawn_blocking(move || ProxyProcess::spawn(config)).await??;
        println!("{}", process.config().connection_hint());
        Some(process)
    };

    info!(
        "Watching {} every {:?}",
        settings.capture_file.display(),
        settings.poll_interval()
    );

    let mut ticker = tokio::time::interval(settings.poll_interval());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut failure = None;
    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Interrupted, shutting down");
                break;
            }
            _ = ticker.tick() => {
                poll_once(&engine);

                if let Some(process) = proxy.as_mut() {
                    if !process.is_running() {
                        failure = Some(anyhow!(
                            "Proxy exited unexpectedly: {}",
                            process.stderr_output().trim()
                        ));
                        break;
                    }
                }
            }
        }
    }

    if let Some(process) = proxy.take() {
        let outcome = tokio::task::spawn_blocking(move || process.stop()).await?;
        info!("Proxy stopped ({})", outcome.as_str());
    }

    poll_once(&engine);

    if let Some(path) = &options.export {
        let outcome = export_table(engine.lock().table(), path)?;
        report_export(&outcome);
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn poll_once(engine: &SharedEngine) {
    let mut engine = engine.lock();
    match engine.poll() {
        Ok(outcome) if outcome.has_new_rows() => info!(
            "{} new rows ({} total)",
            outcome.new_rows,
            engine.row_count()
        ),
        Ok(_) => {}
        Err(e) => warn!("Failed to read capture file: {}", e),
    }
}

/// Records decoded exchanges read as JSON lines from `reader`.
pub fn sink<R: BufRead>(settings: &Settings, reader: R) -> anyhow::Result<SinkSummary> {
    let sink = CaptureSink::new(
        CaptureFile::new(&settings.capture_file),
        settings.allow_list(),
    );
    let summary = sink.record_lines(reader);

    info!(
        "Sink finished: {} recorded, {} filtered, {} not JSON, {} unreadable, {} failed",
        summary.recorded, summary.filtered, summary.not_json, summary.unreadable, summary.failed
    );

    if summary.failed > 0 {
        bail!(
            "{} exchanges could not be written to {}",
            summary.failed,
            settings.capture_file.display()
        );
    }
    Ok(summary)
}

/// Loads `input` and exports the resulting table to `output`.
pub fn export(settings: &Settings, input: &Path, output: &Path) -> anyhow::Result<ExportOutcome> {
    let mut engine = IngestionEngine::new(CaptureFile::new(&settings.capture_file));
    engine
        .load_file(input)
        .with_context(|| format!("Failed to load {}", input.display()))?;

    let outcome = export_table(engine.table(), output)?;
    report_export(&outcome);
    Ok(outcome)
}

fn report_export(outcome: &ExportOutcome) {
    match outcome {
        ExportOutcome::NothingToExport => println!("nothing to export"),
        ExportOutcome::Written { rows, path } => {
            println!("Exported {} rows to {}", rows, path.display())
        }
    }
}

/// Reports whether the pieces apitap depends on are in place.
pub async fn doctor(settings: &Settings, probe_url: Option<&str>) -> anyhow::Result<()> {
    let mut problems = 0;

    println!("apitap {}", env!("CARGO_PKG_VERSION"));
    println!("  capture file:  {}", settings.capture_file.display());
    let hook = hook_script(settings, &hooks_dir(settings));
    println!("  hook script:   {}", hook.display());
    println!("  proxy address: {}:{}", settings.listen_host, settings.proxy_port);
    if !settings.allowed_domains.is_empty() {
        println!("  domains:       {}", settings.allowed_domains.join(", "));
    }
    println!();

    let executable = locate(settings.proxy_executable.as_deref(), DEFAULT_PROBE_TIMEOUT);
    match probe(&executable, DEFAULT_PROBE_TIMEOUT) {
        Ok(report) => println!("[ok]   proxy {} ({})", report.executable.display(), report.version),
        Err(e) => {
            problems += 1;
            println!("[fail] proxy: {}", e);
        }
    }

    if hook.is_file() {
        println!("[ok]   hook script found");
    } else {
        problems += 1;
        println!("[fail] hook script {} not found", hook.display());
    }

    let config = proxy_config(settings);
    let port_busy = port_in_use(&config.listen_host, config.port, DEFAULT_CONNECT_TIMEOUT);
    if port_busy {
        println!(
            "[warn] port {} is in use (a proxy may already be running)",
            config.port
        );
    } else {
        println!("[ok]   port {} is free", config.port);
    }

    let capture = CaptureFile::new(&settings.capture_file);
    match capture.complete_line_count() {
        Ok(lines) if capture.exists() => println!("[ok]   capture file has {} lines", lines),
        Ok(_) => println!("[ok]   capture file not created yet"),
        Err(e) => {
            problems += 1;
            println!("[fail] capture file: {}", e);
        }
    }

    if let Some(url) = probe_url {
        if !port_busy {
            problems += 1;
            println!("[fail] nothing is listening on {}; start the proxy first", config.local_addr());
        } else {
            match request_through_proxy(&config.proxy_url(), url).await {
                Ok(status) => println!("[ok]   {} via proxy: {}", url, status),
                Err(e) => {
                    problems += 1;
                    println!("[fail] {} via proxy: {:#}", url, e);
                }
            }
        }
    }

    if problems > 0 {
        bail!("{} problem(s) found", problems);
    }
    println!("\nAll checks passed");
    Ok(())
}

async fn request_through_proxy(proxy_url: &str, target: &str) -> anyhow::Result<reqwest::StatusCode> {
    let client = reqwest::Client::builder()
        .user_agent(format!("apitap/{}", env!("CARGO_PKG_VERSION")))
        .proxy(reqwest::Proxy::all(proxy_url)?)
        // The intercepting proxy re-signs TLS with its own CA.
        .danger_accept_invalid_certs(true)
        .timeout(PROBE_REQUEST_TIMEOUT)
        .build()?;

    let response = client.get(target).send().await?;
    Ok(response.status())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn settings_in(dir: &TempDir) -> Settings {
        Settings {
            capture_file: dir.path().join("captured_data.json"),
            ..Settings::default()
        }
    }

    #[test]
    fn test_sink_records_allowed_hosts() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings_in(&dir);
        settings.allowed_domains = vec!["api.example.com".to_string()];

        let input = [
            json!({
                "url": "https://api.example.com/users",
                "method": "GET",
                "host": "api.example.com",
                "path": "/users",
                "status_code": 200,
                "body": "{\"id\": 1}"
            }),
            json!({
                "url": "https://ads.example.com/pixel",
                "method": "GET",
                "host": "ads.example.com",
                "path": "/pixel",
                "status_code": 200,
                "body": "{}"
            }),
        ]
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("\n");

        let summary = sink(&settings, input.as_bytes()).unwrap();
        assert_eq!(summary.recorded, 1);
        assert_eq!(summary.filtered, 1);

        let text = std::fs::read_to_string(&settings.capture_file).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("api.example.com"));
    }

    #[test]
    fn test_export_capture_file() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        let input = dir.path().join("saved.json");
        let lines = [
            json!({"url": "u1", "status_code": 200, "response_data": {"id": 1}}),
            json!({"url": "u2", "status_code": 200, "response_data": {"id": 2}}),
        ];
        let text: String = lines.iter().map(|v| format!("{}\n", v)).collect();
        std::fs::write(&input, text).unwrap();

        let output = dir.path().join("out.csv");
        let outcome = export(&settings, &input, &output).unwrap();

        assert_eq!(
            outcome,
            ExportOutcome::Written {
                rows: 2,
                path: output.clone()
            }
        );
        assert!(output.exists());
    }

    #[test]
    fn test_export_workbook() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        let input = dir.path().join("saved.json");
        std::fs::write(&input, r#"[{"id": 1, "ok": true}, {"id": 2}]"#).unwrap();

        let output = dir.path().join("out.xlsx");
        let outcome = export(&settings, &input, &output).unwrap();

        assert_eq!(
            outcome,
            ExportOutcome::Written {
                rows: 2,
                path: output.clone()
            }
        );
        assert!(std::fs::read(&output).unwrap().starts_with(b"PK"));
    }

    #[test]
    fn test_export_nothing() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        let input = dir.path().join("empty.json");
        std::fs::write(&input, "[]").unwrap();

        let output = dir.path().join("out.csv");
        let outcome = export(&settings, &input, &output).unwrap();

        assert_eq!(outcome, ExportOutcome::NothingToExport);
        assert!(!output.exists());
    }

    #[test]
    fn test_export_missing_input() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);

        let result = export(
            &settings,
            &dir.path().join("missing.json"),
            &dir.path().join("out.csv"),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_poll_once_ingests() {
        let dir = TempDir::new().unwrap();
        let settings = settings_in(&dir);
        std::fs::write(&settings.capture_file, "{\"a\": 1}\n{\"a\": 2}\n").unwrap();

        let engine = shared_engine(&settings);
        poll_once(&engine);

        assert_eq!(engine.lock().row_count(), 2);
    }
}
