//! # pagesync
//!
//! Server binary: loads config, registers the demo pages and serves the
//! pagesync namespace until Ctrl-C.

#![deny(unsafe_code)]

mod demo;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pagesync_core::HandlerError;
use pagesync_server::{load_config, LogFormat, PageSyncServer};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

/// Page state sync server.
#[derive(Parser, Debug)]
#[command(name = "pagesync", about = "Server-driven page state sync over WebSocket")]
struct Cli {
    /// JSON config file, deep-merged over the defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides config).
    #[arg(long)]
    port: Option<u16>,

    /// Require `auth` with `{"token": <value>}` before page traffic is accepted.
    #[arg(long)]
    auth_token: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("failed to load config")?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if cli.json_logs {
        config.log_format = LogFormat::Json;
    }
    config.validate().context("invalid config")?;

    init_tracing(config.log_format);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting pagesync");

    let metrics = pagesync_server::metrics::install_recorder()
        .context("failed to install metrics recorder")?;

    let mut server = PageSyncServer::new(config);
    let engine = server.engine_mut();
    demo::register(engine).context("failed to register demo pages")?;
    if let Some(token) = cli.auth_token {
        tracing::info!("auth gate enabled");
        engine.auth(move |credentials: Value| {
            let accepted = credentials.get("token").and_then(Value::as_str) == Some(token.as_str());
            async move { Ok::<_, HandlerError>(accepted) }
        });
    }

    let handle = server.start(Some(metrics)).await.context("failed to start server")?;
    tracing::info!(url = %handle.ws_url(), "pagesync ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    if !handle.shutdown(None).await {
        tracing::warn!("some connections were still dispatching at exit");
    }
    Ok(())
}
