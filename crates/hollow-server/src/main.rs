//! Hollow Server binary

use anyhow::{Context, Result};
use clap::Parser;
use hollow_server::config::{Overrides, ServerConfig};
use hollow_server::{build_router, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hollow-server", version, about = "Hollow editor backend")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "HOLLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    bind: Option<String>,

    /// Directory holding the project source
    #[arg(long)]
    source_dir: Option<PathBuf>,

    /// Secret that unlocks the editor
    #[arg(long, env = "HOLLOW_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()));
        let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        eprintln!("[PANIC] at {:?}: {}", location, payload);
        tracing::error!("PANIC at {:?}: {}", location, payload);
    }));

    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let init = if args.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = init {
        eprintln!("[FATAL] Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    info!("Starting Hollow server v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run_server(args).await {
        error!("Server failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run_server(args: Args) -> Result<()> {
    let config = ServerConfig::load(
        args.config.as_deref(),
        Overrides {
            bind_address: args.bind,
            source_dir: args.source_dir,
            secret: args.secret,
        },
    )?;

    let addr: SocketAddr = config
        .bind_address
        .parse()
        .context("Failed to parse bind address")?;

    let state = AppState::from_config(config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
