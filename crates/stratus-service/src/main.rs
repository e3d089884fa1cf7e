//! Stratus Service - Background sync scheduler and HTTP API.
//!
//! Run with: `cargo run -p stratus-service`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use stratus_core::{Engine, OpenWeatherClient};
use stratus_service::{AppState, Config, api};
use stratus_store::Store;

/// Stratus Service - Background sync scheduler and HTTP REST API.
#[derive(Parser, Debug)]
#[command(name = "stratus-service")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long)]
    bind: Option<String>,

    /// Database path (overrides config).
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Disable the background scheduler (API only mode).
    #[arg(long)]
    no_scheduler: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stratus_service=info".parse()?)
                .add_directive("stratus_core=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    // Load configuration, then apply CLI overrides
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    }
    .with_overrides(args.bind, args.database)?;

    // Open the database
    info!("Opening database at {:?}", config.storage.path);
    let store = Store::open(&config.storage.path)?;

    // Provider client
    let openweather = config.provider.openweather_config();
    if openweather.api_key.is_none() {
        warn!(
            "No provider API key configured (set [provider] api_key or {}); syncs will fail",
            config.provider.api_key_env
        );
    }
    let provider = OpenWeatherClient::new(openweather).context("building provider client")?;

    // Engine and settings channel
    let (settings_tx, settings_rx) = watch::channel(config.sync_settings());
    let engine = Engine::new(
        store,
        Arc::new(provider),
        settings_rx,
        config.provider.outbound_limit(),
    );
    let state = AppState::new(engine, config.clone(), settings_tx);
    let settings = state.reload_settings().await?;
    info!(
        "Units: {}, default sync interval: {}s",
        settings.units.as_str(),
        settings.default_interval_secs
    );

    // Start the background scheduler
    if !args.no_scheduler {
        state.scheduler.start(&state.engine).await;
    } else {
        info!("Background scheduler disabled");
    }

    // Periodically drop idle rate-limit buckets
    if config.security.rate_limit_enabled {
        let cleanup_state = Arc::clone(&state);
        let cleanup_period = cleanup_state.limiter.config().window;
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(cleanup_period);
            loop {
                timer.tick().await;
                cleanup_state.limiter.cleanup();
            }
        });
    }

    // Parse bind address
    let addr: SocketAddr = config.server.bind.parse()?;

    info!("Starting server on {}", addr);

    // Run the server
    let app = api::app(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    state.scheduler.stop().await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
