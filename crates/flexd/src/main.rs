//! flexd — the flexscale autoscaler daemon.
//!
//! Wires the subsystems together: blueprint store, message bus, app
//! registry, metric consumers, aggregator, scaler loop and the binding
//! management API, all sharing one shutdown signal.
//!
//! # Usage
//!
//! ```text
//! flexd --config /etc/flexscale/flexd.toml
//! flexd --api-port 8412 --store-path ./flexscale.redb
//! ```

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use config::Settings;

#[derive(Parser)]
#[command(name = "flexd", about = "flexscale autoscaler daemon")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the management API port.
    #[arg(long)]
    api_port: Option<u16>,

    /// Override the blueprint store path.
    #[arg(long)]
    store_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,flexd=debug,flexscale=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(port) = cli.api_port {
        settings.api.port = port;
    }
    if let Some(path) = cli.store_path {
        settings.store.path = path;
    }

    info!("flexscale daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    if let Some(parent) = settings.store.path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = flexscale_state::BlueprintStore::open(&settings.store.path)?;
    info!(path = ?settings.store.path, "blueprint store opened");

    let bus = flexscale_bus::MessageBus::new();

    let manager = Arc::new(flexscale_core::ScalableAppManager::new(
        store,
        bus.clone(),
        settings.scaler_settings(),
    ));
    let loaded = manager.load_from_store().await?;
    info!(loaded, "app registry initialized");

    let engine = flexscale_engine::ScalingEngineClient::new(settings.engine_config());

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let consumer_handles = flexscale_core::consumer::spawn_consumers(
        manager.clone(),
        bus.clone(),
        shutdown_rx.clone(),
    );

    let aggregator = flexscale_core::Aggregator::new(
        manager.clone(),
        bus.clone(),
        manager.settings().aggregator_interval,
    );
    let aggregator_shutdown = shutdown_rx.clone();
    let aggregator_handle = tokio::spawn(async move {
        aggregator.run(aggregator_shutdown).await;
    });

    let scaler = flexscale_core::Scaler::new(
        manager.clone(),
        bus.clone(),
        engine.clone(),
        manager.settings().scaler_interval,
    );
    let scaler_shutdown = shutdown_rx.clone();
    let scaler_handle = tokio::spawn(async move {
        scaler.run(scaler_shutdown).await;
    });

    // ── Start API server ───────────────────────────────────────

    let router = flexscale_api::build_router(flexscale_api::ApiState {
        manager,
        engine: Arc::new(engine),
        secret: settings.broker.secret.clone(),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.api.port));

    info!(%addr, "management API starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks to drain.
    for handle in consumer_handles {
        let _ = handle.await;
    }
    let _ = aggregator_handle.await;
    let _ = scaler_handle.await;

    info!("flexscale daemon stopped");
    Ok(())
}
