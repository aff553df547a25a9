//! Wagerbook Server
//!
//! Hosts the betting core: loads configuration, connects storage, wires the
//! event subscribers and runs the expiration sweeper until a shutdown signal.

mod config;
mod shutdown;
mod state;

use clap::Parser;
use config::{ConfigLoader, get_database_url};
use shutdown::{shutdown_signal, spawn_config_reload_handler};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use wagerbook_core::config::ConfigStore;
use wagerbook_core::processors::ExpirationSweeper;
use wagerbook_core::storage::{MemoryStore, PgStore, SharedStore};

/// Wagerbook - ledger-backed social betting core
#[derive(Parser, Debug)]
#[command(name = "wagerbook-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./wagerbook-config.toml")]
    config: PathBuf,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Keep everything in memory instead of connecting to Postgres
    #[arg(long, default_value = "false")]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting wagerbook-server v{}", env!("CARGO_PKG_VERSION"));

    let config_loader = Arc::new(ConfigLoader::new(&args.config));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let max_connections = loaded_config.max_connections;
    let config_store = ConfigStore::new(loaded_config.engine);

    let (store, db_pool): (SharedStore, Option<PgPool>) = if args.in_memory {
        tracing::warn!("Running with in-memory storage, nothing will be persisted");
        (Arc::new(MemoryStore::new()), None)
    } else {
        let pool = connect_database(max_connections, args.migrate).await?;
        (Arc::new(PgStore::new(pool.clone())), Some(pool))
    };

    let state = AppState::new(store, config_store.clone());

    match state.audit_leading_accounts().await {
        Ok(0) => tracing::info!("Startup ledger audit passed"),
        Ok(count) => tracing::error!(count, "Startup ledger audit found inconsistent accounts"),
        Err(e) => tracing::error!(error = %e, "Startup ledger audit failed"),
    }
    if let Err(e) = state.refresh_top_holder().await {
        tracing::warn!(error = %e, "Failed to compute the initial top holder");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = ExpirationSweeper::new(state.group_wagers.clone());
    let sweeper_handle = tokio::spawn(sweeper.run(
        shutdown_rx,
        state.config.clone(),
        state.config.subscribe(),
    ));

    let reload_notify = spawn_config_reload_handler(config_loader, config_store);

    tracing::info!("Wagerbook core is running");
    let result = shutdown_signal().await;

    // Stop the background work before tearing down storage.
    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper_handle.await {
        tracing::error!(error = %e, "Expiration sweeper task failed");
    }
    reload_notify.notify_one();
    state.bus.close();

    if let Some(pool) = db_pool {
        tracing::info!("Closing database connections...");
        pool.close().await;
    }
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

async fn connect_database(max_connections: u32, migrate: bool) -> anyhow::Result<PgPool> {
    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    if migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&pool).await.map_err(|e| {
            tracing::error!("Failed to run migrations: {}", e);
            e
        })?;
        tracing::info!("Migrations completed successfully");
    }
    Ok(pool)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
