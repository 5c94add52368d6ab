//! zonekeeperd: runs the zonekeeper services and periodic jobs against a local SQLite store.
//!
//! Config lookup: `$ZONEKEEPER_CONFIG`, then `<config dir>/zonekeeper/config.toml`.
//! Stop with Ctrl-C; queued certificate work is drained before exit.

use std::sync::Arc;

use anyhow::Context;
use zonekeeper_app::adapters::SqliteStore;
use zonekeeper_app::config::AppConfig;
use zonekeeper_app::{logging, AppStateBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    logging::init(&config.logging).context("failed to install tracing subscriber")?;

    tracing::info!("Starting zonekeeperd {}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Configuration: {:?}", config.core);

    let store = SqliteStore::new(&config.database.path)
        .await
        .context("failed to open database")?;

    let state = AppStateBuilder::new()
        .config(Arc::new(config.core))
        .store(Arc::new(store))
        .build()
        .context("failed to build application state")?;

    let scheduler = state.start_scheduler();
    if let Some(handle) = &scheduler {
        tracing::info!("Scheduler running: {}", handle.job_names().join(", "));
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested");

    if let Some(handle) = scheduler {
        handle.shutdown().await;
    }
    state.shutdown().await;

    tracing::info!("zonekeeperd stopped");
    Ok(())
}
