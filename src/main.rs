//! # QBO Sync API Main Entry Point
//!
//! This is the main entry point for the QBO Sync API service.

use anyhow::Context;
use migration::{Migrator, MigratorTrait};
use qbo_sync::{
    config::ConfigLoader,
    db::init_pool,
    server::run_server,
    telemetry::init_tracing,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from layered env files and variables
    let config_loader = ConfigLoader::new();
    let config = config_loader.load().context("loading configuration")?;

    init_tracing(&config).context("initializing tracing")?;

    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    let db = init_pool(&config).await.context("connecting to database")?;

    // Apply pending migrations so a fresh database is usable immediately.
    Migrator::up(&db, None)
        .await
        .context("applying database migrations")?;

    run_server(config, db).await
}
