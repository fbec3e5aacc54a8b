//! Database connection and pool management for the QBO Sync API.
//!
//! This module provides functionality to initialize and manage a SeaORM
//! connection pool with configurable parameters. Production runs against
//! Postgres; the integration tests point the same code at in-memory SQLite.

use anyhow::{Context, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::AppConfig;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {source}")]
    ConnectionFailed {
        #[from]
        source: sea_orm::DbErr,
    },
    #[error("Database connection timeout after {timeout_ms}ms")]
    ConnectionTimeout { timeout_ms: u64 },
    #[error("Invalid database configuration: {message}")]
    InvalidConfiguration { message: String },
}

/// Initializes a database connection pool with the given configuration.
///
/// Transient connection failures are retried with exponential backoff, so a
/// service booting alongside its database does not need supervision.
///
/// # Examples
///
/// ```no_run
/// use qbo_sync::{config::AppConfig, db::init_pool};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = AppConfig::default();
///     let db = init_pool(&config).await?;
///     // Use the database connection...
///     Ok(())
/// }
/// ```
pub async fn init_pool(cfg: &AppConfig) -> Result<DatabaseConnection> {
    if cfg.database_url.is_empty() {
        return Err(DatabaseError::InvalidConfiguration {
            message: "Database URL cannot be empty".to_string(),
        }
        .into());
    }

    let mut opt = ConnectOptions::new(&cfg.database_url);
    opt.max_connections(cfg.db_max_connections)
        .acquire_timeout(Duration::from_millis(cfg.db_acquire_timeout_ms))
        .idle_timeout(Duration::from_secs(600)) // 10 minutes
        .max_lifetime(Duration::from_secs(1800)) // 30 minutes
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let max_retries = 5;
    let mut retry_delay = Duration::from_millis(100);

    for attempt in 1..=max_retries {
        match Database::connect(opt.clone()).await {
            Ok(conn) => {
                info!(attempt, "Connected to database");
                return Ok(conn);
            }
            Err(e) => {
                if attempt == max_retries {
                    error!(
                        attempts = max_retries,
                        error = %e,
                        "Giving up on database connection"
                    );
                    return Err(DatabaseError::ConnectionFailed { source: e }.into());
                }

                warn!(
                    attempt,
                    error = %e,
                    retry_in_ms = retry_delay.as_millis() as u64,
                    "Database connection attempt failed, retrying"
                );

                sleep(retry_delay).await;
                retry_delay *= 2;
            }
        }
    }

    Err(DatabaseError::ConnectionTimeout {
        timeout_ms: cfg.db_acquire_timeout_ms,
    }
    .into())
}

/// Health check for the database connection.
///
/// Issues `SELECT 1` so connection loss surfaces before a handler trips
/// over it.
pub async fn health_check(db: &DatabaseConnection) -> Result<()> {
    use sea_orm::Statement;

    let stmt = Statement::from_string(db.get_database_backend(), "SELECT 1".to_string());

    db.query_one(stmt)
        .await
        .context("Database health check failed")?;

    Ok(())
}
