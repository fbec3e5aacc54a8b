//! # Background Maintenance
//!
//! Periodic sweep of expired OAuth states and unclaimed pending
//! authorizations. Every read path already filters expired rows, so
//! correctness never depends on this loop; it only keeps the short-lived
//! handshake tables from accumulating dead rows.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics::counter;
use sea_orm::DatabaseConnection;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::crypto::CryptoKey;
use crate::repositories::{OAuthStateRepository, PendingAuthorizationRepository};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Sweeper for expired handshake rows
pub struct MaintenanceSweeper {
    oauth_states: OAuthStateRepository,
    pending: PendingAuthorizationRepository,
    interval: Duration,
}

impl MaintenanceSweeper {
    pub fn new(db: Arc<DatabaseConnection>, crypto_key: CryptoKey) -> Self {
        Self {
            oauth_states: OAuthStateRepository::new(Arc::clone(&db)),
            pending: PendingAuthorizationRepository::new(db, crypto_key),
            interval: SWEEP_INTERVAL,
        }
    }

    /// Override the sweep interval (primarily for tests).
    #[allow(dead_code)]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the sweep loop until the provided shutdown token fires
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!("Starting maintenance sweeper");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Maintenance sweeper shutdown requested");
                    break;
                }
                _ = sleep(self.interval) => {
                    if let Err(err) = self.sweep().await {
                        error!(error = ?err, "Maintenance sweep failed");
                    }
                }
            }
        }

        info!("Maintenance sweeper stopped");
    }

    /// Delete expired OAuth states and pending authorizations
    pub async fn sweep(&self) -> Result<()> {
        let states = self
            .oauth_states
            .cleanup_expired()
            .await
            .context("Failed to sweep expired OAuth states")?;
        let pending = self
            .pending
            .cleanup_expired()
            .await
            .context("Failed to sweep expired pending authorizations")?;

        if states > 0 || pending > 0 {
            info!(
                oauth_states = states,
                pending_authorizations = pending,
                "Swept expired handshake rows"
            );
            counter!("qbo_maintenance_swept_rows_total").increment(states + pending);
        }

        Ok(())
    }
}
