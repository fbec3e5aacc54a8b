//! # Token Refresh Service
//!
//! On-demand refresh of stored QuickBooks tokens. Every authenticated
//! provider call goes through [`TokenRefreshService::ensure_fresh`], which
//! hands back the stored access token while it is still valid and performs
//! exactly one refresh exchange once it has expired. QuickBooks rotates the
//! refresh token on every exchange, so a successful refresh always replaces
//! both tokens. There is no background scan; refresh happens only on demand.

use chrono::Utc;
use metrics::{counter, histogram};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::qbo::{QboClient, QboError};
use crate::repositories::ConnectionRepository;

/// Access credentials ready for an authenticated provider call
#[derive(Debug, Clone)]
pub struct FreshAccess {
    /// Realm the connection is bound to
    pub realm_id: String,
    /// Decrypted, unexpired access token
    pub access_token: String,
}

/// Token refresh error types
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("QuickBooks is not connected")]
    NotConnected,
    #[error("QuickBooks rejected the token refresh (status {status})")]
    Rejected { status: u16, body: String },
    #[error(transparent)]
    Exchange(QboError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<RefreshError> for ApiError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::NotConnected => crate::error::not_connected(),
            // The provider refused the stored refresh token; the user has to
            // run the connect flow again.
            RefreshError::Rejected { status, .. } => {
                warn!(status, "Stored refresh token was rejected");
                crate::error::connection_invalid()
            }
            RefreshError::Exchange(qbo_err) => qbo_err.into(),
            RefreshError::Internal(inner) => inner.into(),
        }
    }
}

/// On-demand token refresh with per-user single-flight coalescing
pub struct TokenRefreshService {
    connection_repo: Arc<ConnectionRepository>,
    qbo: Arc<QboClient>,
    /// Per-user guards so concurrent callers coalesce onto one exchange
    refresh_guards: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl TokenRefreshService {
    /// Create a new token refresh service instance
    pub fn new(connection_repo: Arc<ConnectionRepository>, qbo: Arc<QboClient>) -> Self {
        Self {
            connection_repo,
            qbo,
            refresh_guards: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Return a valid access token for the user's connection, refreshing
    /// first when the stored one has expired.
    ///
    /// The fast path performs no write and no provider call. The slow path
    /// takes the per-user guard, re-checks expiry (a coalesced caller may
    /// have already refreshed), runs one exchange, and persists the rotated
    /// pair. A rejected or timed-out exchange leaves the stored connection
    /// untouched.
    #[instrument(skip(self))]
    pub async fn ensure_fresh(&self, user_id: Uuid) -> Result<FreshAccess, RefreshError> {
        let connection = self
            .connection_repo
            .find_by_user(user_id)
            .await?
            .ok_or(RefreshError::NotConnected)?;

        if !connection.is_expired(Utc::now()) {
            let (access_token, _refresh_token) = self.connection_repo.decrypt_tokens(&connection)?;
            return Ok(FreshAccess {
                realm_id: connection.realm_id,
                access_token,
            });
        }

        let guard = self.user_guard(user_id).await;
        let held = guard.lock().await;
        let result = self.refresh_expired(user_id).await;
        drop(held);

        // Dropping the map entry keeps the guard table bounded. A caller
        // racing the removal at worst runs a duplicate exchange, which
        // last-write-wins absorbs.
        self.refresh_guards.lock().await.remove(&user_id);

        result
    }

    async fn refresh_expired(&self, user_id: Uuid) -> Result<FreshAccess, RefreshError> {
        let connection = self
            .connection_repo
            .find_by_user(user_id)
            .await?
            .ok_or(RefreshError::NotConnected)?;

        if !connection.is_expired(Utc::now()) {
            // A coalesced caller refreshed while we waited for the guard.
            let (access_token, _refresh_token) = self.connection_repo.decrypt_tokens(&connection)?;
            return Ok(FreshAccess {
                realm_id: connection.realm_id,
                access_token,
            });
        }

        let refresh_started = std::time::Instant::now();
        counter!("qbo_token_refresh_attempts_total").increment(1);

        let (_access_token, refresh_token) = self.connection_repo.decrypt_tokens(&connection)?;

        let grant = match self.qbo.refresh_tokens(&refresh_token).await {
            Ok(grant) => grant,
            Err(QboError::Provider { status, body }) => {
                counter!("qbo_token_refresh_failure_total").increment(1);
                warn!(
                    user_id = %user_id,
                    status,
                    "QuickBooks rejected the token refresh"
                );
                return Err(RefreshError::Rejected { status, body });
            }
            Err(err) => {
                counter!("qbo_token_refresh_failure_total").increment(1);
                error!(user_id = %user_id, error = %err, "Token refresh request failed");
                return Err(RefreshError::Exchange(err));
            }
        };

        let updated = self.connection_repo.update_tokens(&connection, &grant).await?;

        histogram!("qbo_token_refresh_latency_ms")
            .record(refresh_started.elapsed().as_secs_f64() * 1_000.0);
        counter!("qbo_token_refresh_success_total").increment(1);

        info!(
            user_id = %user_id,
            expires_at = %grant.expires_at,
            "Refreshed QuickBooks tokens"
        );

        Ok(FreshAccess {
            realm_id: updated.realm_id,
            access_token: grant.access_token,
        })
    }

    async fn user_guard(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        let mut guards = self.refresh_guards.lock().await;
        guards
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
