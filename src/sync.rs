//! # Customer Sync Engine
//!
//! One-shot reconciliation of QuickBooks customers into local storage. A
//! sync run obtains a valid access token, issues a single bounded query,
//! maps the remote shape onto the local schema, and applies the whole batch
//! in one transaction keyed by (user, remote id). Rows that disappeared
//! upstream are kept; sync never deletes.

use chrono::Utc;
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::qbo::{QboClient, QboCustomer, QboError};
use crate::repositories::customer::CustomerUpsert;
use crate::repositories::CustomerRepository;
use crate::token_refresh::{RefreshError, TokenRefreshService};

/// Sync error types
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Refresh(#[from] RefreshError),
    #[error(transparent)]
    Query(QboError),
    #[error("failed to store synced customers")]
    Store(#[from] sea_orm::DbErr),
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Refresh(inner) => inner.into(),
            SyncError::Query(inner) => inner.into(),
            SyncError::Store(inner) => inner.into(),
        }
    }
}

/// Result envelope returned by a completed sync run
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SyncSummary {
    /// Always true for a completed run
    pub success: bool,
    /// Number of customers written
    pub count: u64,
    /// Human-readable summary for the dashboard toast
    pub message: String,
}

/// Idempotent customer reconciliation against the remote system
pub struct CustomerSyncEngine {
    customer_repo: Arc<CustomerRepository>,
    token_refresh: Arc<TokenRefreshService>,
    qbo: Arc<QboClient>,
}

impl CustomerSyncEngine {
    /// Create a new customer sync engine
    pub fn new(
        customer_repo: Arc<CustomerRepository>,
        token_refresh: Arc<TokenRefreshService>,
        qbo: Arc<QboClient>,
    ) -> Self {
        Self {
            customer_repo,
            token_refresh,
            qbo,
        }
    }

    /// Run one sync for the user
    #[instrument(skip(self))]
    pub async fn sync_customers(&self, user_id: Uuid) -> Result<SyncSummary, SyncError> {
        match self.run(user_id).await {
            Ok(summary) => Ok(summary),
            Err(err) => {
                counter!("qbo_sync_failure_total").increment(1);
                Err(err)
            }
        }
    }

    async fn run(&self, user_id: Uuid) -> Result<SyncSummary, SyncError> {
        // The refresh write lands before the batch transaction opens.
        // QuickBooks rotates the refresh token during the exchange, so the
        // new pair must survive even when the sync itself fails.
        let access = self.token_refresh.ensure_fresh(user_id).await?;

        let remote = self
            .qbo
            .query_customers(&access.realm_id, &access.access_token)
            .await
            .map_err(SyncError::Query)?;

        let upserts: Vec<CustomerUpsert> = remote.into_iter().map(to_upsert).collect();

        let written = self
            .customer_repo
            .upsert_batch(user_id, &upserts, Utc::now())
            .await?;

        counter!("qbo_sync_success_total").increment(1);
        counter!("qbo_sync_customers_upserted_total").increment(written);

        info!(
            user_id = %user_id,
            realm_id = %access.realm_id,
            written,
            "Customer sync completed"
        );

        Ok(SyncSummary {
            success: true,
            count: written,
            message: format!("Successfully synced {} customers", written),
        })
    }
}

/// Map one remote customer onto the local schema.
///
/// Absent remote fields become NULL; the exceptions are `display_name`
/// (empty string), `active` (true unless explicitly false), and `balance`
/// (zero).
fn to_upsert(customer: QboCustomer) -> CustomerUpsert {
    let bill_addr = customer.bill_addr;

    CustomerUpsert {
        qbo_id: customer.id,
        display_name: customer.display_name.unwrap_or_default(),
        company_name: customer.company_name,
        given_name: customer.given_name,
        family_name: customer.family_name,
        email: customer.primary_email_addr.and_then(|e| e.address),
        phone: customer.primary_phone.and_then(|p| p.free_form_number),
        billing_address_line1: bill_addr.as_ref().and_then(|a| a.line1.clone()),
        billing_address_city: bill_addr.as_ref().and_then(|a| a.city.clone()),
        billing_address_state: bill_addr
            .as_ref()
            .and_then(|a| a.country_sub_division_code.clone()),
        billing_address_postal_code: bill_addr.as_ref().and_then(|a| a.postal_code.clone()),
        billing_address_country: bill_addr.and_then(|a| a.country),
        active: customer.active.unwrap_or(true),
        balance: customer.balance.unwrap_or(0.0),
    }
}
