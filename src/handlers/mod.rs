//! # API Handlers
//!
//! This module contains all the HTTP endpoint handlers for the QBO Sync API.

use crate::db;
use crate::error::ApiError;
use crate::models::ServiceInfo;
use crate::server::AppState;
use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod connection;
pub mod customers;
pub mod oauth;

/// Generic acknowledgement body for operations with no data to return
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SuccessResponse {
    /// Always true; failures use the error envelope instead
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Health probe response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// "ok" when the service and its database are reachable
    pub status: String,
}

/// Liveness and database reachability probe
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Database is unreachable", body = ApiError)
    ),
    tag = "root"
)]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    db::health_check(&state.db).await.map_err(|err| {
        tracing::warn!(error = %err, "Health check failed");
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "Database is unreachable",
        )
    })?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
    }))
}

#[cfg(test)]
mod tests;
