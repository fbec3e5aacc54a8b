//! Connection status and disconnect handlers.

use crate::auth::{ServiceAuth, UserContext, UserHeader};
use crate::error::ApiError;
use crate::handlers::SuccessResponse;
use crate::models::connection::ConnectionStatus;
use crate::repositories::ConnectionRepository;
use crate::server::AppState;
use axum::{extract::State, response::Json};
use std::sync::Arc;

/// Report the caller's QuickBooks connection status
///
/// Never returns token material; only the realm, expiry, and connection
/// age are exposed.
#[utoipa::path(
    get,
    path = "/qbo/connection",
    security(("bearer_auth" = [])),
    params(UserHeader),
    responses(
        (status = 200, description = "Connection status", body = ConnectionStatus),
        (status = 401, description = "Missing or invalid authorization token", body = ApiError)
    ),
    tag = "connection"
)]
pub async fn connection_status(
    State(state): State<AppState>,
    _service_auth: ServiceAuth,
    UserContext(user): UserContext,
) -> Result<Json<ConnectionStatus>, ApiError> {
    let connection_repo =
        ConnectionRepository::new(Arc::new(state.db.clone()), state.crypto_key.clone());

    let status = match connection_repo.find_by_user(user.0).await? {
        Some(connection) => ConnectionStatus::from(connection),
        None => ConnectionStatus::disconnected(),
    };

    Ok(Json(status))
}

/// Disconnect QuickBooks for the caller
///
/// Deletes the stored tokens. Idempotent: disconnecting when nothing is
/// connected still succeeds.
#[utoipa::path(
    delete,
    path = "/qbo/connection",
    security(("bearer_auth" = [])),
    params(UserHeader),
    responses(
        (status = 200, description = "Connection removed (or was never present)", body = SuccessResponse),
        (status = 401, description = "Missing or invalid authorization token", body = ApiError)
    ),
    tag = "connection"
)]
pub async fn disconnect(
    State(state): State<AppState>,
    _service_auth: ServiceAuth,
    UserContext(user): UserContext,
) -> Result<Json<SuccessResponse>, ApiError> {
    let connection_repo =
        ConnectionRepository::new(Arc::new(state.db.clone()), state.crypto_key.clone());

    let removed = connection_repo.delete_by_user(user.0).await?;
    if removed {
        tracing::info!(user_id = %user.0, "QuickBooks connection removed");
    }

    Ok(Json(SuccessResponse::ok()))
}
