//! # Authentication and Authorization
//!
//! Service bearer authentication and user header validation for protected
//! API endpoints. Every authenticated route resolves the acting user once,
//! here, and hands it to handlers as an explicit [`UserContext`].

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ApiError, unauthorized, unauthorized_with_trace_id, validation_error};
use crate::server::AppState;
use crate::telemetry::TraceContext;

/// User ID wrapper for type safety
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserId(pub Uuid);

/// Marker type for requests that passed service authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceAuth;

/// The authenticated user, resolved by the auth middleware
#[derive(Debug, Clone)]
pub struct UserContext(pub UserId);

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.config)
    }
}

/// Authentication middleware that validates bearer tokens and the user header
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers().clone();

    // Extract trace_id from request context for consistent error responses
    let trace_id = request
        .extensions()
        .get::<TraceContext>()
        .map(|ctx| ctx.trace_id.clone());

    let token = extract_bearer_token_with_trace_id(&headers, trace_id.clone())?;
    validate_token(&config, token)?;

    let user = extract_user_id(&headers)?;
    tracing::debug!(user_id = %user.0, "Authenticated service request");

    let mut request = request;
    request.extensions_mut().insert(UserContext(user));
    request.extensions_mut().insert(ServiceAuth);

    Ok(next.run(request).await)
}

/// Resolve credentials on a route that accepts anonymous requests.
///
/// Returns `None` when no Authorization header is present. Credentials that
/// are present but invalid are an error, never a silent downgrade to
/// anonymous.
pub fn authenticate_optional(
    config: &AppConfig,
    headers: &HeaderMap,
) -> Result<Option<UserId>, ApiError> {
    if headers.get(AUTHORIZATION).is_none() {
        return Ok(None);
    }

    let token = extract_bearer_token_with_trace_id(headers, None)?;
    validate_token(config, token)?;
    let user = extract_user_id(headers)?;

    Ok(Some(user))
}

fn extract_bearer_token_with_trace_id(
    headers: &HeaderMap,
    trace_id: Option<String>,
) -> Result<&str, ApiError> {
    let trace_id_clone = trace_id.clone();

    headers
        .get(AUTHORIZATION)
        .ok_or_else(|| {
            if let Some(trace_id_val) = trace_id_clone {
                unauthorized_with_trace_id(Some("Missing Authorization header"), trace_id_val)
            } else {
                unauthorized(Some("Missing Authorization header"))
            }
        })
        .and_then(|value| {
            let trace_id_clone2 = trace_id.clone();
            value.to_str().map_err(|_| {
                if let Some(trace_id_val) = trace_id_clone2 {
                    unauthorized_with_trace_id(Some("Invalid Authorization header"), trace_id_val)
                } else {
                    unauthorized(Some("Invalid Authorization header"))
                }
            })
        })
        .and_then(|header| {
            header.strip_prefix("Bearer ").ok_or_else(|| {
                if let Some(trace_id_val) = trace_id {
                    unauthorized_with_trace_id(
                        Some("Authorization header must use Bearer scheme"),
                        trace_id_val,
                    )
                } else {
                    unauthorized(Some("Authorization header must use Bearer scheme"))
                }
            })
        })
}

fn validate_token(config: &AppConfig, token: &str) -> Result<(), ApiError> {
    let is_valid = config
        .api_tokens
        .iter()
        .any(|configured| ConstantTimeEq::ct_eq(token.as_bytes(), configured.as_bytes()).into());

    if is_valid {
        Ok(())
    } else {
        Err(unauthorized(Some("Invalid bearer token")))
    }
}

fn extract_user_id(headers: &HeaderMap) -> Result<UserId, ApiError> {
    let header_value = headers
        .get("X-User-Id")
        .ok_or_else(|| {
            validation_error(
                "Missing required header",
                serde_json::json!({ "X-User-Id": "Required header is missing" }),
            )
        })?
        .to_str()
        .map_err(|_| {
            validation_error(
                "Invalid user header",
                serde_json::json!({ "X-User-Id": "Header must be valid UTF-8" }),
            )
        })?;

    header_value.parse::<Uuid>().map(UserId).map_err(|_| {
        validation_error(
            "Invalid user ID",
            serde_json::json!({ "X-User-Id": "Must be a valid UUID" }),
        )
    })
}

/// OpenAPI header parameter for X-User-Id
#[derive(Debug, Serialize, Deserialize, IntoParams, utoipa::ToSchema)]
#[into_params(parameter_in = Header)]
pub struct UserHeader {
    /// User identifier (UUID) the request acts on behalf of
    #[serde(rename = "X-User-Id")]
    #[param(rename = "X-User-Id", value_type = String)]
    pub user_id: String,
}

impl<S> FromRequestParts<S> for UserContext
where
    Arc<AppConfig>: FromRef<S>,
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserContext>()
            .cloned()
            .ok_or_else(|| {
                validation_error(
                    "User context missing",
                    serde_json::json!({ "X-User-Id": "User context not present" }),
                )
            })
    }
}

impl<S> FromRequestParts<S> for ServiceAuth
where
    Arc<AppConfig>: FromRef<S>,
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ServiceAuth>()
            .copied()
            .ok_or_else(|| unauthorized(Some("Service authentication required")))
    }
}
