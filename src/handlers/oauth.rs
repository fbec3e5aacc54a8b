//! # OAuth Handlers
//!
//! The QuickBooks authorization flow: initiation, the provider callback,
//! and the authenticated completion claim for callbacks that arrived
//! without credentials.
//!
//! The callback endpoint answers every outcome with a small self-contained
//! HTML page, because its caller is a popup window the provider redirected;
//! JSON would just get painted onto the screen.

use crate::auth::{ServiceAuth, UserContext, UserHeader, authenticate_optional};
use crate::error::ApiError;
use crate::handlers::SuccessResponse;
use crate::qbo::TokenGrant;
use crate::repositories::{
    ConnectionRepository, OAuthStateRepository, PendingAuthorizationRepository,
};
use crate::server::AppState;
use axum::{
    extract::{Query, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{Html, Json},
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// OAuth authorization URL response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthorizeUrlResponse {
    /// Complete authorization URL for user redirection
    pub url: String,
}

/// Query parameters QuickBooks appends to the callback redirect
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackParams {
    /// Authorization code to exchange for tokens
    pub code: Option<String>,
    /// Company (realm) the user authorized
    #[serde(rename = "realmId")]
    #[param(rename = "realmId")]
    pub realm_id: Option<String>,
    /// Anti-forgery state issued at initiation
    pub state: Option<String>,
    /// Provider error code when the user denied access
    pub error: Option<String>,
}

/// Request body for completing a deferred authorization
#[derive(Debug, Deserialize, ToSchema)]
pub struct CompleteRequest {
    /// Pending authorization id delivered to the opener window
    #[schema(value_type = String)]
    pub pending_id: Uuid,
}

/// Start the QuickBooks OAuth flow
///
/// Persists a single-use anti-forgery state bound to the calling user and
/// returns the authorization URL to redirect (or pop up) the browser to.
#[utoipa::path(
    post,
    path = "/qbo/oauth/init",
    security(("bearer_auth" = [])),
    params(UserHeader),
    responses(
        (status = 200, description = "Authorization URL generated", body = AuthorizeUrlResponse),
        (status = 401, description = "Missing or invalid authorization token", body = ApiError),
        (status = 500, description = "OAuth client credentials not configured", body = ApiError)
    ),
    tag = "oauth"
)]
pub async fn start_oauth(
    State(state): State<AppState>,
    _service_auth: ServiceAuth,
    UserContext(user): UserContext,
) -> Result<Json<AuthorizeUrlResponse>, ApiError> {
    let state_token = generate_secure_state();

    // Building the URL first surfaces missing client configuration before
    // anything is written.
    let authorize_url = state.qbo.authorize_url(&state_token)?;
    validate_authorize_url(&authorize_url)?;

    let oauth_state_repo = OAuthStateRepository::new(Arc::new(state.db.clone()));
    let oauth_state = oauth_state_repo
        .create(user.0, &state_token, state.config.state_ttl_seconds)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "Failed to persist OAuth state");
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Failed to create OAuth state",
            )
        })?;

    tracing::info!(
        user_id = %user.0,
        state_id = %oauth_state.id,
        "OAuth flow initiated"
    );

    Ok(Json(AuthorizeUrlResponse {
        url: authorize_url.to_string(),
    }))
}

/// Handle the provider redirect that closes the OAuth flow
///
/// Public by necessity: QuickBooks redirects the user's browser here. The
/// state parameter is verified against (and removed from) the stored
/// single-use states before any exchange happens. With valid service
/// credentials on the request the connection is stored directly; without
/// them the exchanged tokens are parked server-side and the page hands the
/// opener window an opaque claim id.
#[utoipa::path(
    get,
    path = "/qbo/oauth/callback",
    params(CallbackParams),
    responses(
        (status = 200, description = "Self-contained HTML status page", content_type = "text/html", body = String)
    ),
    tag = "oauth"
)]
pub async fn oauth_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Html<String> {
    if let Some(provider_error) = params.error.as_deref() {
        tracing::warn!(error = %provider_error, "QuickBooks reported a callback error");
        return callback_failure(&format!(
            "QuickBooks reported an error: {}",
            provider_error
        ));
    }

    let Some(state_token) = params.state.as_deref() else {
        return callback_failure("Missing state parameter.");
    };

    // Consume the state before anything else. Unknown, expired, and reused
    // states all fail closed here, with no exchange attempted.
    let oauth_state_repo = OAuthStateRepository::new(Arc::new(state.db.clone()));
    let oauth_state = match oauth_state_repo.consume(state_token).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            tracing::warn!("Callback presented an unknown, expired, or reused state");
            return callback_failure("The authorization state is invalid or has expired.");
        }
        Err(err) => {
            tracing::error!(error = ?err, "Failed to verify OAuth state");
            return callback_failure("The authorization could not be verified.");
        }
    };

    let (Some(code), Some(realm_id)) = (params.code.as_deref(), params.realm_id.as_deref())
    else {
        return callback_failure("Missing authorization code or realm id.");
    };

    // Credentials are optional on this route, but invalid ones are an
    // error, never an anonymous downgrade.
    let caller = match authenticate_optional(&state.config, &headers) {
        Ok(caller) => caller,
        Err(_) => return callback_failure("Invalid service credentials."),
    };

    let grant = match state.qbo.exchange_code(code).await {
        Ok(grant) => grant,
        Err(err) => {
            tracing::error!(error = %err, "Token exchange failed");
            return callback_failure(&exchange_failure_message(&err));
        }
    };

    match caller {
        Some(user) => {
            // The callback must land on the same user that started the
            // flow; the state is already burned either way.
            if user.0 != oauth_state.user_id {
                tracing::warn!(
                    caller = %user.0,
                    initiator = %oauth_state.user_id,
                    "Callback credentials do not match the initiating user"
                );
                return callback_failure("This authorization was started by a different user.");
            }

            let connection_repo =
                ConnectionRepository::new(Arc::new(state.db.clone()), state.crypto_key.clone());
            if let Err(err) = connection_repo.upsert_tokens(user.0, realm_id, &grant).await {
                tracing::error!(error = ?err, "Failed to store connection");
                return callback_failure("Failed to store the QuickBooks connection.");
            }

            counter!("qbo_oauth_callback_success_total").increment(1);
            tracing::info!(user_id = %user.0, realm_id = %realm_id, "QuickBooks connected");
            callback_success(realm_id)
        }
        None => {
            let pending_repo = PendingAuthorizationRepository::new(
                Arc::new(state.db.clone()),
                state.crypto_key.clone(),
            );
            let pending = match pending_repo
                .create_encrypted(
                    oauth_state.user_id,
                    realm_id,
                    &grant,
                    state.config.pending_ttl_seconds,
                )
                .await
            {
                Ok(pending) => pending,
                Err(err) => {
                    tracing::error!(error = ?err, "Failed to park pending authorization");
                    return callback_failure("Failed to store the QuickBooks authorization.");
                }
            };

            counter!("qbo_oauth_callback_pending_total").increment(1);
            tracing::info!(
                user_id = %oauth_state.user_id,
                pending_id = %pending.id,
                "QuickBooks authorization parked for claim"
            );
            callback_pending(pending.id, realm_id)
        }
    }
}

/// Claim a parked authorization and store it as the caller's connection
///
/// The pending id is single-use: the first claim wins and later claims
/// fail, so a replayed popup message cannot mutate the connection twice.
#[utoipa::path(
    post,
    path = "/qbo/oauth/complete",
    security(("bearer_auth" = [])),
    params(UserHeader),
    request_body = CompleteRequest,
    responses(
        (status = 200, description = "Connection stored", body = SuccessResponse),
        (status = 400, description = "Malformed request body", body = ApiError),
        (status = 401, description = "Missing or invalid authorization token", body = ApiError),
        (status = 409, description = "Pending authorization expired or already claimed", body = ApiError)
    ),
    tag = "oauth"
)]
pub async fn complete_connection(
    State(state): State<AppState>,
    _service_auth: ServiceAuth,
    UserContext(user): UserContext,
    payload: Result<Json<CompleteRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let Json(body) = payload?;

    let pending_repo =
        PendingAuthorizationRepository::new(Arc::new(state.db.clone()), state.crypto_key.clone());
    let pending = pending_repo
        .claim(body.pending_id, user.0)
        .await?
        .ok_or_else(crate::error::already_consumed)?;

    let (access_token, refresh_token) = pending_repo.decrypt_tokens(&pending)?;
    let grant = TokenGrant {
        access_token,
        refresh_token,
        expires_at: pending.token_expires_at.to_utc(),
    };

    let connection_repo =
        ConnectionRepository::new(Arc::new(state.db.clone()), state.crypto_key.clone());
    connection_repo
        .upsert_tokens(user.0, &pending.realm_id, &grant)
        .await?;

    tracing::info!(
        user_id = %user.0,
        realm_id = %pending.realm_id,
        "QuickBooks connection completed from pending authorization"
    );

    Ok(Json(SuccessResponse::ok()))
}

/// Generate a cryptographically secure random state token
fn generate_secure_state() -> String {
    use rand::Rng;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes);

    base64_url::encode(&bytes)
}

/// Validate the authorization URL meets OAuth 2.0 and security requirements
fn validate_authorize_url(url: &Url) -> Result<(), ApiError> {
    if url.scheme() != "https" {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "Authorization URL must use HTTPS",
        ));
    }

    // No fragment component per OAuth 2.0 RFC 6749 section 3.1.
    if url.fragment().is_some() {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "Authorization URL must not include a fragment component",
        ));
    }

    if url.as_str().len() > 2048 {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "Authorization URL exceeds maximum length of 2048 characters",
        ));
    }

    Ok(())
}

fn exchange_failure_message(err: &crate::qbo::QboError) -> String {
    match err {
        crate::qbo::QboError::Timeout { .. } => {
            "QuickBooks did not respond in time. Please try again.".to_string()
        }
        crate::qbo::QboError::Provider { status, .. } => {
            format!("QuickBooks rejected the authorization code (status {}).", status)
        }
        crate::qbo::QboError::NotConfigured(_) => {
            "The QuickBooks integration is not configured.".to_string()
        }
        _ => "The authorization could not be completed.".to_string(),
    }
}

fn callback_success(realm_id: &str) -> Html<String> {
    status_page(
        "QuickBooks connected",
        &format!(
            "Company {} is now connected. You can close this window.",
            html_escape(realm_id)
        ),
        CLOSE_SCRIPT,
    )
}

fn callback_failure(reason: &str) -> Html<String> {
    counter!("qbo_oauth_callback_failure_total").increment(1);
    status_page("Connection failed", &html_escape(reason), CLOSE_SCRIPT)
}

fn callback_pending(pending_id: Uuid, realm_id: &str) -> Html<String> {
    // The opener gets the opaque claim id and the realm, never token
    // material.
    let script = format!(
        "<script>\n(function () {{\n  if (window.opener) {{\n    window.opener.postMessage({{ type: \"qbo-connected\", pendingId: {}, realmId: {} }}, \"*\");\n  }}\n  setTimeout(function () {{ window.close(); }}, 1500);\n}})();\n</script>",
        js_string(&pending_id.to_string()),
        js_string(realm_id),
    );

    status_page(
        "Almost done",
        "Finishing the QuickBooks connection. This window will close itself.",
        &script,
    )
}

const CLOSE_SCRIPT: &str =
    "<script>setTimeout(function () { window.close(); }, 2500);</script>";

fn status_page(title: &str, detail: &str, script: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n<style>\nbody {{ font-family: -apple-system, 'Segoe UI', sans-serif; display: flex; align-items: center; justify-content: center; height: 100vh; margin: 0; background: #f6f7f9; }}\nmain {{ text-align: center; max-width: 28rem; }}\n</style>\n</head>\n<body>\n<main>\n<h1>{title}</h1>\n<p>{detail}</p>\n</main>\n{script}\n</body>\n</html>\n"
    ))
}

/// Escape text for interpolation into HTML element content
fn html_escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Encode a value as a JS string literal safe to embed inside `<script>`.
///
/// `<` is escaped so a value containing `</script>` cannot terminate the
/// surrounding block.
fn js_string(value: &str) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "\"\"".to_string())
        .replace('<', "\\u003c")
}
