//! # Error Handling
//!
//! Unified error handling for the QBO Sync API. Every failure surfaces as a
//! JSON body of the shape `{"error": ..., "code": ...}` with an optional
//! details object and a trace ID for log correlation.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

use crate::telemetry;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Human-readable error message
    #[serde(rename = "error")]
    pub message: Box<str>,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<C: Into<String>, M: Into<String>>(status: StatusCode, code: C, message: M) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Extract current trace ID from the active tracing span (falls back to generated correlation ID)
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                // Fallback: generate a correlation ID for basic client-server log correlation
                Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

pub(crate) fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    if let Some(code) = db_error.code() {
        let code_str = code.as_ref();
        if code_str == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code_str) {
            return true;
        }
    }

    false
}

/// Standard error types with predefined status codes
#[derive(Debug, Error)]
pub enum ErrorType {
    #[error("Bad Request")]
    BadRequest,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Not Found")]
    NotFound,
    #[error("Conflict")]
    Conflict,
    #[error("Internal Server Error")]
    InternalServerError,
    #[error("Bad Gateway")]
    BadGateway,
    #[error("Gateway Timeout")]
    GatewayTimeout,
    #[error("Service Unavailable")]
    ServiceUnavailable,
}

impl ErrorType {
    /// Get the appropriate HTTP status code for this error type
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorType::BadRequest => StatusCode::BAD_REQUEST,
            ErrorType::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorType::NotFound => StatusCode::NOT_FOUND,
            ErrorType::Conflict => StatusCode::CONFLICT,
            ErrorType::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorType::BadGateway => StatusCode::BAD_GATEWAY,
            ErrorType::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorType::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get the error code string for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            ErrorType::BadRequest => "VALIDATION_FAILED",
            ErrorType::Unauthorized => "UNAUTHORIZED",
            ErrorType::NotFound => "NOT_FOUND",
            ErrorType::Conflict => "CONFLICT",
            ErrorType::InternalServerError => "INTERNAL_ERROR",
            ErrorType::BadGateway => "UPSTREAM_ERROR",
            ErrorType::GatewayTimeout => "UPSTREAM_TIMEOUT",
            ErrorType::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }
}

/// Upstream provider error information
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderErrorDetails {
    /// HTTP status code from upstream
    pub status: u16,
    /// Response body snippet from upstream (truncated for security)
    pub body_snippet: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, axum::Json(self)).into_response()
    }
}

// Error mappers for common sources

impl From<ErrorType> for ApiError {
    fn from(error_type: ErrorType) -> Self {
        Self::new(
            error_type.status_code(),
            error_type.error_code(),
            error_type.to_string(),
        )
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        // Log the full error for debugging
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message)
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        match error {
            sea_orm::DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Record not found: {}", record),
            ),
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            _ => {
                tracing::error!("Database error: {:?}", error);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database error occurred",
                )
            }
        }
    }
}

impl From<crate::crypto::CryptoError> for ApiError {
    fn from(error: crate::crypto::CryptoError) -> Self {
        tracing::error!("Token crypto error: {:?}", error);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "Stored credentials could not be processed",
        )
    }
}

/// Create an upstream provider error (502)
pub fn upstream_error(status: u16, body: Option<String>) -> ApiError {
    let details = ProviderErrorDetails {
        status,
        body_snippet: body.map(|b| {
            if b.chars().count() > 200 {
                let truncated: String = b.chars().take(200).collect();
                format!("{}...", truncated)
            } else {
                b
            }
        }),
    };

    ApiError::new(
        StatusCode::BAD_GATEWAY,
        "UPSTREAM_ERROR",
        format!("QuickBooks returned error status {}", status),
    )
    .with_details(json!(details))
}

/// Create an upstream timeout error (504)
pub fn upstream_timeout(operation: &str) -> ApiError {
    ApiError::new(
        StatusCode::GATEWAY_TIMEOUT,
        "UPSTREAM_TIMEOUT",
        format!("QuickBooks did not respond in time during {}", operation),
    )
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
}

/// Create an unauthorized error (401) with explicit trace_id
pub fn unauthorized_with_trace_id(message: Option<&str>, trace_id: String) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    let mut error = ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg);
    error.trace_id = Some(trace_id.into_boxed_str());
    error
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}

/// No QuickBooks connection exists for the requesting user (409)
pub fn not_connected() -> ApiError {
    ApiError::new(
        StatusCode::CONFLICT,
        "NOT_CONNECTED",
        "QuickBooks is not connected. Connect first.",
    )
}

/// The stored connection can no longer be refreshed; the user must reconnect (409)
pub fn connection_invalid() -> ApiError {
    ApiError::new(
        StatusCode::CONFLICT,
        "CONNECTION_INVALID",
        "QuickBooks connection is no longer valid. Please reconnect.",
    )
}

/// The pending authorization was already claimed, expired, or never existed (409)
pub fn already_consumed() -> ApiError {
    ApiError::new(
        StatusCode::CONFLICT,
        "ALREADY_CONSUMED",
        "Pending authorization is no longer claimable",
    )
}

/// The service is missing QuickBooks OAuth credentials (500)
pub fn configuration_error(message: &str) -> ApiError {
    ApiError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "CONFIGURATION_ERROR",
        message,
    )
}
