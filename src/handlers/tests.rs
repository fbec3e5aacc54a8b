//! # Tests for Handlers
//!
//! Unit tests for handlers that do not need a network peer. Full flows are
//! covered by the integration tests.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::handlers::oauth::{CallbackParams, oauth_callback};
use crate::handlers::{SuccessResponse, healthz, root};
use crate::server::{AppState, build_state};
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{Html, Json},
};
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use serde_json::{Value, json};

async fn test_state() -> AppState {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");
    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    build_state(Arc::new(AppConfig::default()), db).expect("Failed to build test state")
}

#[tokio::test]
async fn root_reports_service_identity() {
    let Json(service_info) = root().await;

    assert_eq!(service_info.service, "qbo-sync");
    assert_eq!(service_info.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn root_serializes_to_expected_json_shape() {
    let Json(service_info) = root().await;

    let value: Value =
        serde_json::to_value(&service_info).expect("Failed to serialize ServiceInfo");

    assert!(value.get("service").is_some());
    assert!(value.get("version").is_some());
    assert_eq!(value["service"], "qbo-sync");
}

#[test]
fn success_response_serializes_to_success_true() {
    let value = serde_json::to_value(SuccessResponse::ok()).expect("Failed to serialize");

    assert_eq!(value, json!({ "success": true }));
}

#[tokio::test]
async fn healthz_reports_ok_with_reachable_database() {
    let state = test_state().await;

    let result = healthz(State(state)).await;

    let Json(health) = result.expect("Health check should pass");
    assert_eq!(health.status, "ok");
}

#[tokio::test]
async fn callback_with_provider_error_renders_failure_page() {
    let state = test_state().await;
    let params = CallbackParams {
        code: None,
        realm_id: None,
        state: None,
        error: Some("access_denied".to_string()),
    };

    let Html(page) = oauth_callback(State(state), HeaderMap::new(), Query(params)).await;

    assert!(page.contains("Connection failed"));
    assert!(page.contains("access_denied"));
}

#[tokio::test]
async fn callback_without_state_parameter_renders_failure_page() {
    let state = test_state().await;
    let params = CallbackParams {
        code: Some("auth-code".to_string()),
        realm_id: Some("9130".to_string()),
        state: None,
        error: None,
    };

    let Html(page) = oauth_callback(State(state), HeaderMap::new(), Query(params)).await;

    assert!(page.contains("Connection failed"));
    assert!(page.contains("Missing state parameter"));
}

#[tokio::test]
async fn callback_with_unknown_state_renders_failure_page() {
    let state = test_state().await;
    let params = CallbackParams {
        code: Some("auth-code".to_string()),
        realm_id: Some("9130".to_string()),
        state: Some("never-issued".to_string()),
        error: None,
    };

    let Html(page) = oauth_callback(State(state), HeaderMap::new(), Query(params)).await;

    assert!(page.contains("Connection failed"));
    assert!(page.contains("invalid or has expired"));
}

#[tokio::test]
async fn callback_with_state_but_no_code_burns_the_state() {
    let state = test_state().await;

    let user_id = uuid::Uuid::new_v4();
    let repo = crate::repositories::OAuthStateRepository::new(Arc::new(state.db.clone()));
    let record = repo
        .create(user_id, "state-token", 900)
        .await
        .expect("Failed to create state");

    let params = CallbackParams {
        code: None,
        realm_id: Some("9130".to_string()),
        state: Some(record.state.clone()),
        error: None,
    };

    let Html(page) = oauth_callback(State(state.clone()), HeaderMap::new(), Query(params)).await;
    assert!(page.contains("Missing authorization code"));

    // The state was consumed by the failed attempt and cannot be replayed.
    let replay = repo
        .consume(&record.state)
        .await
        .expect("Consume should not error");
    assert!(replay.is_none());
}
