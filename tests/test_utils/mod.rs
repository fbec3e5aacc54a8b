//! Shared helpers for the integration tests.
//!
//! Provides an in-memory SQLite database with migrations applied and a
//! real server bound to an ephemeral port, so tests exercise the full
//! HTTP stack including middleware.

use anyhow::{Context, Result as AnyhowResult};
use migration::{Migrator, MigratorTrait};
use qbo_sync::config::AppConfig;
use qbo_sync::server::{build_state, create_app};
use sea_orm::{Database, DatabaseConnection};
use std::sync::Arc;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use uuid::Uuid;

/// Bearer token accepted by test servers.
#[allow(dead_code)]
pub const TEST_API_TOKEN: &str = "test-token";

/// Sets up an in-memory SQLite database with all migrations applied.
#[allow(dead_code)]
pub async fn setup_test_db() -> AnyhowResult<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Configuration for a test server, optionally pointing the QuickBooks
/// endpoints at a mock server.
#[allow(dead_code)]
pub fn test_config(mock_base: Option<&str>) -> AppConfig {
    let mut config = AppConfig {
        profile: "test".to_string(),
        api_tokens: vec![TEST_API_TOKEN.to_string()],
        crypto_key: Some(vec![0u8; 32]),
        client_id: Some("test-client-id".to_string()),
        client_secret: Some("test-client-secret".to_string()),
        redirect_uri: Some("https://app.example.test/qbo/oauth/callback".to_string()),
        ..Default::default()
    };

    if let Some(base) = mock_base {
        config.token_url = format!("{}/oauth2/v1/tokens/bearer", base);
        config.api_base_url = Some(base.to_string());
    }

    config
}

/// The crypto key matching [`test_config`], for constructing repositories
/// directly in assertions.
#[allow(dead_code)]
pub fn test_crypto_key() -> qbo_sync::crypto::CryptoKey {
    qbo_sync::crypto::CryptoKey::new(vec![0u8; 32]).expect("valid test key")
}

#[allow(dead_code)]
pub struct TestServerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<AnyhowResult<()>>>,
}

#[allow(dead_code)]
impl TestServerHandle {
    fn new(shutdown_tx: oneshot::Sender<()>, join_handle: JoinHandle<AnyhowResult<()>>) -> Self {
        Self {
            shutdown_tx: Some(shutdown_tx),
            join_handle: Some(join_handle),
        }
    }

    pub async fn shutdown(mut self) -> AnyhowResult<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.join_handle.take() {
            let result = handle.await.context("server task join failed")?;
            result?;
        }

        Ok(())
    }
}

impl Drop for TestServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Spawn the application on an ephemeral port against a fresh database.
#[allow(dead_code)]
pub async fn spawn_test_app(
    config: AppConfig,
) -> (String, DatabaseConnection, TestServerHandle) {
    let db = setup_test_db().await.expect("test database setup failed");

    let state =
        build_state(Arc::new(config), db.clone()).expect("failed to build application state");
    let app = create_app(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_url = format!("http://{}", addr);

    let (ready_tx, ready_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let server_task = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let _ = ready_tx.send(());

        server.await.context("axum server error")
    });

    ready_rx.await.expect("server task to signal readiness");

    (server_url, db, TestServerHandle::new(shutdown_tx, server_task))
}

/// Attach the service token and user header to a request builder.
#[allow(dead_code)]
pub fn with_auth(builder: reqwest::RequestBuilder, user_id: Uuid) -> reqwest::RequestBuilder {
    builder
        .header("Authorization", format!("Bearer {}", TEST_API_TOKEN))
        .header("X-User-Id", user_id.to_string())
}
