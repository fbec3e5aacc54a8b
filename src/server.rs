//! # Server Configuration
//!
//! This module contains the server setup and configuration for the QBO Sync API.

use anyhow::Context;
use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::crypto::CryptoKey;
use crate::handlers;
use crate::maintenance::MaintenanceSweeper;
use crate::qbo::QboClient;
use crate::repositories::{ConnectionRepository, CustomerRepository};
use crate::sync::CustomerSyncEngine;
use crate::telemetry::{self, TraceContext};
use crate::token_refresh::TokenRefreshService;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub crypto_key: CryptoKey,
    pub qbo: Arc<QboClient>,
    pub sync_engine: Arc<CustomerSyncEngine>,
}

/// Assemble the shared state from configuration and a database handle
pub fn build_state(config: Arc<AppConfig>, db: DatabaseConnection) -> anyhow::Result<AppState> {
    let crypto_key = match &config.crypto_key {
        Some(bytes) => CryptoKey::new(bytes.clone()).context("initializing crypto key")?,
        // AppConfig::validate rejects a missing key before the server
        // starts; the zero key only ever backs tests and local tooling.
        None => {
            CryptoKey::new(vec![0u8; 32]).context("initializing fallback crypto key")?
        }
    };

    let qbo =
        Arc::new(QboClient::from_config(&config).context("building QuickBooks HTTP client")?);

    let connection_repo = Arc::new(ConnectionRepository::new(
        Arc::new(db.clone()),
        crypto_key.clone(),
    ));
    let token_refresh = Arc::new(TokenRefreshService::new(connection_repo, Arc::clone(&qbo)));

    let customer_repo = Arc::new(CustomerRepository::new(Arc::new(db.clone())));
    let sync_engine = Arc::new(CustomerSyncEngine::new(
        customer_repo,
        token_refresh,
        Arc::clone(&qbo),
    ));

    Ok(AppState {
        config,
        db,
        crypto_key,
        qbo,
        sync_engine,
    })
}

/// Attach a fresh trace id to the request and scope the task-local context
/// so logs and error envelopes produced while serving it can carry it.
async fn trace_context_middleware(mut request: Request, next: Next) -> Response {
    let context = TraceContext::generate();
    request.extensions_mut().insert(context.clone());
    telemetry::with_trace_context(context, next.run(request)).await
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let authenticated = Router::new()
        .route("/qbo/oauth/init", post(handlers::oauth::start_oauth))
        .route(
            "/qbo/oauth/complete",
            post(handlers::oauth::complete_connection),
        )
        .route(
            "/qbo/connection",
            get(handlers::connection::connection_status).delete(handlers::connection::disconnect),
        )
        .route(
            "/qbo/customers/sync",
            post(handlers::customers::sync_customers),
        )
        .route("/qbo/customers", get(handlers::customers::list_customers))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            crate::auth::auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/qbo/oauth/callback", get(handlers::oauth::oauth_callback))
        .merge(authenticated)
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration
pub async fn run_server(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<()> {
    let profile = config.profile.clone();
    let addr = config
        .bind_addr()
        .context("resolving the configured bind address")?;

    let state = build_state(Arc::new(config), db)?;

    let shutdown = CancellationToken::new();
    let sweeper = MaintenanceSweeper::new(
        Arc::new(state.db.clone()),
        state.crypto_key.clone(),
    );
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown.clone()));

    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    tracing::info!(%addr, %profile, "Server listening");

    let serve_shutdown = shutdown.clone();
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            serve_shutdown.cancel();
        })
        .await
        .context("serving HTTP");

    // Stop the sweeper even when serve exited on an error rather than a
    // signal.
    shutdown.cancel();
    if let Err(err) = sweeper_handle.await {
        tracing::error!(error = %err, "Maintenance sweeper task failed");
    }

    serve_result?;

    tracing::info!("Server stopped");

    Ok(())
}

/// Resolve when the process receives Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::oauth::start_oauth,
        crate::handlers::oauth::oauth_callback,
        crate::handlers::oauth::complete_connection,
        crate::handlers::connection::connection_status,
        crate::handlers::connection::disconnect,
        crate::handlers::customers::sync_customers,
        crate::handlers::customers::list_customers,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::handlers::SuccessResponse,
            crate::handlers::oauth::AuthorizeUrlResponse,
            crate::handlers::oauth::CompleteRequest,
            crate::handlers::customers::CustomersResponse,
            crate::models::connection::ConnectionStatus,
            crate::models::customer::CustomerRecord,
            crate::sync::SyncSummary,
            crate::error::ApiError,
        )
    ),
    modifiers(&SecurityAddon),
    info(
        title = "QBO Sync API",
        description = "QuickBooks Online connection and customer sync API",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
