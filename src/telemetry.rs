//! # Telemetry
//!
//! Global tracing setup plus the request-scoped trace context used to stamp
//! error responses with a correlation id. Initialization is idempotent so
//! test binaries can call it as often as they like.

use std::any::type_name_of_val;
use std::sync::atomic::{AtomicBool, Ordering};

use log::LevelFilter;
use thiserror::Error;
use tokio::task_local;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::Layer,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};
use uuid::Uuid;

use crate::config::AppConfig;

/// Request-scoped correlation metadata
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: String,
}

impl TraceContext {
    /// Mint a fresh context with a request-unique trace id
    pub fn generate() -> Self {
        Self {
            trace_id: format!("req-{}", Uuid::new_v4().simple()),
        }
    }
}

task_local! {
    static ACTIVE_TRACE_CONTEXT: TraceContext;
}

/// Errors that can occur while initializing global telemetry
#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("failed to install log tracer bridge: {0}")]
    LogTracer(#[from] log::SetLoggerError),
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

static TELEMETRY_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize global tracing/logging exactly once, wiring `log::` macros
/// into the tracing pipeline. Later calls return without touching the
/// already-installed subscriber.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryInitError> {
    if TELEMETRY_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Ok(());
    }

    // The log bridge goes in first so crates still using `log::` macros
    // land in the same pipeline.
    if let Err(err) = LogTracer::builder()
        .with_max_level(LevelFilter::Trace)
        .init()
    {
        // A LogTracer registered by an earlier test binary is fine; any
        // other logger means the bridge genuinely failed.
        let logger_type = type_name_of_val(log::logger());
        if !logger_type.contains("LogTracer") {
            eprintln!(
                "Warning: failed to install log tracer bridge: {}. `log::` macros will bypass tracing.",
                err
            );
        }
    }

    // RUST_LOG wins over the configured level when set.
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = match config.log_format.as_str() {
        "pretty" => fmt::layer().pretty().boxed(),
        _ => fmt::layer().json().boxed(),
    };

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        TELEMETRY_INITIALIZED.store(false, Ordering::SeqCst);
        eprintln!(
            "Warning: failed to set global tracing subscriber: {}. The default subscriber stays in effect.",
            err
        );
    }

    Ok(())
}

/// Run `future` with the given trace context held in task-local storage
pub async fn with_trace_context<Fut, R>(context: TraceContext, future: Fut) -> R
where
    Fut: std::future::Future<Output = R>,
{
    ACTIVE_TRACE_CONTEXT.scope(context, future).await
}

/// The trace id of the request the running task is serving, if any
pub fn current_trace_id() -> Option<String> {
    ACTIVE_TRACE_CONTEXT
        .try_with(|ctx| ctx.trace_id.clone())
        .ok()
}
