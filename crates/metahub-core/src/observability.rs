//! Observability infrastructure for metahub.
//!
//! Structured logging with consistent spans: every engine operation runs
//! inside a span naming the operation, hub, and object type so that
//! ingestion, curation, and search runs are traceable end to end.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: controls log levels (e.g. `info`, `metahub_engine=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for hub-scoped operations with standard fields.
///
/// # Example
///
/// ```rust
/// use metahub_core::observability::hub_span;
///
/// let span = hub_span("metamodel_flat", "ihec", "sample");
/// let _guard = span.enter();
/// // ... do the operation
/// ```
#[must_use]
pub fn hub_span(operation: &str, hub: &str, object_type: &str) -> Span {
    tracing::info_span!(
        "hub",
        op = operation,
        hub = hub,
        object_type = object_type,
    )
}

/// Creates a span for an ingestion run.
#[must_use]
pub fn ingest_span(source: &str, hub: &str) -> Span {
    tracing::info_span!("ingest", source = source, hub = hub)
}

/// Creates a span for a curation run.
#[must_use]
pub fn curation_span(source: &str, hub: &str) -> Span {
    tracing::info_span!("curation", source = source, hub = hub)
}
