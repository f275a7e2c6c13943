//! Observability infrastructure for Strata.
//!
//! Structured logging with consistent spans. This module provides
//! initialization helpers and span constructors so that every pipeline run
//! and store operation carries the same correlation fields (UTID, manifest
//! id) without each call site inventing its own.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

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
/// Call once at application startup. Safe to call multiple times; subsequent
/// calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `strata_ledger=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for a pipeline execution with standard correlation fields.
#[must_use]
pub fn pipeline_span(operation: &str, utid: &str, manifest_id: &str) -> Span {
    tracing::info_span!(
        "pipeline",
        op = operation,
        utid = utid,
        manifest_id = manifest_id,
    )
}

/// Creates a span for a manifest-store operation.
#[must_use]
pub fn store_span(operation: &str, manifest_id: &str) -> Span {
    tracing::info_span!("manifest_store", op = operation, manifest_id = manifest_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Pretty);
    }

    #[test]
    fn span_helpers_create_spans() {
        let span = pipeline_span("run", "utid-01ARZ3NDEKTSV4RRFFQ69G5FAV", "bls_employment_stats");
        let _guard = span.enter();
        tracing::info!("message in pipeline span");

        let span = store_span("deploy", "bls_employment_stats");
        let _guard2 = span.enter();
        tracing::info!("message in store span");
    }
}
