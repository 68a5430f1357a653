//! # Structured Logging Module
//!
//! Environment-aware structured logging for the orchestration loops. Console
//! output is always installed; a JSON layer is added when `DATASPACE_LOG_JSON`
//! is set so log shippers can ingest one object per line.

use crate::constants::{DEFAULT_ENVIRONMENT, ENVIRONMENT_ENV_VAR};
use chrono::Utc;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Environment variable enabling the JSON output layer
pub const JSON_LOG_ENV_VAR: &str = "DATASPACE_LOG_JSON";

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let json_enabled = std::env::var(JSON_LOG_ENV_VAR).is_ok_and(|v| v == "1" || v == "true");

        let filter = || {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
        };

        let console = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_filter(filter());

        let json = json_enabled.then(|| {
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_ansi(false)
                .with_filter(filter())
        });

        // Use try_init to avoid panic if global subscriber already set
        if tracing_subscriber::registry()
            .with(console)
            .with(json)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            json = json_enabled,
            "Structured logging initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var(ENVIRONMENT_ENV_VAR).unwrap_or_else(|_| DEFAULT_ENVIRONMENT.to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log structured data for entity operations
pub fn log_entity_operation(
    operation: &str,
    kind: &str,
    entity_id: &str,
    state: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        kind = %kind,
        entity_id = %entity_id,
        state = state,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "ENTITY_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("unknown"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_structured_logging();
        init_structured_logging();
        log_entity_operation("save", "transfer-process", "tp-1", Some("STARTED"), "ok", None);
    }
}
