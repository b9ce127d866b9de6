//! # Structured Logging Module
//!
//! Environment-aware `tracing` setup plus domain helpers that emit one
//! structured record per settlement, batch step or configuration load.

use crate::config::ControllerConfig;
use crate::constants::env;
use crate::state_machine::OperationState;
use chrono::Utc;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call repeatedly; an already-installed global subscriber is kept.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let json = use_json_format();

        let result = if json {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(true).with_thread_ids(true).json())
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(true).with_thread_ids(true))
                .try_init()
        };

        if result.is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json,
            "Structured logging initialized"
        );
    });
}

/// Current environment from `RESILIENT_OPS_ENV`, then `APP_ENV`
fn get_environment() -> String {
    std::env::var(env::ENVIRONMENT)
        .or_else(|_| std::env::var(env::FALLBACK_ENVIRONMENT))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

fn use_json_format() -> bool {
    std::env::var(env::LOG_FORMAT)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log the outcome of one execution that was allowed to settle
pub fn log_operation_settled(
    token_id: &str,
    state: OperationState,
    attempt: u32,
    total_time: Duration,
    error: Option<&str>,
) {
    tracing::info!(
        token_id = %token_id,
        state = %state,
        attempt,
        elapsed_ms = total_time.as_millis() as u64,
        error = error,
        timestamp = %Utc::now().to_rfc3339(),
        "OPERATION_SETTLED"
    );
}

/// Log progress after one concurrency window of a batch run
pub fn log_batch_progress(token_id: &str, batch: usize, completed: usize, total: usize) {
    tracing::info!(
        token_id = %token_id,
        batch,
        completed,
        total,
        timestamp = %Utc::now().to_rfc3339(),
        "BATCH_PROGRESS"
    );
}

/// Log the effective configuration after all layers were merged
pub fn log_config_loaded(config: &ControllerConfig, file: Option<&Path>) {
    let rendered = serde_json::to_string(config)
        .unwrap_or_else(|_| "[serialization error]".to_string());

    tracing::info!(
        file = file.map(|path| path.display().to_string()),
        config = %rendered,
        timestamp = %Utc::now().to_rfc3339(),
        "CONFIG_LOADED"
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
        assert_eq!(get_log_level("staging"), "debug");
    }

    #[test]
    fn test_repeated_initialization_is_harmless() {
        init_structured_logging();
        init_structured_logging();
        log_operation_settled("t-1", OperationState::Success, 1, Duration::from_millis(5), None);
        log_batch_progress("t-1", 0, 3, 10);
        log_config_loaded(&ControllerConfig::default(), None);
    }
}
