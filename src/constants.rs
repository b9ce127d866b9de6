//! # System Constants
//!
//! Defaults and fixed vocabularies shared by the executors, the retry engine
//! and configuration loading.

use crate::state_machine::OperationState;

/// Default option values applied when configuration leaves a field unset
pub mod defaults {
    use std::time::Duration;

    /// Deadline for one execution attempt sequence
    pub const TIMEOUT: Duration = Duration::from_secs(30);

    /// Retries after the first attempt
    pub const RETRIES: u32 = 3;

    /// Base backoff, doubled on every further retry
    pub const RETRY_DELAY: Duration = Duration::from_secs(1);

    /// Items per batch chunk
    pub const BATCH_SIZE: usize = 10;

    /// Items in flight per window
    pub const CONCURRENCY: usize = 3;

    /// How long a cache entry stays servable
    pub const CACHE_TIME: Duration = Duration::from_secs(5 * 60);

    /// Age after which a servable entry is flagged stale
    pub const STALE_TIME: Duration = Duration::from_secs(60);

    pub const SUCCESS_MESSAGE: &str = "Operation completed successfully";
}

/// Environment variable names recognised by configuration and logging
pub mod env {
    pub const PREFIX: &str = "RESILIENT_OPS";
    pub const ENVIRONMENT: &str = "RESILIENT_OPS_ENV";
    pub const FALLBACK_ENVIRONMENT: &str = "APP_ENV";
    pub const LOG_FORMAT: &str = "RESILIENT_OPS_LOG_FORMAT";
    pub const DEFAULT_CONFIG_PATH: &str = "config/resilient-ops.toml";
}

/// Lower-cased message fragments that identify transient infrastructure faults
pub mod transient_patterns {
    pub const NETWORK: &[&str] = &["network error", "network request failed", "networkerror"];
    pub const TIMEOUT: &[&str] = &["timeout", "timed out"];
    pub const SERVICE_UNAVAILABLE: &[&str] = &["service unavailable", "503"];
    pub const SERVER: &[&str] = &["internal server error", "server error", "500", "502", "504"];
    pub const CONNECTION_REFUSED: &[&str] = &["connection refused", "econnrefused"];
    pub const FETCH_FAILED: &[&str] = &["fetch failed", "failed to fetch"];
}

/// State groupings used by executors and tests
pub mod status_groups {
    use super::OperationState;

    /// States that end an execution sequence
    pub const TERMINAL_STATES: &[OperationState] = &[
        OperationState::Success,
        OperationState::Error,
        OperationState::Cancelled,
    ];

    /// States in which no sequence is in flight
    pub const SETTLED_STATES: &[OperationState] = &[
        OperationState::Idle,
        OperationState::Success,
        OperationState::Error,
        OperationState::Cancelled,
    ];
}
