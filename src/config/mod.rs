//! # Controller Configuration
//!
//! Serde-backed configuration for the executors. Every field has a default so
//! an empty source yields a working configuration.
//!
//! ## Sources
//!
//! Layered by [`loader`], lowest precedence first:
//!
//! 1. compiled defaults
//! 2. optional TOML file (`config/resilient-ops.toml` unless told otherwise)
//! 3. `RESILIENT_OPS_*` environment variables, `__` separating sections
//!
//! ```toml
//! [executor]
//! timeout_ms = 30000
//! retries = 3
//! retry_delay_ms = 1000
//!
//! [batch]
//! batch_size = 10
//! concurrency = 3
//!
//! [cache]
//! cache_time_ms = 300000
//! stale_time_ms = 60000
//! ```

pub mod loader;

use crate::constants::defaults;
use crate::error::{ControllerError, ControllerResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use loader::ConfigLoader;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Single-operation executor settings
    pub executor: ExecutorConfig,

    /// Batch executor settings
    pub batch: BatchConfig,

    /// Cache wrapper settings
    pub cache: CacheConfig,
}

/// Timeout, retry and notification settings for one executor
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub timeout_ms: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub show_success_toast: bool,
    pub show_error_toast: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: defaults::TIMEOUT.as_millis() as u64,
            retries: defaults::RETRIES,
            retry_delay_ms: defaults::RETRY_DELAY.as_millis() as u64,
            show_success_toast: false,
            show_error_toast: true,
        }
    }
}

impl ExecutorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Chunking and window settings for batch execution
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub concurrency: usize,
    /// Deadline for the whole batch; none by default
    pub timeout_ms: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            concurrency: defaults::CONCURRENCY,
            timeout_ms: None,
        }
    }
}

impl BatchConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// TTL and staleness windows for cached execution
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub cache_time_ms: u64,
    pub stale_time_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_time_ms: defaults::CACHE_TIME.as_millis() as u64,
            stale_time_ms: defaults::STALE_TIME.as_millis() as u64,
        }
    }
}

impl CacheConfig {
    pub fn cache_time(&self) -> Duration {
        Duration::from_millis(self.cache_time_ms)
    }

    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }
}

impl ControllerConfig {
    /// Load from the default file location and the environment
    pub fn load() -> ControllerResult<Self> {
        ConfigLoader::new().load()
    }

    /// Load from an explicit TOML file and the environment
    pub fn load_from(path: impl Into<std::path::PathBuf>) -> ControllerResult<Self> {
        ConfigLoader::new().with_file(path).load()
    }

    /// Load from the environment only
    pub fn from_env() -> ControllerResult<Self> {
        ConfigLoader::new().without_file().load()
    }

    pub fn validate(&self) -> ControllerResult<()> {
        self.executor.validate()?;
        self.batch.validate()?;
        self.cache.validate()
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> ControllerResult<()> {
        if self.timeout_ms == 0 {
            return Err(invalid("executor.timeout_ms must be greater than 0"));
        }
        Ok(())
    }
}

impl BatchConfig {
    pub fn validate(&self) -> ControllerResult<()> {
        if self.batch_size == 0 {
            return Err(invalid("batch.batch_size must be greater than 0"));
        }
        if self.concurrency == 0 {
            return Err(invalid("batch.concurrency must be greater than 0"));
        }
        if self.timeout_ms == Some(0) {
            return Err(invalid("batch.timeout_ms must be greater than 0 when set"));
        }
        Ok(())
    }
}

impl CacheConfig {
    pub fn validate(&self) -> ControllerResult<()> {
        if self.stale_time_ms >= self.cache_time_ms {
            return Err(invalid(format!(
                "cache.stale_time_ms ({}) must be less than cache.cache_time_ms ({})",
                self.stale_time_ms, self.cache_time_ms
            )));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ControllerError {
    ControllerError::InvalidConfiguration(message.into())
}
