#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

//! # Resilient Ops
//!
//! Async controller for running fallible operations with timeouts,
//! cooperative cancellation, exponential backoff, bounded batch fan-out and
//! keyed result caching.
//!
//! ## Architecture
//!
//! Leaves first:
//!
//! - [`resilience`] - cancellation token, interruptible delay, error
//!   classification and the retry/backoff engine
//! - [`state_machine`] - observable `Idle | Loading | Success | Error | Cancelled`
//!   state and its snapshots
//! - [`cache`] - explicit keyed store with TTL and staleness windows
//! - [`executor`] - single-operation, batch and cached executors
//! - [`config`] - layered configuration (defaults, TOML, environment)
//! - [`error`] - operation failures and controller errors
//! - [`logging`] - structured `tracing` setup and domain log helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resilient_ops::{ExecutorOptions, OperationError, OperationExecutor};
//! use std::time::Duration;
//!
//! # async fn example() -> resilient_ops::ControllerResult<()> {
//! resilient_ops::logging::init_structured_logging();
//!
//! let executor = OperationExecutor::with_options(
//!     |token, attempt, question_id: u64| async move {
//!         if token.is_cancelled() {
//!             return Err(OperationError::new("abandoned"));
//!         }
//!         Ok(format!("answer {question_id} on attempt {attempt}"))
//!     },
//!     ExecutorOptions::default()
//!         .with_retries(2)
//!         .with_retry_delay(Duration::from_millis(250)),
//! )?;
//!
//! let mut state = executor.subscribe();
//! let answer = executor.execute(42).await;
//! println!("{answer:?} after {} attempt(s)", state.borrow_and_update().attempt);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod executor;
pub mod logging;
pub mod resilience;
pub mod state_machine;

pub use cache::{CacheEntry, CacheLookup, CacheStore, Freshness};
pub use crate::config::{
    BatchConfig, CacheConfig, ConfigLoader, ControllerConfig, ExecutorConfig,
};
pub use error::{
    ControllerError, ControllerResult, ErrorCode, OperationError, OperationResult,
};
pub use executor::{
    BatchExecutor, BatchItemResult, BatchOptions, BatchProgress, BatchSnapshot, CacheOptions,
    CachedExecutor, ExecutorOptions, NoopNotifier, Notifier, OperationExecutor, TracingNotifier,
};
pub use resilience::{
    classify, delay, is_retryable, run_with_retries, CancelReason, CancellationToken,
    ErrorCategory, RetryOutcome, RetryPolicy,
};
pub use state_machine::{OperationSnapshot, OperationState};
