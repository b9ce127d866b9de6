//! # Resilience Module
//!
//! Building blocks every executor is composed from, leaves first:
//!
//! - **Token**: revocable cancellation signal with an optional deadline
//! - **Delay**: sleep that resolves early when its token is cancelled
//! - **Error classification**: decides which failures are worth retrying
//! - **Retry engine**: sequential attempts with exponential backoff
//!
//! ## Usage
//!
//! ```rust,no_run
//! use resilient_ops::resilience::{run_with_retries, CancellationToken, RetryPolicy};
//! use resilient_ops::OperationError;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let token = CancellationToken::with_timeout(Duration::from_secs(30));
//! let policy = RetryPolicy::new(3, Duration::from_millis(500));
//!
//! let outcome = run_with_retries(
//!     |_token, attempt| async move {
//!         if attempt < 2 {
//!             Err(OperationError::new("service unavailable"))
//!         } else {
//!             Ok("transcript")
//!         }
//!     },
//!     &token,
//!     &policy,
//! )
//! .await;
//!
//! assert_eq!(outcome.attempts, 2);
//! # }
//! ```

pub mod delay;
pub mod error_classifier;
pub mod retry;
pub mod token;

pub use delay::delay;
pub use error_classifier::{classify, is_retryable, ErrorCategory};
pub use retry::{run_with_retries, RetryClassifier, RetryOutcome, RetryPolicy};
pub use token::{CancelCallback, CancelReason, CancellationToken, ObserverGuard};
