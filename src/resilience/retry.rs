//! # Retry/Backoff Engine
//!
//! Drives repeated attempts of one operation against one token. Attempts are
//! strictly sequential and 1-indexed; after failed attempt `n` the engine
//! waits `base_delay * 2^(n-1)` before attempt `n + 1`, up to `max_retries`
//! retries. The attempt counter is threaded explicitly through the loop and
//! returned in the [`RetryOutcome`].

use crate::error::{OperationError, OperationResult};
use crate::resilience::delay::delay;
use crate::resilience::error_classifier::{self, classify};
use crate::resilience::token::CancellationToken;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Predicate deciding whether a failure may be retried
pub type RetryClassifier = Arc<dyn Fn(&OperationError) -> bool + Send + Sync>;

/// How many times to retry and how long to wait in between
#[derive(Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Wait before the first retry; doubled for every further retry
    pub base_delay: Duration,
    classifier: RetryClassifier,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            crate::constants::defaults::RETRIES,
            crate::constants::defaults::RETRY_DELAY,
        )
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            classifier: Arc::new(error_classifier::is_retryable),
        }
    }

    /// Policy that makes a single attempt
    pub fn no_retry() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Replace the retryability predicate
    pub fn with_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&OperationError) -> bool + Send + Sync + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn is_retryable(&self, error: &OperationError) -> bool {
        !error.is_cancelled() && (self.classifier)(error)
    }

    /// Wait inserted after failed attempt `attempt` (1-indexed)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Sum of every wait if all retries are used
    pub fn total_backoff(&self) -> Duration {
        (1..=self.max_retries).fold(Duration::ZERO, |total, attempt| {
            total.saturating_add(self.backoff_for(attempt))
        })
    }
}

/// Result of a retry sequence together with the number of attempts made
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    pub result: OperationResult<T>,
    /// Attempts actually invoked; 0 if cancelled before the first one
    pub attempts: u32,
}

impl<T> RetryOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(&self.result, Err(error) if error.is_cancelled())
    }

    pub fn into_result(self) -> OperationResult<T> {
        self.result
    }
}

/// Run `operation` until it succeeds, fails permanently, runs out of retries
/// or `token` is cancelled.
///
/// The operation receives a clone of the token and the 1-indexed attempt
/// number. It is never invoked once the token is cancelled.
pub async fn run_with_retries<T, F, Fut>(
    mut operation: F,
    token: &CancellationToken,
    policy: &RetryPolicy,
) -> RetryOutcome<T>
where
    F: FnMut(CancellationToken, u32) -> Fut,
    Fut: Future<Output = OperationResult<T>>,
{
    let mut attempt: u32 = 1;

    loop {
        if token.is_cancelled() {
            return cancelled_outcome(token, attempt - 1);
        }

        debug!(token_id = %token.id(), attempt, "Starting attempt");

        let error = match operation(token.clone(), attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(error) => error,
        };

        if token.is_cancelled() {
            return cancelled_outcome(token, attempt);
        }

        if attempt > policy.max_retries || !policy.is_retryable(&error) {
            warn!(
                token_id = %token.id(),
                attempt,
                category = %classify(&error),
                error = %error,
                "Attempt failed, not retrying"
            );
            return RetryOutcome {
                result: Err(error),
                attempts: attempt,
            };
        }

        let wait = policy.backoff_for(attempt);
        debug!(
            token_id = %token.id(),
            attempt,
            delay_ms = wait.as_millis() as u64,
            category = %classify(&error),
            error = %error,
            "Attempt failed, backing off"
        );

        if let Err(cancelled) = delay(wait, token).await {
            return RetryOutcome {
                result: Err(cancelled),
                attempts: attempt,
            };
        }

        attempt += 1;
    }
}

fn cancelled_outcome<T>(token: &CancellationToken, attempts: u32) -> RetryOutcome<T> {
    RetryOutcome {
        result: Err(OperationError::cancelled(
            token.reason().unwrap_or_default(),
        )),
        attempts,
    }
}
