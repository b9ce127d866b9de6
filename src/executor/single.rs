//! # Single-Operation Executor
//!
//! Runs one wrapped operation under the retry engine and publishes its
//! progress as [`OperationSnapshot`]s.
//!
//! ## Race freedom
//!
//! Every `execute` call installs a fresh token as the executor's *current*
//! token and cancels the previous one with [`CancelReason::Superseded`]. A
//! sequence may only write observable state, fire callbacks or notify while
//! its token is still current; results of superseded sequences are dropped.
//! The current-token check and the state write happen under one lock, so a
//! newer `execute` can never be overwritten by an older settlement.
//!
//! An `execute` future dropped before it settles (a caller-side timeout, a
//! lost `select!` branch, an aborted task) cancels its token with
//! [`CancelReason::Dropped`]. If that token was still current, the executor
//! settles as `Cancelled`.

use super::notifier::{Notifier, TracingNotifier};
use crate::config::ExecutorConfig;
use crate::constants::defaults;
use crate::error::{ControllerError, ControllerResult, OperationError, OperationResult};
use crate::logging::log_operation_settled;
use crate::resilience::retry::{run_with_retries, RetryClassifier, RetryPolicy};
use crate::resilience::token::{CancelReason, CancellationToken};
use crate::state_machine::{OperationSnapshot, OperationState};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Wrapped operation: `(token, attempt, args) -> value`
pub type BoxedOperation<A, T> =
    Arc<dyn Fn(CancellationToken, u32, A) -> BoxFuture<'static, OperationResult<T>> + Send + Sync>;

pub type SuccessCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&OperationError) + Send + Sync>;
pub type CancelHandler = Arc<dyn Fn(&CancelReason) + Send + Sync>;

/// Recognised executor options
pub struct ExecutorOptions<T> {
    pub timeout: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
    pub show_success_toast: bool,
    pub show_error_toast: bool,
    pub success_message: String,
    on_success: Option<SuccessCallback<T>>,
    on_error: Option<ErrorCallback>,
    on_cancel: Option<CancelHandler>,
    notifier: Arc<dyn Notifier>,
    classifier: Option<RetryClassifier>,
}

impl<T> Clone for ExecutorOptions<T> {
    fn clone(&self) -> Self {
        Self {
            timeout: self.timeout,
            retries: self.retries,
            retry_delay: self.retry_delay,
            show_success_toast: self.show_success_toast,
            show_error_toast: self.show_error_toast,
            success_message: self.success_message.clone(),
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            on_cancel: self.on_cancel.clone(),
            notifier: self.notifier.clone(),
            classifier: self.classifier.clone(),
        }
    }
}

impl<T> fmt::Debug for ExecutorOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorOptions")
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("retry_delay", &self.retry_delay)
            .field("show_success_toast", &self.show_success_toast)
            .field("show_error_toast", &self.show_error_toast)
            .field("success_message", &self.success_message)
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_cancel", &self.on_cancel.is_some())
            .finish_non_exhaustive()
    }
}

impl<T> Default for ExecutorOptions<T> {
    fn default() -> Self {
        Self::from_config(&ExecutorConfig::default())
    }
}

impl<T> ExecutorOptions<T> {
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self {
            timeout: config.timeout(),
            retries: config.retries,
            retry_delay: config.retry_delay(),
            show_success_toast: config.show_success_toast,
            show_error_toast: config.show_error_toast,
            success_message: defaults::SUCCESS_MESSAGE.to_string(),
            on_success: None,
            on_error: None,
            on_cancel: None,
            notifier: Arc::new(TracingNotifier),
            classifier: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn show_success_toast(mut self, show: bool) -> Self {
        self.show_success_toast = show;
        self
    }

    pub fn show_error_toast(mut self, show: bool) -> Self {
        self.show_error_toast = show;
        self
    }

    pub fn with_success_message(mut self, message: impl Into<String>) -> Self {
        self.success_message = message.into();
        self
    }

    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&OperationError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn on_cancel<F>(mut self, callback: F) -> Self
    where
        F: Fn(&CancelReason) + Send + Sync + 'static,
    {
        self.on_cancel = Some(Arc::new(callback));
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replace the default retryability predicate
    pub fn with_retry_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&OperationError) -> bool + Send + Sync + 'static,
    {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    pub fn validate(&self) -> ControllerResult<()> {
        if self.timeout.is_zero() {
            return Err(ControllerError::InvalidConfiguration(
                "timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(self.retries, self.retry_delay);
        match &self.classifier {
            Some(classifier) => {
                let classifier = classifier.clone();
                policy.with_classifier(move |error| classifier(error))
            }
            None => policy,
        }
    }
}

struct Shared<T> {
    current: Mutex<Option<CancellationToken>>,
    state: watch::Sender<OperationSnapshot<T>>,
}

impl<T: Clone> Shared<T> {
    /// Publish the outcome if `token` is still current. Returns the state it
    /// settled into, read under the same lock as the write.
    fn settle(
        &self,
        token: &CancellationToken,
        result: &OperationResult<T>,
        attempts: u32,
        total_time: Duration,
    ) -> Option<OperationState> {
        let mut current = self.current.lock();
        if !current.as_ref().is_some_and(|c| c.same_as(token)) {
            return None;
        }
        *current = None;

        let mut state = OperationState::Loading;
        self.state.send_modify(|snapshot| {
            match result {
                Ok(value) => snapshot.succeed(value.clone(), attempts, total_time),
                Err(error) => snapshot.fail(error.clone(), attempts, total_time),
            }
            state = snapshot.state;
        });
        Some(state)
    }
}

/// Settles a sequence whose `execute` future is dropped mid-flight
struct SettleOnDrop<T> {
    shared: Arc<Shared<T>>,
    token: Option<CancellationToken>,
}

impl<T> SettleOnDrop<T> {
    fn disarm(&mut self) {
        self.token = None;
    }
}

impl<T> Drop for SettleOnDrop<T> {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        token.cancel(CancelReason::Dropped);
        let reason = token.reason().unwrap_or(CancelReason::Dropped);

        let mut current = self.shared.current.lock();
        if current.as_ref().is_some_and(|c| c.same_as(&token)) {
            *current = None;
            self.shared.state.send_modify(|snapshot| {
                let attempt = snapshot.attempt;
                snapshot.fail(OperationError::cancelled(reason), attempt, token.elapsed());
            });
            debug!(token_id = %token.id(), "Sequence dropped before settling");
        }
    }
}

/// Executes one operation with timeout, retries and supersession
pub struct OperationExecutor<A, T> {
    operation: BoxedOperation<A, T>,
    options: ExecutorOptions<T>,
    shared: Arc<Shared<T>>,
}

impl<A, T> fmt::Debug for OperationExecutor<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationExecutor")
            .field("options", &self.options)
            .field("in_flight", &self.shared.current.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl<A, T> OperationExecutor<A, T>
where
    A: Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Executor with default options
    pub fn new<F, Fut>(operation: F) -> ControllerResult<Self>
    where
        F: Fn(CancellationToken, u32, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = OperationResult<T>> + Send + 'static,
    {
        Self::with_options(operation, ExecutorOptions::default())
    }

    /// Fails with [`ControllerError::InvalidConfiguration`] on malformed options
    pub fn with_options<F, Fut>(
        operation: F,
        options: ExecutorOptions<T>,
    ) -> ControllerResult<Self>
    where
        F: Fn(CancellationToken, u32, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = OperationResult<T>> + Send + 'static,
    {
        options.validate()?;

        let operation: BoxedOperation<A, T> =
            Arc::new(move |token, attempt, args| operation(token, attempt, args).boxed());
        let (state, _) = watch::channel(OperationSnapshot::default());

        Ok(Self {
            operation,
            options,
            shared: Arc::new(Shared {
                current: Mutex::new(None),
                state,
            }),
        })
    }

    /// Run the operation, superseding any sequence still in flight.
    ///
    /// Returns the value on success. Failures, cancellations and superseded
    /// runs yield `None`; the outcome of the current run is readable through
    /// [`error`](Self::error) and [`state`](Self::state).
    pub async fn execute(&self, args: A) -> Option<T> {
        let token = CancellationToken::with_timeout(self.options.timeout);

        let previous = {
            let mut current = self.shared.current.lock();
            let previous = current.replace(token.clone());
            self.shared.state.send_modify(|snapshot| snapshot.begin());
            previous
        };
        let mut guard = SettleOnDrop {
            shared: self.shared.clone(),
            token: Some(token.clone()),
        };
        if let Some(previous) = previous {
            if previous.cancel(CancelReason::Superseded) {
                debug!(
                    token_id = %previous.id(),
                    superseded_by = %token.id(),
                    "In-flight sequence superseded"
                );
            }
        }

        let policy = self.options.retry_policy();
        let operation = self.operation.clone();
        let shared = self.shared.clone();

        let outcome = run_with_retries(
            move |attempt_token, attempt| {
                {
                    let current = shared.current.lock();
                    if current.as_ref().is_some_and(|c| c.same_as(&attempt_token)) {
                        shared
                            .state
                            .send_modify(|snapshot| snapshot.record_attempt(attempt));
                    }
                }
                operation(attempt_token, attempt, args.clone())
            },
            &token,
            &policy,
        )
        .await;
        guard.disarm();

        let total_time = token.elapsed();
        token.disarm();

        let settled = self
            .shared
            .settle(&token, &outcome.result, outcome.attempts, total_time);

        let Some(state) = settled else {
            warn!(
                token_id = %token.id(),
                attempts = outcome.attempts,
                elapsed_ms = total_time.as_millis() as u64,
                "Dropping result of superseded sequence"
            );
            return None;
        };

        let error_text = outcome.result.as_ref().err().map(|error| error.to_string());
        log_operation_settled(
            &token.id().to_string(),
            state,
            outcome.attempts,
            total_time,
            error_text.as_deref(),
        );

        match outcome.result {
            Ok(value) => {
                if let Some(on_success) = &self.options.on_success {
                    on_success(&value);
                }
                if self.options.show_success_toast {
                    self.options.notifier.success(&self.options.success_message);
                }
                Some(value)
            }
            Err(OperationError::Cancelled { reason }) => {
                if let Some(on_cancel) = &self.options.on_cancel {
                    on_cancel(&reason);
                }
                if reason.is_timeout() && self.options.show_error_toast {
                    let error = OperationError::cancelled(reason);
                    self.options.notifier.error(&error.user_message());
                }
                None
            }
            Err(error) => {
                if let Some(on_error) = &self.options.on_error {
                    on_error(&error);
                }
                if self.options.show_error_toast {
                    self.options.notifier.error(&error.user_message());
                }
                None
            }
        }
    }
}

impl<A, T> OperationExecutor<A, T> {
    /// Cancel the current sequence, if any. Observable state becomes
    /// `Cancelled` once the sequence reaches its next suspension point.
    pub fn cancel(&self, reason: impl Into<CancelReason>) -> bool {
        let current = self.shared.current.lock().clone();
        match current {
            Some(token) => token.cancel(reason),
            None => false,
        }
    }

    /// Cancel anything in flight and return to `Idle`
    pub fn reset(&self) {
        let previous = {
            let mut current = self.shared.current.lock();
            let previous = current.take();
            self.shared.state.send_if_modified(|snapshot| {
                if snapshot.is_idle() {
                    false
                } else {
                    snapshot.reset();
                    true
                }
            });
            previous
        };
        if let Some(token) = previous {
            token.cancel(CancelReason::Reset);
        }
    }

    pub fn options(&self) -> &ExecutorOptions<T> {
        &self.options
    }

    /// Token of the sequence in flight
    pub fn current_token(&self) -> Option<CancellationToken> {
        self.shared.current.lock().clone()
    }

    /// Receiver notified on every observable state change
    pub fn subscribe(&self) -> watch::Receiver<OperationSnapshot<T>> {
        self.shared.state.subscribe()
    }

    pub fn state(&self) -> OperationState {
        self.shared.state.borrow().state
    }

    pub fn error(&self) -> Option<OperationError> {
        self.shared.state.borrow().error.clone()
    }

    pub fn attempt(&self) -> u32 {
        self.shared.state.borrow().attempt
    }

    pub fn total_time(&self) -> Duration {
        self.shared.state.borrow().total_time
    }

    pub fn is_idle(&self) -> bool {
        self.state() == OperationState::Idle
    }

    pub fn is_loading(&self) -> bool {
        self.state() == OperationState::Loading
    }

    pub fn is_success(&self) -> bool {
        self.state() == OperationState::Success
    }

    pub fn is_error(&self) -> bool {
        self.state() == OperationState::Error
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == OperationState::Cancelled
    }
}

impl<A, T: Clone> OperationExecutor<A, T> {
    pub fn snapshot(&self) -> OperationSnapshot<T> {
        self.shared.state.borrow().clone()
    }

    pub fn data(&self) -> Option<T> {
        self.shared.state.borrow().data.clone()
    }
}

impl<A, T> Drop for OperationExecutor<A, T> {
    fn drop(&mut self) {
        if let Some(token) = self.shared.current.lock().take() {
            token.cancel(CancelReason::Dropped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::executor::notifier::testing::RecordingNotifier;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn flaky(failures: u32) -> impl Fn(CancellationToken, u32, ()) -> BoxFuture<'static, OperationResult<u32>> {
        move |_token, attempt, _| {
            async move {
                if attempt <= failures {
                    Err(OperationError::new("network error"))
                } else {
                    Ok(attempt)
                }
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_retries_updates_state() {
        let executor = OperationExecutor::with_options(
            flaky(2),
            ExecutorOptions::default().with_retry_delay(Duration::from_millis(100)),
        )
        .expect("valid options");

        assert_eq!(executor.execute(()).await, Some(3));
        let snapshot = executor.snapshot();
        assert_eq!(snapshot.state, OperationState::Success);
        assert_eq!(snapshot.data, Some(3));
        assert_eq!(snapshot.attempt, 3);
        assert_eq!(snapshot.total_time, Duration::from_millis(300));
        assert!(executor.current_token().is_none());
    }

    #[tokio::test]
    async fn test_failure_is_recorded_not_returned() {
        let errors = Arc::new(AtomicU32::new(0));
        let notifier = Arc::new(RecordingNotifier::default());
        let options = ExecutorOptions::default()
            .with_notifier(notifier.clone())
            .on_error({
                let errors = errors.clone();
                move |_| {
                    errors.fetch_add(1, Ordering::SeqCst);
                }
            });

        let executor = OperationExecutor::with_options(
            |_token, _attempt, _: ()| async {
                Err::<(), _>(
                    OperationError::new("session expired")
                        .with_code(ErrorCode::Unauthorized)
                        .non_retryable(),
                )
            },
            options,
        )
        .expect("valid options");

        assert_eq!(executor.execute(()).await, None);
        assert!(executor.is_error());
        assert_eq!(executor.attempt(), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(*notifier.errors.lock(), vec!["Please sign in again".to_string()]);
    }

    #[tokio::test]
    async fn test_success_toast_only_when_enabled() {
        let notifier = Arc::new(RecordingNotifier::default());
        let executor = OperationExecutor::with_options(
            |_token, _attempt, name: &'static str| async move { Ok(name.len()) },
            ExecutorOptions::default()
                .show_success_toast(true)
                .with_success_message("Saved")
                .with_notifier(notifier.clone()),
        )
        .expect("valid options");

        assert_eq!(executor.execute("draft").await, Some(5));
        assert_eq!(*notifier.successes.lock(), vec!["Saved".to_string()]);
        assert!(notifier.errors.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_settles_as_cancelled() {
        let cancels = Arc::new(Mutex::new(Vec::new()));
        let executor = OperationExecutor::with_options(
            |token: CancellationToken, _attempt, _: ()| async move {
                token.cancelled().await;
                Err::<(), _>(OperationError::cancelled(CancelReason::Timeout))
            },
            ExecutorOptions::default()
                .with_timeout(Duration::from_millis(250))
                .with_notifier(Arc::new(crate::executor::NoopNotifier))
                .on_cancel({
                    let cancels = cancels.clone();
                    move |reason| cancels.lock().push(reason.clone())
                }),
        )
        .expect("valid options");

        assert_eq!(executor.execute(()).await, None);
        assert!(executor.is_cancelled());
        assert!(executor.error().is_none());
        assert_eq!(executor.total_time(), Duration::from_millis(250));
        assert_eq!(*cancels.lock(), vec![CancelReason::Timeout]);
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let executor = OperationExecutor::new(|_token, _attempt, value: u8| async move { Ok(value) })
            .expect("valid options");
        executor.execute(4).await;
        assert!(executor.is_success());

        let mut changes = executor.subscribe();

        executor.reset();
        assert!(changes.has_changed().expect("sender alive"));
        changes.borrow_and_update();

        executor.reset();
        assert!(!changes.has_changed().expect("sender alive"));
        let snapshot = executor.snapshot();
        assert_eq!(snapshot, OperationSnapshot::default());
    }

    #[tokio::test]
    async fn test_cancel_without_sequence_is_noop() {
        let executor = OperationExecutor::new(|_token, _attempt, _: ()| async { Ok(()) })
            .expect("valid options");
        assert!(!executor.cancel("nothing running"));
        assert!(executor.is_idle());
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let result = OperationExecutor::with_options(
            |_token, _attempt, _: ()| async { Ok(()) },
            ExecutorOptions::default().with_timeout(Duration::ZERO),
        );
        assert!(matches!(result, Err(ControllerError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_settle_reports_its_own_state() {
        let (state, _) = watch::channel(OperationSnapshot::default());
        let shared = Shared {
            current: Mutex::new(None),
            state,
        };
        let first = CancellationToken::new();
        *shared.current.lock() = Some(first.clone());

        let settled = shared.settle(&first, &Ok(7_u32), 1, Duration::from_millis(5));
        // A newer sequence begins right after the write
        let second = CancellationToken::new();
        *shared.current.lock() = Some(second.clone());
        shared.state.send_modify(|snapshot| snapshot.begin());

        assert_eq!(settled, Some(OperationState::Success));
        assert!(shared.state.borrow().is_loading());
        assert_eq!(
            shared.settle(&first, &Ok(8), 1, Duration::ZERO),
            None,
            "stale token must not settle"
        );

        let failed = shared.settle(
            &second,
            &Err(OperationError::cancelled(CancelReason::Timeout)),
            2,
            Duration::from_millis(30),
        );
        assert_eq!(failed, Some(OperationState::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_in_flight_token() {
        let executor = Arc::new(OperationExecutor::new(
            |token: CancellationToken, _attempt, _: ()| async move {
                let reason = token.cancelled().await;
                Err::<(), _>(OperationError::cancelled(reason))
            },
        )
        .expect("valid options"));

        let task = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.execute(()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let token = executor.current_token().expect("sequence in flight");
        task.abort();
        let _ = task.await;
        drop(executor);

        assert_eq!(token.reason(), Some(CancelReason::Dropped));
    }
}
