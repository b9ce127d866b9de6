//! # Batch Executor
//!
//! Runs one item operation over many inputs with bounded overlap.
//!
//! Items are partitioned into chunks of `batch_size`; each chunk is split into
//! windows of `concurrency` items. A window's items run as separate tasks and
//! the whole window is joined before the next one starts. Results land in a
//! pre-sized vector at the input index, whatever order items settle in.
//!
//! A single token covers the whole run. Once it is cancelled no new window is
//! started, but dispatched items are left to settle and are still recorded.
//! Items that never started resolve as `Failure(Cancelled)` without counting
//! toward progress. Per-item failures are data; only a failure of the
//! orchestration itself (a panicked item task) puts the batch into `Error`.

use super::notifier::{Notifier, TracingNotifier};
use crate::config::BatchConfig;
use crate::error::{ControllerError, ControllerResult, OperationError, OperationResult};
use crate::logging::log_batch_progress;
use crate::resilience::token::{CancelReason, CancellationToken};
use crate::state_machine::OperationState;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Item operation: `(token, item) -> value`
pub type BoxedItemOperation<I, R> =
    Arc<dyn Fn(CancellationToken, I) -> BoxFuture<'static, OperationResult<R>> + Send + Sync>;

pub type ItemSuccessCallback<R> = Arc<dyn Fn(usize, &R) + Send + Sync>;
pub type ItemErrorCallback = Arc<dyn Fn(usize, &OperationError) + Send + Sync>;

/// Outcome of one item
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum BatchItemResult<R> {
    Success(R),
    Failure(OperationError),
}

impl<R> BatchItemResult<R> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    pub fn value(&self) -> Option<&R> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&OperationError> {
        match self {
            Self::Success(_) => None,
            Self::Failure(error) => Some(error),
        }
    }

    pub fn into_result(self) -> OperationResult<R> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(error) => Err(error),
        }
    }
}

impl<R> From<OperationResult<R>> for BatchItemResult<R> {
    fn from(result: OperationResult<R>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(error) => Self::Failure(error),
        }
    }
}

/// Settled items out of all items in the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
}

impl BatchProgress {
    /// Completed share in `[0.0, 1.0]`; an empty run counts as done
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// Observable state of a batch run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSnapshot<R> {
    pub state: OperationState,
    /// One slot per input; `None` until the item settles
    pub results: Vec<Option<BatchItemResult<R>>>,
    pub progress: BatchProgress,
    /// 1-indexed chunk being processed, 0 before the first
    pub current_batch: usize,
    /// Orchestration failure, never an item failure
    pub error: Option<OperationError>,
    pub total_time: Duration,
}

impl<R> Default for BatchSnapshot<R> {
    fn default() -> Self {
        Self {
            state: OperationState::Idle,
            results: Vec::new(),
            progress: BatchProgress::default(),
            current_batch: 0,
            error: None,
            total_time: Duration::ZERO,
        }
    }
}

impl<R> BatchSnapshot<R> {
    fn begin(&mut self, total: usize) {
        *self = Self {
            state: OperationState::Loading,
            results: std::iter::repeat_with(|| None).take(total).collect(),
            progress: BatchProgress { completed: 0, total },
            ..Self::default()
        };
    }
}

/// Recognised batch options
pub struct BatchOptions<R> {
    pub batch_size: usize,
    pub concurrency: usize,
    /// Deadline for the whole run
    pub timeout: Option<Duration>,
    pub show_success_toast: bool,
    pub show_error_toast: bool,
    on_item_success: Option<ItemSuccessCallback<R>>,
    on_item_error: Option<ItemErrorCallback>,
    notifier: Arc<dyn Notifier>,
}

impl<R> Clone for BatchOptions<R> {
    fn clone(&self) -> Self {
        Self {
            batch_size: self.batch_size,
            concurrency: self.concurrency,
            timeout: self.timeout,
            show_success_toast: self.show_success_toast,
            show_error_toast: self.show_error_toast,
            on_item_success: self.on_item_success.clone(),
            on_item_error: self.on_item_error.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

impl<R> fmt::Debug for BatchOptions<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOptions")
            .field("batch_size", &self.batch_size)
            .field("concurrency", &self.concurrency)
            .field("timeout", &self.timeout)
            .field("show_success_toast", &self.show_success_toast)
            .field("show_error_toast", &self.show_error_toast)
            .finish_non_exhaustive()
    }
}

impl<R> Default for BatchOptions<R> {
    fn default() -> Self {
        Self::from_config(&BatchConfig::default())
    }
}

impl<R> BatchOptions<R> {
    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            concurrency: config.concurrency,
            timeout: config.timeout(),
            show_success_toast: false,
            show_error_toast: true,
            on_item_success: None,
            on_item_error: None,
            notifier: Arc::new(TracingNotifier),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
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

    pub fn on_item_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, &R) + Send + Sync + 'static,
    {
        self.on_item_success = Some(Arc::new(callback));
        self
    }

    pub fn on_item_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, &OperationError) + Send + Sync + 'static,
    {
        self.on_item_error = Some(Arc::new(callback));
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn validate(&self) -> ControllerResult<()> {
        if self.batch_size == 0 {
            return Err(ControllerError::InvalidConfiguration(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ControllerError::InvalidConfiguration(
                "concurrency must be greater than 0".to_string(),
            ));
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(ControllerError::InvalidConfiguration(
                "timeout must be greater than 0 when set".to_string(),
            ));
        }
        Ok(())
    }
}

struct Shared<R> {
    current: Mutex<Option<CancellationToken>>,
    state: watch::Sender<BatchSnapshot<R>>,
}

impl<R> Shared<R> {
    fn is_current(&self, token: &CancellationToken) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|current| current.same_as(token))
    }

    /// Apply `update` only while `token` is the current run's token
    fn publish(&self, token: &CancellationToken, update: impl FnOnce(&mut BatchSnapshot<R>)) -> bool {
        let current = self.current.lock();
        if current.as_ref().is_some_and(|c| c.same_as(token)) {
            self.state.send_modify(update);
            true
        } else {
            false
        }
    }
}

/// Settles a run whose `execute` future is dropped mid-flight. Items still
/// in flight at that point are resolved as cancelled and not counted.
struct SettleOnDrop<R> {
    shared: Arc<Shared<R>>,
    token: Option<CancellationToken>,
}

impl<R> SettleOnDrop<R> {
    fn disarm(&mut self) {
        self.token = None;
    }
}

impl<R> Drop for SettleOnDrop<R> {
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
                for slot in snapshot.results.iter_mut().filter(|slot| slot.is_none()) {
                    *slot = Some(BatchItemResult::Failure(OperationError::cancelled(
                        reason.clone(),
                    )));
                }
                snapshot.state = OperationState::Cancelled;
                snapshot.total_time = token.elapsed();
            });
            debug!(token_id = %token.id(), "Batch run dropped before settling");
        }
    }
}

/// Settled item together with whether its task panicked
struct SettledItem<R> {
    index: usize,
    outcome: BatchItemResult<R>,
    panicked: bool,
}

/// Runs an item operation over a list of inputs in bounded windows
pub struct BatchExecutor<I, R> {
    operation: BoxedItemOperation<I, R>,
    options: BatchOptions<R>,
    shared: Arc<Shared<R>>,
}

impl<I, R> fmt::Debug for BatchExecutor<I, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchExecutor")
            .field("options", &self.options)
            .field("in_flight", &self.shared.current.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl<I, R> BatchExecutor<I, R>
where
    I: Send + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// Fails with [`ControllerError::InvalidConfiguration`] for a zero batch
    /// size, zero concurrency or a zero timeout.
    pub fn new<F, Fut>(operation: F, options: BatchOptions<R>) -> ControllerResult<Self>
    where
        F: Fn(CancellationToken, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = OperationResult<R>> + Send + 'static,
    {
        options.validate()?;

        let operation: BoxedItemOperation<I, R> =
            Arc::new(move |token, item| operation(token, item).boxed());
        let (state, _) = watch::channel(BatchSnapshot::default());

        Ok(Self {
            operation,
            options,
            shared: Arc::new(Shared {
                current: Mutex::new(None),
                state,
            }),
        })
    }

    /// Process `items`, superseding any run still in flight.
    ///
    /// Always returns one result per input in input order. The observable
    /// state is only updated while this run is current. Dropping the returned
    /// future cancels the run and settles it as `Cancelled`.
    pub async fn execute(&self, items: Vec<I>) -> Vec<BatchItemResult<R>> {
        let total = items.len();
        let token = CancellationToken::create(self.options.timeout, None);

        let previous = {
            let mut current = self.shared.current.lock();
            let previous = current.replace(token.clone());
            self.shared.state.send_modify(|snapshot| snapshot.begin(total));
            previous
        };
        let mut guard = SettleOnDrop {
            shared: self.shared.clone(),
            token: Some(token.clone()),
        };
        if let Some(previous) = previous {
            if previous.cancel(CancelReason::Superseded) {
                debug!(token_id = %previous.id(), superseded_by = %token.id(), "Batch run superseded");
            }
        }

        let mut pending = items.into_iter().enumerate().peekable();
        let mut chunks: Vec<Vec<(usize, I)>> = Vec::new();
        while pending.peek().is_some() {
            chunks.push(pending.by_ref().take(self.options.batch_size).collect());
        }

        let mut results: Vec<Option<BatchItemResult<R>>> =
            std::iter::repeat_with(|| None).take(total).collect();
        let mut orchestration_error: Option<OperationError> = None;
        let mut completed = 0;

        'chunks: for (chunk_index, chunk) in chunks.into_iter().enumerate() {
            let batch = chunk_index + 1;
            if token.is_cancelled() {
                break;
            }
            self.shared.publish(&token, |snapshot| snapshot.current_batch = batch);

            let mut chunk = chunk.into_iter();
            loop {
                let window: Vec<(usize, I)> = chunk.by_ref().take(self.options.concurrency).collect();
                if window.is_empty() {
                    break;
                }
                if token.is_cancelled() {
                    break 'chunks;
                }

                debug!(token_id = %token.id(), batch, window = window.len(), "Dispatching window");
                let settled = join_all(
                    window
                        .into_iter()
                        .map(|(index, item)| self.run_item(&token, index, item)),
                )
                .await;

                for item in settled {
                    if item.panicked && orchestration_error.is_none() {
                        orchestration_error = item.outcome.error().cloned();
                    }
                    results[item.index] = Some(item.outcome);
                    completed += 1;
                }

                if self.shared.is_current(&token) {
                    log_batch_progress(&token.id().to_string(), batch, completed, total);
                }
            }
        }

        guard.disarm();
        let total_time = token.elapsed();
        token.disarm();

        let reason = token.reason().unwrap_or_default();
        let mut unstarted = 0;
        let results: Vec<BatchItemResult<R>> = results
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    unstarted += 1;
                    BatchItemResult::Failure(OperationError::cancelled(reason.clone()))
                })
            })
            .collect();

        let state = match (&orchestration_error, unstarted) {
            (Some(_), _) => OperationState::Error,
            (None, 0) => OperationState::Success,
            (None, _) => OperationState::Cancelled,
        };

        let settled = {
            let mut current = self.shared.current.lock();
            if current.as_ref().is_some_and(|c| c.same_as(&token)) {
                *current = None;
                self.shared.state.send_modify(|snapshot| {
                    for (slot, result) in snapshot.results.iter_mut().zip(&results) {
                        if slot.is_none() {
                            *slot = Some(result.clone());
                        }
                    }
                    snapshot.state = state;
                    snapshot.error = orchestration_error.clone();
                    snapshot.total_time = total_time;
                });
                true
            } else {
                false
            }
        };

        if !settled {
            warn!(
                token_id = %token.id(),
                completed,
                total,
                "Dropping state updates of superseded batch run"
            );
            return results;
        }

        let succeeded = results.iter().filter(|result| result.is_success()).count();
        info!(
            token_id = %token.id(),
            state = %state,
            succeeded,
            failed = total - succeeded,
            unstarted,
            elapsed_ms = total_time.as_millis() as u64,
            "Batch run settled"
        );

        match (&orchestration_error, state) {
            (Some(error), _) => {
                if self.options.show_error_toast {
                    self.options.notifier.error(&error.user_message());
                }
            }
            (None, OperationState::Success) => {
                if self.options.show_success_toast {
                    self.options
                        .notifier
                        .success(&format!("{succeeded} of {total} items processed"));
                }
            }
            _ => {}
        }

        results
    }

    async fn run_item(&self, token: &CancellationToken, index: usize, item: I) -> SettledItem<R> {
        let handle = tokio::spawn((self.operation)(token.clone(), item));

        let (outcome, panicked) = match handle.await {
            Ok(result) => (BatchItemResult::from(result), false),
            Err(join_error) => {
                warn!(token_id = %token.id(), index, error = %join_error, "Batch item task failed");
                let error = OperationError::internal(format!("Batch item {index} task failed: {join_error}"));
                (BatchItemResult::Failure(error), true)
            }
        };

        let recorded = self.shared.publish(token, |snapshot| {
            if let Some(slot) = snapshot.results.get_mut(index) {
                *slot = Some(outcome.clone());
            }
            snapshot.progress.completed += 1;
        });

        if recorded {
            match &outcome {
                BatchItemResult::Success(value) => {
                    if let Some(callback) = &self.options.on_item_success {
                        callback(index, value);
                    }
                }
                BatchItemResult::Failure(error) => {
                    if let Some(callback) = &self.options.on_item_error {
                        callback(index, error);
                    }
                }
            }
        }

        SettledItem {
            index,
            outcome,
            panicked,
        }
    }
}

impl<I, R> BatchExecutor<I, R> {
    /// Stop starting new windows; dispatched items still settle
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
                if snapshot.state == OperationState::Idle {
                    false
                } else {
                    *snapshot = BatchSnapshot::default();
                    true
                }
            });
            previous
        };
        if let Some(token) = previous {
            token.cancel(CancelReason::Reset);
        }
    }

    pub fn options(&self) -> &BatchOptions<R> {
        &self.options
    }

    pub fn current_token(&self) -> Option<CancellationToken> {
        self.shared.current.lock().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BatchSnapshot<R>> {
        self.shared.state.subscribe()
    }

    pub fn state(&self) -> OperationState {
        self.shared.state.borrow().state
    }

    pub fn progress(&self) -> BatchProgress {
        self.shared.state.borrow().progress
    }

    pub fn current_batch(&self) -> usize {
        self.shared.state.borrow().current_batch
    }

    pub fn error(&self) -> Option<OperationError> {
        self.shared.state.borrow().error.clone()
    }

    pub fn total_time(&self) -> Duration {
        self.shared.state.borrow().total_time
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

impl<I, R: Clone> BatchExecutor<I, R> {
    pub fn snapshot(&self) -> BatchSnapshot<R> {
        self.shared.state.borrow().clone()
    }

    pub fn results(&self) -> Vec<Option<BatchItemResult<R>>> {
        self.shared.state.borrow().results.clone()
    }
}

impl<I, R> Drop for BatchExecutor<I, R> {
    fn drop(&mut self) {
        if let Some(token) = self.shared.current.lock().take() {
            token.cancel(CancelReason::Dropped);
        }
    }
}
