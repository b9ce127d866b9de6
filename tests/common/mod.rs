//! Shared mocks for the integration suites.

#![allow(dead_code)]

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use resilient_ops::{
    BatchOptions, CancellationToken, ExecutorOptions, NoopNotifier, Notifier, OperationError,
    OperationResult,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Counts invocations across clones
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicU32>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Records `(attempt, elapsed since start)` for every invocation
#[derive(Debug, Clone)]
pub struct AttemptLog {
    started: Instant,
    entries: Arc<Mutex<Vec<(u32, Duration)>>>,
}

impl AttemptLog {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn record(&self, attempt: u32) {
        self.entries.lock().push((attempt, self.started.elapsed()));
    }

    pub fn entries(&self) -> Vec<(u32, Duration)> {
        self.entries.lock().clone()
    }

    pub fn attempts(&self) -> Vec<u32> {
        self.entries.lock().iter().map(|(attempt, _)| *attempt).collect()
    }
}

/// Fails with a transient error for the first `failures` attempts, then
/// succeeds with the attempt number
pub fn flaky(
    failures: u32,
    log: AttemptLog,
) -> impl Fn(CancellationToken, u32, ()) -> BoxFuture<'static, OperationResult<u32>> + Send + Sync {
    move |_token, attempt, _| {
        log.record(attempt);
        async move {
            if attempt <= failures {
                Err(OperationError::new("network error: connection reset"))
            } else {
                Ok(attempt)
            }
        }
        .boxed()
    }
}

/// Sleeps `delay` without looking at the token, then returns `id`
pub fn ignores_token(
) -> impl Fn(CancellationToken, u32, (u32, Duration)) -> BoxFuture<'static, OperationResult<u32>> + Send + Sync
{
    |_token, _attempt, (id, delay)| {
        async move {
            tokio::time::sleep(delay).await;
            Ok(id)
        }
        .boxed()
    }
}

/// Collects every notification
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub successes: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    fn success(&self, message: &str) {
        self.successes.lock().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.lock().push(message.to_string());
    }
}

/// Executor options that keep test output free of notification records
pub fn quiet_options<T>() -> ExecutorOptions<T> {
    ExecutorOptions::default().with_notifier(Arc::new(NoopNotifier))
}

pub fn quiet_batch_options<R>() -> BatchOptions<R> {
    BatchOptions::default().with_notifier(Arc::new(NoopNotifier))
}
