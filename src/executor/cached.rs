//! # Cache Wrapper
//!
//! Serves an [`OperationExecutor`]'s results from a [`CacheStore`] while they
//! are younger than `cache_time`, flagging them stale past `stale_time`.
//! Only successful results are stored; a failed run leaves any existing entry
//! untouched. Nothing is refreshed in the background.

use super::single::OperationExecutor;
use crate::cache::{CacheEntry, CacheStore, Freshness};
use crate::config::CacheConfig;
use crate::error::{ControllerError, ControllerResult};
use crate::resilience::token::CancelReason;
use parking_lot::RwLock;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Cache windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// How long an entry is served
    pub cache_time: Duration,
    /// Age past which a served entry is flagged stale
    pub stale_time: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl CacheOptions {
    pub fn new(cache_time: Duration, stale_time: Duration) -> Self {
        Self {
            cache_time,
            stale_time,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.cache_time(), config.stale_time())
    }

    pub fn validate(&self) -> ControllerResult<()> {
        if self.stale_time >= self.cache_time {
            return Err(ControllerError::InvalidConfiguration(format!(
                "stale_time ({:?}) must be less than cache_time ({:?})",
                self.stale_time, self.cache_time
            )));
        }
        Ok(())
    }
}

/// Keyed cache in front of a single-operation executor
pub struct CachedExecutor<A, T> {
    executor: OperationExecutor<A, T>,
    store: CacheStore<T>,
    options: CacheOptions,
    key: RwLock<String>,
}

impl<A, T> fmt::Debug for CachedExecutor<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedExecutor")
            .field("key", &*self.key.read())
            .field("options", &self.options)
            .field("entries", &self.store.len())
            .finish_non_exhaustive()
    }
}

impl<A, T> CachedExecutor<A, T>
where
    A: Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Wrap `executor`, caching its results under `key` in `store`.
    ///
    /// Fails when `stale_time` is not below `cache_time`.
    pub fn new(
        key: impl Into<String>,
        executor: OperationExecutor<A, T>,
        store: CacheStore<T>,
        options: CacheOptions,
    ) -> ControllerResult<Self> {
        options.validate()?;
        Ok(Self {
            executor,
            store,
            options,
            key: RwLock::new(key.into()),
        })
    }

    /// Serve the entry for the current key, or run the operation and cache
    /// its value on success.
    ///
    /// A cache hit leaves the wrapped executor's state untouched.
    pub async fn execute(&self, args: A) -> Option<T> {
        let key = self.key();

        if let Some(hit) = self
            .store
            .lookup(&key, self.options.cache_time, self.options.stale_time)
        {
            debug!(
                key = %key,
                is_stale = hit.is_stale,
                age_ms = hit.age.as_millis() as u64,
                "Serving cached value"
            );
            return Some(hit.data);
        }

        debug!(key = %key, "Cache miss, invoking operation");
        let value = self.executor.execute(args).await?;
        self.store.insert(key, value.clone());
        Some(value)
    }

    /// Non-invoking read of the entry under `key`
    pub fn get_cached_data(&self, key: &str) -> Option<CacheEntry<T>> {
        self.store.get(key)
    }
}

impl<A, T> CachedExecutor<A, T> {
    /// Drop the entry under `key`. Returns whether one existed.
    pub fn invalidate_cache(&self, key: &str) -> bool {
        let removed = self.store.remove(key).is_some();
        if removed {
            debug!(key, "Cache entry invalidated");
        }
        removed
    }

    pub fn key(&self) -> String {
        self.key.read().clone()
    }

    /// Switch to another key; the old entry stays in the store
    pub fn set_key(&self, key: impl Into<String>) {
        *self.key.write() = key.into();
    }

    /// Whether the current key has a servable entry
    pub fn is_cached(&self) -> bool {
        self.freshness().is_some_and(|freshness| freshness.is_servable())
    }

    /// Whether the current key's entry is servable but stale
    pub fn is_stale(&self) -> bool {
        self.freshness() == Some(Freshness::Stale)
    }

    fn freshness(&self) -> Option<Freshness> {
        self.store.freshness(
            &self.key.read(),
            self.options.cache_time,
            self.options.stale_time,
        )
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn store(&self) -> &CacheStore<T> {
        &self.store
    }

    /// Wrapped executor, for observable state of the last invocation
    pub fn executor(&self) -> &OperationExecutor<A, T> {
        &self.executor
    }

    pub fn cancel(&self, reason: impl Into<CancelReason>) -> bool {
        self.executor.cancel(reason)
    }

    pub fn reset(&self) {
        self.executor.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperationError;
    use crate::resilience::token::CancellationToken;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counting(calls: Arc<AtomicU32>) -> OperationExecutor<(), u32> {
        OperationExecutor::new(move |_token: CancellationToken, _attempt, _: ()| {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(call) }
        })
        .expect("valid options")
    }

    #[test]
    fn test_options_validation() {
        assert!(CacheOptions::default().validate().is_ok());
        let inverted = CacheOptions::new(Duration::from_secs(10), Duration::from_secs(20));
        assert!(matches!(inverted.validate(), Err(ControllerError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_hit_skips_invocation_and_keeps_executor_state() {
        let calls = Arc::new(AtomicU32::new(0));
        let cached = CachedExecutor::new("profile", counting(calls.clone()), CacheStore::new(), CacheOptions::default())
            .expect("valid options");

        assert_eq!(cached.execute(()).await, Some(1));
        cached.executor().reset();

        assert_eq!(cached.execute(()).await, Some(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cached.executor().is_idle());
        assert!(cached.is_cached());
        assert!(!cached.is_stale());
    }

    #[tokio::test]
    async fn test_invalidate_forces_reinvocation() {
        let calls = Arc::new(AtomicU32::new(0));
        let cached = CachedExecutor::new("profile", counting(calls.clone()), CacheStore::new(), CacheOptions::default())
            .expect("valid options");

        cached.execute(()).await;
        assert!(cached.invalidate_cache("profile"));
        assert!(!cached.invalidate_cache("profile"));
        assert!(!cached.is_cached());

        assert_eq!(cached.execute(()).await, Some(2));
        assert_eq!(cached.get_cached_data("profile").map(|entry| entry.data), Some(2));
    }

    #[tokio::test]
    async fn test_failure_does_not_touch_existing_entry() {
        let store = CacheStore::new();
        store.insert("report", 7u32);
        let failing = OperationExecutor::with_options(
            |_token, _attempt, _: ()| async { Err::<u32, _>(OperationError::new("bad input").non_retryable()) },
            crate::executor::ExecutorOptions::default()
                .with_notifier(Arc::new(crate::executor::NoopNotifier)),
        )
        .expect("valid options");

        let cached = CachedExecutor::new("other", failing, store.clone(), CacheOptions::default())
            .expect("valid options");
        assert_eq!(cached.execute(()).await, None);
        assert!(cached.executor().is_error());
        assert!(!store.contains_key("other"));
        assert_eq!(store.get("report").map(|entry| entry.data), Some(7));
    }

    #[tokio::test]
    async fn test_set_key_switches_entry() {
        let calls = Arc::new(AtomicU32::new(0));
        let cached = CachedExecutor::new("a", counting(calls.clone()), CacheStore::new(), CacheOptions::default())
            .expect("valid options");

        assert_eq!(cached.execute(()).await, Some(1));
        cached.set_key("b");
        assert!(!cached.is_cached());
        assert_eq!(cached.execute(()).await, Some(2));
        assert_eq!(cached.store().len(), 2);
    }
}
