//! Keyed cache store shared by cached executors.

use super::entry::{CacheEntry, CacheLookup, Freshness};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Explicitly constructed keyed store
///
/// Clones share the same map, so one store can back several executors.
/// Every read-modify-write happens under the shard lock of its key.
#[derive(Debug)]
pub struct CacheStore<T> {
    entries: Arc<DashMap<String, CacheEntry<T>>>,
}

impl<T> Clone for CacheStore<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<T> Default for CacheStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CacheStore<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<CacheEntry<T>> {
        self.entries.remove(key).map(|(_, entry)| entry)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Store `data` under `key` with a fresh timestamp
    pub fn insert(&self, key: impl Into<String>, data: T) {
        let entry = CacheEntry::new(key, data);
        debug!(key = %entry.key, "Cache entry stored");
        self.entries.insert(entry.key.clone(), entry);
    }

    /// Freshness of the entry under `key` without touching it
    pub fn freshness(&self, key: &str, cache_time: Duration, stale_time: Duration) -> Option<Freshness> {
        let now = Instant::now();
        self.entries.get(key).map(|entry| {
            let freshness = entry.freshness_at(now, cache_time, stale_time);
            if entry.is_stale && freshness == Freshness::Fresh {
                Freshness::Stale
            } else {
                freshness
            }
        })
    }
}

impl<T: Clone> CacheStore<T> {
    /// Non-invoking read for inspection; ignores the cache windows
    pub fn get(&self, key: &str) -> Option<CacheEntry<T>> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    /// Serve the entry under `key` if it is still inside `cache_time`.
    ///
    /// Marks the entry stale as a side effect once it is older than
    /// `stale_time`. Expired entries are evicted and reported as absent.
    pub fn lookup(
        &self,
        key: &str,
        cache_time: Duration,
        stale_time: Duration,
    ) -> Option<CacheLookup<T>> {
        let now = Instant::now();

        let expired = match self.entries.get_mut(key) {
            None => return None,
            Some(mut entry) => match entry.freshness_at(now, cache_time, stale_time) {
                Freshness::Expired => true,
                freshness => {
                    if freshness == Freshness::Stale && !entry.is_stale {
                        entry.is_stale = true;
                        debug!(key, age_ms = entry.age_at(now).as_millis() as u64, "Cache entry marked stale");
                    }
                    return Some(CacheLookup {
                        data: entry.data.clone(),
                        is_stale: entry.is_stale,
                        age: entry.age_at(now),
                    });
                }
            },
        };

        if expired {
            self.entries
                .remove_if(key, |_, entry| !entry.freshness_at(now, cache_time, stale_time).is_servable());
            debug!(key, "Cache entry expired");
        }
        None
    }
}
