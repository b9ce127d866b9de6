use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Where an entry of a given age sits relative to the stale and cache windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// Servable and not yet stale
    Fresh,
    /// Still servable, but older than the stale threshold
    Stale,
    /// Past the cache window; must be treated as absent
    Expired,
}

impl Freshness {
    /// Servable for `[0, cache_time)`, stale once strictly older than `stale_time`
    pub fn at(age: Duration, cache_time: Duration, stale_time: Duration) -> Self {
        if age >= cache_time {
            Self::Expired
        } else if age > stale_time {
            Self::Stale
        } else {
            Self::Fresh
        }
    }

    pub fn is_servable(&self) -> bool {
        !matches!(self, Self::Expired)
    }
}

/// Cached value for one key
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry<T> {
    pub key: String,
    pub data: T,
    #[serde(skip)]
    pub timestamp: Instant,
    /// Wall-clock time of the write, for inspection only
    pub cached_at: DateTime<Utc>,
    /// Set once a lookup finds the entry past the stale threshold
    pub is_stale: bool,
}

impl<T> CacheEntry<T> {
    pub fn new(key: impl Into<String>, data: T) -> Self {
        Self {
            key: key.into(),
            data,
            timestamp: Instant::now(),
            cached_at: Utc::now(),
            is_stale: false,
        }
    }

    pub fn age(&self) -> Duration {
        self.age_at(Instant::now())
    }

    pub fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.timestamp)
    }

    pub fn freshness_at(&self, now: Instant, cache_time: Duration, stale_time: Duration) -> Freshness {
        Freshness::at(self.age_at(now), cache_time, stale_time)
    }
}

/// Value served from the cache without invoking the operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheLookup<T> {
    pub data: T,
    pub is_stale: bool,
    pub age: Duration,
}
