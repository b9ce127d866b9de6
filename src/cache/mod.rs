//! # Cache Module
//!
//! Explicit keyed store backing [`CachedExecutor`](crate::executor::CachedExecutor).
//!
//! An entry is servable for `[timestamp, timestamp + cache_time)` and gets
//! flagged stale once it is strictly older than `stale_time`. Stale entries are
//! still served; nothing here refreshes them in the background.

pub mod entry;
pub mod store;

pub use entry::{CacheEntry, CacheLookup, Freshness};
pub use store::CacheStore;
