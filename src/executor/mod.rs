//! # Executors
//!
//! Consumer-facing surfaces built on the resilience primitives:
//!
//! - [`OperationExecutor`]: one operation under timeout, retries and
//!   supersession, with observable state
//! - [`BatchExecutor`]: many inputs in chunks and concurrency windows
//! - [`CachedExecutor`]: keyed TTL cache in front of an `OperationExecutor`
//!
//! All three hold at most one current token. Starting a new run cancels the
//! previous one, and dropping an executor cancels whatever is in flight.

pub mod batch;
pub mod cached;
pub mod notifier;
pub mod single;

pub use batch::{
    BatchExecutor, BatchItemResult, BatchOptions, BatchProgress, BatchSnapshot,
    BoxedItemOperation, ItemErrorCallback, ItemSuccessCallback,
};
pub use cached::{CacheOptions, CachedExecutor};
pub use notifier::{NoopNotifier, Notifier, TracingNotifier};
pub use single::{
    BoxedOperation, CancelHandler, ErrorCallback, ExecutorOptions, OperationExecutor,
    SuccessCallback,
};
