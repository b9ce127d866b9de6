//! Observable state machine shared by every executor.
//!
//! Executors publish [`OperationSnapshot`]s over a `tokio::sync::watch`
//! channel; consumers poll accessors or subscribe instead of reaching into
//! executor internals.

pub mod snapshot;
pub mod states;

pub use snapshot::OperationSnapshot;
pub use states::OperationState;
