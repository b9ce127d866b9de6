//! Interruptible delay used for backoff waits.

use crate::error::{OperationError, OperationResult};
use crate::resilience::token::CancellationToken;
use std::time::Duration;

/// Sleep for `duration`, failing early with [`OperationError::Cancelled`] if
/// `token` is or becomes cancelled.
///
/// The call holds exactly one waiter on the token's signal. The waiter is
/// released when the call settles either way, or when the future is dropped.
pub async fn delay(duration: Duration, token: &CancellationToken) -> OperationResult<()> {
    if token.is_cancelled() {
        return Err(OperationError::cancelled(
            token.reason().unwrap_or_default(),
        ));
    }

    tokio::select! {
        biased;
        reason = token.cancelled() => Err(OperationError::cancelled(reason)),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
