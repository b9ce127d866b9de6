//! Point-in-time view of an executor's observable state.
//!
//! All mutation goes through the transition methods so that `data` and
//! `error` are never set together and only `Success` carries data.

use super::states::OperationState;
use crate::error::OperationError;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationSnapshot<T> {
    pub state: OperationState,
    pub data: Option<T>,
    pub error: Option<OperationError>,
    /// Current or last attempt number, 1-indexed; 0 before the first attempt
    pub attempt: u32,
    /// Elapsed time of the sequence at settlement
    pub total_time: Duration,
}

impl<T> Default for OperationSnapshot<T> {
    fn default() -> Self {
        Self {
            state: OperationState::Idle,
            data: None,
            error: None,
            attempt: 0,
            total_time: Duration::ZERO,
        }
    }
}

impl<T> OperationSnapshot<T> {
    pub fn is_idle(&self) -> bool {
        self.state == OperationState::Idle
    }

    pub fn is_loading(&self) -> bool {
        self.state == OperationState::Loading
    }

    pub fn is_success(&self) -> bool {
        self.state == OperationState::Success
    }

    pub fn is_error(&self) -> bool {
        self.state == OperationState::Error
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == OperationState::Cancelled
    }

    pub(crate) fn begin(&mut self) {
        *self = Self {
            state: OperationState::Loading,
            ..Self::default()
        };
    }

    pub(crate) fn record_attempt(&mut self, attempt: u32) {
        self.attempt = attempt;
    }

    pub(crate) fn succeed(&mut self, data: T, attempt: u32, total_time: Duration) {
        *self = Self {
            state: OperationState::Success,
            data: Some(data),
            error: None,
            attempt,
            total_time,
        };
    }

    /// Settle with a failure; cancellations land in `Cancelled` without an error
    pub(crate) fn fail(&mut self, error: OperationError, attempt: u32, total_time: Duration) {
        let (state, error) = if error.is_cancelled() {
            (OperationState::Cancelled, None)
        } else {
            (OperationState::Error, Some(error))
        };
        *self = Self {
            state,
            data: None,
            error,
            attempt,
            total_time,
        };
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::token::CancelReason;

    #[test]
    fn test_transitions_keep_data_and_error_exclusive() {
        let mut snapshot = OperationSnapshot::<u32>::default();
        assert!(snapshot.is_idle());

        snapshot.begin();
        snapshot.record_attempt(2);
        assert!(snapshot.is_loading());
        assert_eq!(snapshot.attempt, 2);

        snapshot.succeed(7, 2, Duration::from_millis(30));
        assert_eq!(snapshot.data, Some(7));
        assert!(snapshot.error.is_none());

        snapshot.begin();
        assert!(snapshot.data.is_none());
        assert_eq!(snapshot.attempt, 0);

        snapshot.fail(OperationError::new("bad"), 1, Duration::from_millis(5));
        assert!(snapshot.is_error());
        assert!(snapshot.data.is_none());
        assert_eq!(snapshot.error, Some(OperationError::new("bad")));
    }

    #[test]
    fn test_cancellation_settles_without_error() {
        let mut snapshot = OperationSnapshot::<u32>::default();
        snapshot.begin();
        snapshot.fail(
            OperationError::cancelled(CancelReason::Timeout),
            3,
            Duration::from_secs(30),
        );

        assert!(snapshot.is_cancelled());
        assert!(snapshot.error.is_none());
        assert_eq!(snapshot.attempt, 3);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut snapshot = OperationSnapshot::<String>::default();
        snapshot.succeed("done".to_string(), 1, Duration::from_millis(12));

        let json = serde_json::to_value(&snapshot).expect("serialize snapshot");
        assert_eq!(json["state"], "success");
        assert_eq!(json["data"], "done");
        assert_eq!(json["attempt"], 1);
    }
}
