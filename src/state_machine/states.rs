use crate::constants::status_groups;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Observable lifecycle of an executor
///
/// `Idle` is initial. Every `execute` enters `Loading`, which settles into one
/// of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// Nothing has run yet, or the executor was reset
    #[default]
    Idle,
    /// An attempt sequence is in flight
    Loading,
    /// The last sequence produced a value
    Success,
    /// The last sequence failed
    Error,
    /// The last sequence was cancelled or timed out
    Cancelled,
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        status_groups::TERMINAL_STATES.contains(self)
    }

    pub fn is_settled(&self) -> bool {
        status_groups::SETTLED_STATES.contains(self)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Loading => write!(f, "loading"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for OperationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "loading" => Ok(Self::Loading),
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid operation state: {s}")),
        }
    }
}
