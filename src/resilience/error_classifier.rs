//! # Error Classification
//!
//! Decides whether a failed attempt is worth retrying.
//!
//! The default is deliberately permissive: failures are retryable unless the
//! operation marked them non-retryable. Cancellations are never retried.
//! Message patterns for known transient faults (network, timeout, service
//! unavailable, server error, connection refused, fetch failed) only refine
//! the reported [`ErrorCategory`]; they cannot override an explicit marker.

use crate::constants::transient_patterns;
use crate::error::{ErrorCode, OperationError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category assigned to a failure for logging and retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Explicit cancel or timeout of the token
    Cancelled,
    Network,
    Timeout,
    ServiceUnavailable,
    Server,
    ConnectionRefused,
    /// Unrecognised failure, retried by default
    Transient,
    /// Domain failure marked non-retryable by the operation
    Permanent,
}

impl ErrorCategory {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Cancelled | Self::Permanent)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::Network => write!(f, "network"),
            Self::Timeout => write!(f, "timeout"),
            Self::ServiceUnavailable => write!(f, "service_unavailable"),
            Self::Server => write!(f, "server"),
            Self::ConnectionRefused => write!(f, "connection_refused"),
            Self::Transient => write!(f, "transient"),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

/// Classify a failure
pub fn classify(error: &OperationError) -> ErrorCategory {
    if error.is_cancelled() {
        return ErrorCategory::Cancelled;
    }
    if !error.is_marked_retryable() {
        return ErrorCategory::Permanent;
    }

    match error.code() {
        Some(ErrorCode::Network) => return ErrorCategory::Network,
        Some(ErrorCode::Timeout) => return ErrorCategory::Timeout,
        Some(ErrorCode::ServiceUnavailable) => return ErrorCategory::ServiceUnavailable,
        Some(ErrorCode::Server) => return ErrorCategory::Server,
        _ => {}
    }

    classify_message(&error.message())
}

/// Default retryability predicate used by [`RetryPolicy`](super::retry::RetryPolicy)
pub fn is_retryable(error: &OperationError) -> bool {
    classify(error).is_retryable()
}

fn classify_message(message: &str) -> ErrorCategory {
    let message = message.to_lowercase();
    let matches_any = |patterns: &[&str]| patterns.iter().any(|p| message.contains(p));

    if matches_any(transient_patterns::CONNECTION_REFUSED) {
        ErrorCategory::ConnectionRefused
    } else if matches_any(transient_patterns::NETWORK) || matches_any(transient_patterns::FETCH_FAILED)
    {
        ErrorCategory::Network
    } else if matches_any(transient_patterns::TIMEOUT) {
        ErrorCategory::Timeout
    } else if matches_any(transient_patterns::SERVICE_UNAVAILABLE) {
        ErrorCategory::ServiceUnavailable
    } else if matches_any(transient_patterns::SERVER) {
        ErrorCategory::Server
    } else {
        ErrorCategory::Transient
    }
}
