//! Error types for the resilient operation controller.
//!
//! Two families live here. [`OperationError`] is what wrapped operations fail
//! with and what executors record in their observable state; it is always
//! data, never thrown out of `execute`. [`ControllerError`] covers contract and
//! configuration violations, the only failures surfaced synchronously.

use crate::resilience::token::CancelReason;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Machine-readable failure codes the interaction layer maps to user text
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Timeout,
    Network,
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    RateLimited,
    ServiceUnavailable,
    Server,
    Internal,
    Other(String),
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Network => write!(f, "network"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::Forbidden => write!(f, "forbidden"),
            Self::NotFound => write!(f, "not_found"),
            Self::Validation => write!(f, "validation"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::ServiceUnavailable => write!(f, "service_unavailable"),
            Self::Server => write!(f, "server"),
            Self::Internal => write!(f, "internal"),
            Self::Other(code) => write!(f, "{code}"),
        }
    }
}

static TIMEOUT_CODE: ErrorCode = ErrorCode::Timeout;

/// Failure of a wrapped operation
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationError {
    /// Explicit cancel, supersession or timeout. Never retried.
    #[error("Operation cancelled: {reason}")]
    Cancelled { reason: CancelReason },

    /// The operation itself failed
    #[error("{message}")]
    Failed {
        message: String,
        code: Option<ErrorCode>,
        retryable: bool,
    },
}

impl OperationError {
    /// A failure that is retryable unless the classifier says otherwise
    pub fn new(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            code: None,
            retryable: true,
        }
    }

    pub fn cancelled(reason: CancelReason) -> Self {
        Self::Cancelled { reason }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(message).with_code(ErrorCode::Internal).non_retryable()
    }

    /// Mark this failure as a domain failure that must not be retried
    pub fn non_retryable(self) -> Self {
        match self {
            Self::Failed { message, code, .. } => Self::Failed {
                message,
                code,
                retryable: false,
            },
            cancelled => cancelled,
        }
    }

    pub fn with_code(self, code: ErrorCode) -> Self {
        match self {
            Self::Failed {
                message, retryable, ..
            } => Self::Failed {
                message,
                code: Some(code),
                retryable,
            },
            cancelled => cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// False only for failures explicitly marked non-retryable and for cancellations
    pub fn is_marked_retryable(&self) -> bool {
        match self {
            Self::Cancelled { .. } => false,
            Self::Failed { retryable, .. } => *retryable,
        }
    }

    pub fn code(&self) -> Option<&ErrorCode> {
        match self {
            Self::Cancelled { reason } if reason.is_timeout() => Some(&TIMEOUT_CODE),
            Self::Cancelled { .. } => None,
            Self::Failed { code, .. } => code.as_ref(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Failed { message, .. } => message.clone(),
            cancelled => cancelled.to_string(),
        }
    }

    /// Text suitable for showing to an end user
    pub fn user_message(&self) -> String {
        match self.code() {
            Some(ErrorCode::Timeout) => "Operation timed out, please retry".to_string(),
            Some(ErrorCode::Network) => "Check your connection".to_string(),
            Some(ErrorCode::Unauthorized) => "Please sign in again".to_string(),
            _ => self.message(),
        }
    }
}

impl From<anyhow::Error> for OperationError {
    fn from(error: anyhow::Error) -> Self {
        OperationError::new(format!("{error:#}"))
    }
}

impl From<std::io::Error> for OperationError {
    fn from(error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let operation_error = OperationError::new(error.to_string());
        match error.kind() {
            ErrorKind::TimedOut => operation_error.with_code(ErrorCode::Timeout),
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected => operation_error.with_code(ErrorCode::Network),
            ErrorKind::NotFound => operation_error
                .with_code(ErrorCode::NotFound)
                .non_retryable(),
            ErrorKind::PermissionDenied => operation_error
                .with_code(ErrorCode::Forbidden)
                .non_retryable(),
            _ => operation_error,
        }
    }
}

/// Contract and configuration violations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControllerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl From<config::ConfigError> for ControllerError {
    fn from(error: config::ConfigError) -> Self {
        ControllerError::ConfigurationError(error.to_string())
    }
}

pub type OperationResult<T> = Result<T, OperationError>;
pub type ControllerResult<T> = Result<T, ControllerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_are_retryable_by_default() {
        let error = OperationError::new("boom");
        assert!(error.is_marked_retryable());
        assert!(!error.clone().non_retryable().is_marked_retryable());
    }

    #[test]
    fn test_cancellation_ignores_builders() {
        let error = OperationError::cancelled(CancelReason::Reset)
            .with_code(ErrorCode::Network)
            .non_retryable();
        assert_eq!(error, OperationError::cancelled(CancelReason::Reset));
        assert!(!error.is_marked_retryable());
    }

    #[test]
    fn test_user_message_mapping() {
        let timeout = OperationError::cancelled(CancelReason::Timeout);
        assert_eq!(timeout.user_message(), "Operation timed out, please retry");

        let network = OperationError::new("socket closed").with_code(ErrorCode::Network);
        assert_eq!(network.user_message(), "Check your connection");

        let auth = OperationError::new("token expired").with_code(ErrorCode::Unauthorized);
        assert_eq!(auth.user_message(), "Please sign in again");

        let other = OperationError::new("quota exceeded").with_code(ErrorCode::RateLimited);
        assert_eq!(other.user_message(), "quota exceeded");
    }

    #[test]
    fn test_io_error_conversion() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let error = OperationError::from(refused);
        assert_eq!(error.code(), Some(&ErrorCode::Network));
        assert!(error.is_marked_retryable());

        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let error = OperationError::from(missing);
        assert_eq!(error.code(), Some(&ErrorCode::NotFound));
        assert!(!error.is_marked_retryable());
    }

    #[test]
    fn test_anyhow_conversion_keeps_context() {
        let error: OperationError = anyhow::anyhow!("inner")
            .context("loading transcript")
            .into();
        assert_eq!(error.message(), "loading transcript: inner");
    }
}
