//! Notification collaborator for the interaction layer.
//!
//! Executors never render anything themselves. When success or error toasts
//! are enabled they hand a short user-facing message to a [`Notifier`].

use tracing::{info, warn};

/// Receives user-facing notifications from executors
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

/// Default notifier; writes notifications as log records
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn success(&self, message: &str) {
        info!(notification = "success", message = %message, "NOTIFICATION");
    }

    fn error(&self, message: &str) {
        warn!(notification = "error", message = %message, "NOTIFICATION");
    }
}

/// Discards every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn success(&self, _message: &str) {}

    fn error(&self, _message: &str) {}
}
