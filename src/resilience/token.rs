//! # Cancellation/Timeout Token
//!
//! A revocable signal plus elapsed-time tracking. One token is created per
//! execution attempt sequence and threaded explicitly through every
//! suspension point of that sequence.
//!
//! The flag and the async wait are a [`tokio_util::sync::CancellationToken`].
//! On top of it this token records why it was cancelled, owns an optional
//! deadline timer and runs one-shot callbacks.
//!
//! Cancellation is one-way: the first `cancel` wins, later calls are no-ops.
//! Observers registered through [`CancellationToken::observe`] are one-shot
//! and deregister themselves when their [`ObserverGuard`] is dropped.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken as Signal;
use tracing::{debug, warn};
use uuid::Uuid;

/// Why a token was cancelled
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// Caller asked for cancellation, with an optional free-form reason
    Requested(String),
    /// The token's own deadline fired
    Timeout,
    /// A newer execution replaced this one
    Superseded,
    /// The owning executor was reset
    Reset,
    /// The owning executor was dropped mid-flight
    Dropped,
}

impl CancelReason {
    pub fn requested() -> Self {
        Self::Requested("cancelled".to_string())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl Default for CancelReason {
    fn default() -> Self {
        Self::requested()
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested(reason) => write!(f, "{reason}"),
            Self::Timeout => write!(f, "timeout"),
            Self::Superseded => write!(f, "superseded"),
            Self::Reset => write!(f, "reset"),
            Self::Dropped => write!(f, "dropped"),
        }
    }
}

impl From<&str> for CancelReason {
    fn from(reason: &str) -> Self {
        match reason {
            "timeout" => Self::Timeout,
            other => Self::Requested(other.to_string()),
        }
    }
}

impl From<String> for CancelReason {
    fn from(reason: String) -> Self {
        Self::from(reason.as_str())
    }
}

impl From<Option<&str>> for CancelReason {
    fn from(reason: Option<&str>) -> Self {
        reason.map(Self::from).unwrap_or_default()
    }
}

/// One-shot callback invoked with the cancellation reason
pub type CancelCallback = Box<dyn FnOnce(&CancelReason) + Send + 'static>;

#[derive(Default)]
struct Observers {
    next_id: u64,
    entries: HashMap<u64, CancelCallback>,
}

struct TokenInner {
    id: Uuid,
    started_at: Instant,
    deadline: Option<Instant>,
    signal: Signal,
    /// Serialises cancellation; always written before `signal` fires
    reason: Mutex<Option<CancelReason>>,
    observers: Mutex<Observers>,
    on_cancelled: Mutex<Option<CancelCallback>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for TokenInner {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.abort();
        }
    }
}

/// Cooperative cancellation capability with an optional deadline
///
/// Cloning is cheap and every clone observes the same signal.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("id", &self.inner.id)
            .field("cancelled", &self.inner.signal.is_cancelled())
            .field("reason", &*self.inner.reason.lock())
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// Token without a deadline
    pub fn new() -> Self {
        Self::create(None, None)
    }

    /// Token that cancels itself with [`CancelReason::Timeout`] after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::create(Some(timeout), None)
    }

    /// Create a token with an optional deadline and an optional callback that
    /// runs exactly once when the token is cancelled.
    ///
    /// The deadline timer runs on the ambient tokio runtime. Outside a runtime
    /// the deadline is still honoured, but only when the token is next checked.
    pub fn create(timeout: Option<Duration>, on_cancelled: Option<CancelCallback>) -> Self {
        let started_at = Instant::now();
        let deadline = timeout.map(|timeout| started_at + timeout);

        let inner = Arc::new(TokenInner {
            id: Uuid::new_v4(),
            started_at,
            deadline,
            signal: Signal::new(),
            reason: Mutex::new(None),
            observers: Mutex::new(Observers::default()),
            on_cancelled: Mutex::new(on_cancelled),
            timer: Mutex::new(None),
        });

        if let Some(deadline) = deadline {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let weak = Arc::downgrade(&inner);
                    let timer = handle.spawn(async move {
                        tokio::time::sleep_until(deadline).await;
                        if let Some(inner) = weak.upgrade() {
                            CancellationToken { inner }.cancel(CancelReason::Timeout);
                        }
                    });
                    *inner.timer.lock() = Some(timer);
                }
                Err(_) => {
                    warn!(
                        token_id = %inner.id,
                        "No tokio runtime available, deadline will only be checked lazily"
                    );
                }
            }
        }

        Self { inner }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Whether both handles refer to the same underlying token
    pub fn same_as(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_cancelled(&self) -> bool {
        if self.inner.signal.is_cancelled() {
            return true;
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.cancel(CancelReason::Timeout);
                true
            }
            _ => false,
        }
    }

    pub fn reason(&self) -> Option<CancelReason> {
        self.inner.reason.lock().clone()
    }

    pub fn started_at(&self) -> Instant {
        self.inner.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.started_at.elapsed()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Time left before the deadline fires, `None` without a deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Cancel the token. Returns `false` if it was already cancelled.
    pub fn cancel(&self, reason: impl Into<CancelReason>) -> bool {
        let reason = reason.into();
        {
            let mut slot = self.inner.reason.lock();
            if self.inner.signal.is_cancelled() {
                return false;
            }
            *slot = Some(reason.clone());
            self.inner.signal.cancel();
        }

        self.disarm();

        let observers = std::mem::take(&mut self.inner.observers.lock().entries);
        let on_cancelled = self.inner.on_cancelled.lock().take();

        debug!(
            token_id = %self.inner.id,
            reason = %reason,
            observers = observers.len(),
            elapsed_ms = self.elapsed().as_millis() as u64,
            "Token cancelled"
        );

        for (_, observer) in observers {
            observer(&reason);
        }
        if let Some(callback) = on_cancelled {
            callback(&reason);
        }
        true
    }

    /// Stop the deadline timer without cancelling the token
    pub fn disarm(&self) {
        if let Some(timer) = self.inner.timer.lock().take() {
            timer.abort();
        }
    }

    /// Register a one-shot observer. Returns `None` when the token is already
    /// cancelled; the observer is dropped uncalled in that case.
    pub fn observe<F>(&self, observer: F) -> Option<ObserverGuard>
    where
        F: FnOnce(&CancelReason) + Send + 'static,
    {
        if self.is_cancelled() {
            return None;
        }

        let mut observers = self.inner.observers.lock();
        if self.inner.signal.is_cancelled() {
            return None;
        }
        let id = observers.next_id;
        observers.next_id += 1;
        observers.entries.insert(id, Box::new(observer));

        Some(ObserverGuard {
            token: Arc::downgrade(&self.inner),
            id,
        })
    }

    /// Number of observers currently registered
    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().entries.len()
    }

    /// Resolves once the token is cancelled, yielding the reason
    pub async fn cancelled(&self) -> CancelReason {
        if !self.is_cancelled() {
            self.inner.signal.cancelled().await;
        }
        self.reason().unwrap_or_default()
    }

    /// Child signal for I/O primitives that take a `tokio_util` token.
    ///
    /// It fires when this token is cancelled. Cancelling the child does not
    /// cancel this token.
    pub fn child_signal(&self) -> Signal {
        self.inner.signal.child_token()
    }
}

/// Deregisters its observer when dropped
#[must_use = "dropping the guard deregisters the observer immediately"]
pub struct ObserverGuard {
    token: Weak<TokenInner>,
    id: u64,
}

impl fmt::Debug for ObserverGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverGuard").field("id", &self.id).finish()
    }
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.token.upgrade() {
            inner.observers.lock().entries.remove(&self.id);
        }
    }
}
