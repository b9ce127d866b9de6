//! Cache wrapper behaviour: staleness windows, shared stores and
//! invalidation.

mod common;

use common::{quiet_options, CallCounter};
use resilient_ops::{
    CacheOptions, CacheStore, CachedExecutor, CancellationToken, OperationError,
    OperationExecutor,
};
use std::time::Duration;

fn counting_executor(calls: CallCounter) -> OperationExecutor<(), String> {
    OperationExecutor::with_options(
        move |_token: CancellationToken, _attempt, _: ()| {
            let call = calls.hit();
            async move { Ok(format!("questions v{call}")) }
        },
        quiet_options(),
    )
    .expect("valid options")
}

fn windows() -> CacheOptions {
    CacheOptions::new(Duration::from_millis(300_000), Duration::from_millis(60_000))
}

#[tokio::test(start_paused = true)]
async fn test_staleness_window() {
    let calls = CallCounter::new();
    let cached = CachedExecutor::new("questions", counting_executor(calls.clone()), CacheStore::new(), windows())
        .expect("valid options");

    assert_eq!(cached.execute(()).await.as_deref(), Some("questions v1"));
    assert_eq!(calls.count(), 1);

    tokio::time::advance(Duration::from_millis(59_999)).await;
    assert_eq!(cached.execute(()).await.as_deref(), Some("questions v1"));
    assert_eq!(calls.count(), 1);
    assert!(!cached.is_stale());
    assert!(!cached.get_cached_data("questions").expect("entry").is_stale);

    tokio::time::advance(Duration::from_millis(2)).await;
    assert_eq!(cached.execute(()).await.as_deref(), Some("questions v1"));
    assert_eq!(calls.count(), 1);
    assert!(cached.is_stale());
    assert!(cached.get_cached_data("questions").expect("entry").is_stale);

    tokio::time::advance(Duration::from_millis(240_000)).await;
    assert!(!cached.is_cached());
    assert_eq!(cached.execute(()).await.as_deref(), Some("questions v2"));
    assert_eq!(calls.count(), 2);
    assert!(!cached.is_stale());
}

#[tokio::test]
async fn test_executors_share_an_explicit_store() {
    let store = CacheStore::new();
    let first_calls = CallCounter::new();
    let second_calls = CallCounter::new();

    let first = CachedExecutor::new("audio", counting_executor(first_calls.clone()), store.clone(), windows())
        .expect("valid options");
    let second = CachedExecutor::new("audio", counting_executor(second_calls.clone()), store.clone(), windows())
        .expect("valid options");

    assert_eq!(first.execute(()).await.as_deref(), Some("questions v1"));
    assert_eq!(second.execute(()).await.as_deref(), Some("questions v1"));
    assert_eq!(second_calls.count(), 0);

    second.invalidate_cache("audio");
    assert!(!first.is_cached());
}

#[tokio::test]
async fn test_isolated_stores_do_not_leak() {
    let calls = CallCounter::new();
    let first = CachedExecutor::new("k", counting_executor(calls.clone()), CacheStore::new(), windows())
        .expect("valid options");
    let second = CachedExecutor::new("k", counting_executor(calls.clone()), CacheStore::new(), windows())
        .expect("valid options");

    first.execute(()).await;
    second.execute(()).await;
    assert_eq!(calls.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_after_expiry_returns_none() {
    let calls = CallCounter::new();
    let executor = OperationExecutor::with_options(
        {
            let calls = calls.clone();
            move |_token: CancellationToken, _attempt, _: ()| {
                let call = calls.hit();
                async move {
                    if call == 1 {
                        Ok("report".to_string())
                    } else {
                        Err(OperationError::new("validation failed").non_retryable())
                    }
                }
            }
        },
        quiet_options(),
    )
    .expect("valid options");
    let cached = CachedExecutor::new("report", executor, CacheStore::new(), windows())
        .expect("valid options");

    assert_eq!(cached.execute(()).await.as_deref(), Some("report"));
    tokio::time::advance(Duration::from_millis(300_001)).await;

    assert_eq!(cached.execute(()).await, None);
    assert!(cached.executor().is_error());
    assert!(cached.get_cached_data("report").is_none());
    assert_eq!(calls.count(), 2);
}

#[test]
fn test_inverted_windows_are_rejected() {
    let result = CachedExecutor::new(
        "k",
        counting_executor(CallCounter::new()),
        CacheStore::new(),
        CacheOptions::new(Duration::from_secs(1), Duration::from_secs(2)),
    );
    assert!(result.is_err());
}
