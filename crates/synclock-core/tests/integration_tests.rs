//! Synclock Core Integration Tests

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;

use synclock_core::{
    Error,
    config::Config,
    domain::events::InMemoryEventStore,
    domain::locking::{
        AcquireReason, AcquireRequest, InMemoryLockStore, LockCoordinator, LockError, LockResult,
        LockStore, ReleasePolicy, RequestContext, RetryPolicy,
    },
};

const TASK: &str = "quota_sync";

fn coordinator(store: Arc<InMemoryLockStore>, retries: u32, interval: Duration) -> LockCoordinator {
    LockCoordinator::new(store, RetryPolicy::new(retries, interval))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_engines_single_winner() {
    let store = Arc::new(InMemoryLockStore::new());
    let coordinator = coordinator(store.clone(), 0, Duration::ZERO);

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                let holder = format!("engine-{}", i);
                let outcome = coordinator
                    .acquire_lock(&RequestContext::new(), &AcquireRequest::new(&holder, TASK))
                    .await
                    .unwrap();
                (holder, outcome.acquired)
            })
        })
        .collect();

    let results: Vec<(String, bool)> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let winners: Vec<&String> = results.iter().filter(|(_, won)| *won).map(|(h, _)| h).collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(store.holder(TASK).await.as_ref(), Some(winners[0]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_forced_engines_single_winner_when_steal_needs_stale_lock() {
    let store = Arc::new(InMemoryLockStore::new().with_min_steal_age(Duration::from_secs(3600)));
    let coordinator = coordinator(store.clone(), 1, Duration::ZERO);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                let request = AcquireRequest::new(format!("engine-{}", i), TASK).forced(true);
                coordinator
                    .acquire_lock(&RequestContext::new(), &request)
                    .await
                    .unwrap()
            })
        })
        .collect();

    let outcomes: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(outcomes.iter().filter(|o| o.acquired).count(), 1);
    assert!(
        outcomes
            .iter()
            .filter(|o| !o.acquired)
            .all(|o| o.reason == AcquireReason::StealRejected)
    );
}

#[tokio::test]
async fn test_stale_holder_recovery_by_steal() {
    let store = Arc::new(InMemoryLockStore::new());
    let coordinator = coordinator(store.clone(), 2, Duration::ZERO);
    let ctx = RequestContext::new();

    // engine-1 takes the lock and then "dies" without releasing
    let first = coordinator
        .acquire_lock(&ctx, &AcquireRequest::new("engine-1", TASK))
        .await
        .unwrap();
    assert_eq!(first.reason, AcquireReason::Acquired);

    let blocked = coordinator
        .acquire_lock(&ctx, &AcquireRequest::new("engine-2", TASK))
        .await
        .unwrap();
    assert_eq!(blocked.reason, AcquireReason::Contended);
    assert_eq!(blocked.acquire_attempts, 3);

    let taken = coordinator
        .acquire_lock(&ctx, &AcquireRequest::new("engine-2", TASK).forced(true))
        .await
        .unwrap();
    assert_eq!(taken.reason, AcquireReason::Stolen);
    assert_eq!(store.holder(TASK).await.as_deref(), Some("engine-2"));

    // The former holder cannot release the lock out from under engine-2
    assert!(!coordinator.release_lock(&ctx, "engine-1", TASK).await.unwrap());
    assert_eq!(store.holder(TASK).await.as_deref(), Some("engine-2"));

    assert!(coordinator.release_lock(&ctx, "engine-2", TASK).await.unwrap());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_key_only_release_matches_legacy_behaviour() {
    let store = Arc::new(InMemoryLockStore::new().with_release_policy(ReleasePolicy::KeyOnly));
    let coordinator = coordinator(store.clone(), 0, Duration::ZERO);
    let ctx = RequestContext::new();

    coordinator
        .acquire_lock(&ctx, &AcquireRequest::new("engine-1", TASK))
        .await
        .unwrap();

    assert!(coordinator.release_lock(&ctx, "engine-2", TASK).await.unwrap());
    assert!(store.holder(TASK).await.is_none());
}

#[tokio::test]
async fn test_release_when_unheld_is_idempotent() {
    let store = Arc::new(InMemoryLockStore::new());
    let coordinator = coordinator(store.clone(), 0, Duration::ZERO);
    let ctx = RequestContext::new();

    coordinator
        .acquire_lock(&ctx, &AcquireRequest::new("engine-1", "usage_audit"))
        .await
        .unwrap();

    assert!(!coordinator.release_lock(&ctx, "engine-1", TASK).await.unwrap());
    assert!(!coordinator.release_lock(&ctx, "engine-1", TASK).await.unwrap());
    assert_eq!(store.holder("usage_audit").await.as_deref(), Some("engine-1"));
}

#[tokio::test(start_paused = true)]
async fn test_waiting_engine_acquires_after_release() {
    let store = Arc::new(InMemoryLockStore::new());
    let coordinator = coordinator(store.clone(), 3, Duration::from_secs(10));

    coordinator
        .acquire_lock(&RequestContext::new(), &AcquireRequest::new("engine-1", TASK))
        .await
        .unwrap();

    let releaser = coordinator.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(15)).await;
        releaser
            .release_lock(&RequestContext::new(), "engine-1", TASK)
            .await
            .unwrap();
    });

    let outcome = coordinator
        .acquire_lock(&RequestContext::new(), &AcquireRequest::new("engine-2", TASK))
        .await
        .unwrap();

    assert_eq!(outcome.reason, AcquireReason::AcquiredOnRetry);
    assert_eq!(outcome.acquire_attempts, 3);
    assert_eq!(store.holder(TASK).await.as_deref(), Some("engine-2"));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_pending_acquire() {
    let store = Arc::new(InMemoryLockStore::new());
    let coordinator = coordinator(store.clone(), 10, Duration::from_secs(10));
    let events = Arc::new(InMemoryEventStore::new());
    let coordinator = coordinator.with_publisher(events.clone());

    coordinator
        .acquire_lock(&RequestContext::new(), &AcquireRequest::new("engine-1", TASK))
        .await
        .unwrap();

    let shutdown = CancellationToken::new();
    let ctx = RequestContext::child_of(&shutdown);
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(25)).await;
        trigger.cancel();
    });

    let outcome = coordinator
        .acquire_lock(&ctx, &AcquireRequest::new("engine-2", TASK).forced(true))
        .await
        .unwrap();

    assert_eq!(outcome.reason, AcquireReason::Cancelled);
    assert_eq!(outcome.acquire_attempts, 3);
    assert!(!outcome.steal_attempted);
    assert_eq!(store.holder(TASK).await.as_deref(), Some("engine-1"));
    assert_eq!(events.events_by_type("acquire_cancelled").len(), 1);
}

/// Store whose backend is down
struct UnreachableStore;

#[async_trait]
impl LockStore for UnreachableStore {
    async fn acquire(&self, _: &RequestContext, _: &str, _: &str) -> LockResult<bool> {
        Err(LockError::StoreUnavailable("connection refused".to_string()))
    }

    async fn steal(&self, _: &RequestContext, _: &str, _: &str) -> LockResult<bool> {
        Err(LockError::StoreUnavailable("connection refused".to_string()))
    }

    async fn release(&self, _: &RequestContext, _: &str, _: &str) -> LockResult<bool> {
        Err(LockError::StoreUnavailable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn test_store_outage_is_distinct_from_contention() {
    let coordinator = LockCoordinator::new(Arc::new(UnreachableStore), RetryPolicy::default());
    let ctx = RequestContext::new();

    let err = coordinator
        .acquire_lock(&ctx, &AcquireRequest::new("engine-1", TASK).forced(true))
        .await
        .unwrap_err();
    assert!(err.is_store_failure());

    let err: Error = coordinator
        .release_lock(&ctx, "engine-1", TASK)
        .await
        .unwrap_err()
        .into();
    assert_eq!(err.code(), "E311");
    assert!(err.is_store_failure());
}

#[tokio::test]
async fn test_coordinator_built_from_config() {
    let mut config = Config::default();
    config.set("locks.lock_retry_times", "1").unwrap();
    config.set("locks.lock_retry_interval", "0").unwrap();

    let store = Arc::new(InMemoryLockStore::new());
    let coordinator = LockCoordinator::from_config(store.clone(), &config.locks);
    let ctx = RequestContext::new();

    coordinator
        .acquire_lock(&ctx, &AcquireRequest::new("engine-1", TASK))
        .await
        .unwrap();
    let outcome = coordinator
        .acquire_lock(&ctx, &AcquireRequest::new("engine-2", TASK))
        .await
        .unwrap();

    assert_eq!(outcome.acquire_attempts, 2);
    assert!(!outcome.acquired);
}
