//! Contention tests for the in-process lock manager and `with_lock`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use distributed_lock::{InMemoryLockManager, LockError, LockManager, LockOptions, with_lock};

#[derive(Debug)]
enum TestError {
    Lock(LockError),
    Business(&'static str),
}

impl From<LockError> for TestError {
    fn from(e: LockError) -> Self {
        TestError::Lock(e)
    }
}

fn options() -> LockOptions {
    LockOptions::new(Duration::from_secs(5), Duration::from_secs(10))
}

#[tokio::test]
async fn critical_sections_never_overlap() {
    let locks = Arc::new(InMemoryLockManager::new());
    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let locks = locks.clone();
        let inside = inside.clone();
        let max_inside = max_inside.clone();
        handles.push(tokio::spawn(async move {
            with_lock(locks.as_ref(), "stock:lock:shared", options(), |_| async {
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, TestError>(())
            })
            .await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    assert!(!locks.is_held("stock:lock:shared"));
}

#[tokio::test]
async fn released_after_business_error() {
    let locks = InMemoryLockManager::new();

    let result: Result<(), TestError> = with_lock(&locks, "k", options(), |_| async {
        Err(TestError::Business("insufficient"))
    })
    .await;

    assert!(matches!(result, Err(TestError::Business("insufficient"))));
    assert!(!locks.is_held("k"));
}

#[tokio::test]
async fn released_after_panic() {
    let locks = InMemoryLockManager::new();

    let task = {
        let locks = locks.clone();
        tokio::spawn(async move {
            with_lock(&locks, "k", options(), |_| async {
                if locks.is_held("k") {
                    panic!("boom inside critical section");
                }
                Ok::<_, TestError>(())
            })
            .await
        })
    };

    let join = task.await;
    assert!(join.unwrap_err().is_panic());
    assert!(!locks.is_held("k"));
}

#[tokio::test]
async fn busy_lock_surfaces_as_lock_error() {
    let locks = InMemoryLockManager::new();
    let _lease = locks
        .acquire("k", LockOptions::new(Duration::ZERO, Duration::from_secs(30)))
        .await
        .unwrap();

    let quick = LockOptions::new(Duration::from_millis(20), Duration::from_secs(1));
    let result = with_lock(&locks, "k", quick, |_| async { Ok::<_, TestError>(()) }).await;

    assert!(matches!(
        result,
        Err(TestError::Lock(LockError::Unavailable { .. }))
    ));
}

#[tokio::test(start_paused = true)]
async fn write_after_lease_expiry_is_refused() {
    let locks = InMemoryLockManager::new();
    let short = LockOptions::new(Duration::from_secs(1), Duration::from_millis(100));
    let writes = AtomicUsize::new(0);
    let counter = &writes;

    let result = with_lock(&locks, "k", short, |lease| async move {
        lease.ensure_held()?;
        tokio::time::sleep(Duration::from_millis(150)).await;
        lease.ensure_held()?;
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, TestError>(())
    })
    .await;

    assert!(matches!(
        result,
        Err(TestError::Lock(LockError::LeaseExpired { ref key })) if key == "k"
    ));
    assert_eq!(writes.load(Ordering::SeqCst), 0);
    assert!(!locks.is_held("k"));
}
