use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::time::Instant as LeaseClock;
use tracing::warn;
use uuid::Uuid;

use crate::{LockError, Result};

/// How long to wait for a lock and how long to hold it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Maximum time to wait for the lock.
    pub wait: Duration,

    /// Time after which a granted lease expires on its own.
    pub lease: Duration,
}

impl LockOptions {
    pub fn new(wait: Duration, lease: Duration) -> Self {
        Self { wait, lease }
    }
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(3),
            lease: Duration::from_secs(10),
        }
    }
}

/// A granted lock.
///
/// The token identifies this grant; only a release carrying the same token
/// frees the key. The local deadline is counted from when the lease value was
/// created, which is never earlier than the backend's grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    key: String,
    token: Uuid,
    lease: Duration,
    expires_at: LeaseClock,
}

impl Lease {
    pub fn new(key: impl Into<String>, lease: Duration) -> Self {
        Self {
            key: key.into(),
            token: Uuid::new_v4(),
            lease,
            expires_at: LeaseClock::now() + lease,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> Uuid {
        self.token
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    pub fn is_expired(&self) -> bool {
        LeaseClock::now() >= self.expires_at
    }

    /// Fails with [`LockError::LeaseExpired`] once the lease has run out.
    ///
    /// Call before a write that must only happen under the lock.
    pub fn ensure_held(&self) -> Result<()> {
        if self.is_expired() {
            return Err(LockError::LeaseExpired {
                key: self.key.clone(),
            });
        }
        Ok(())
    }
}

/// Core trait for lock backends.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Acquires `key`, waiting up to `options.wait`.
    ///
    /// Fails with [`LockError::Unavailable`] if the key is still held when the
    /// wait runs out. An expired lease counts as free.
    async fn acquire(&self, key: &str, options: LockOptions) -> Result<Lease>;

    /// Releases a lease.
    ///
    /// Returns `false` without touching the key when `lease` is no longer the
    /// current holder, e.g. because it expired and was taken over.
    async fn release(&self, lease: &Lease) -> Result<bool>;
}

/// Runs `action` while holding `key`.
///
/// `action` receives a copy of the lease to check with [`Lease::ensure_held`]
/// before writing. The lease is released on every exit path: success, error, or a panic inside
/// `action` (which is resumed after the release). A failed release is logged
/// and does not replace the action's result.
pub async fn with_lock<M, F, Fut, T, E>(
    manager: &M,
    key: &str,
    options: LockOptions,
    action: F,
) -> std::result::Result<T, E>
where
    M: LockManager + ?Sized,
    F: FnOnce(Lease) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: From<LockError>,
{
    let started = Instant::now();
    let lease = manager.acquire(key, options).await?;
    metrics::histogram!("lock_wait_seconds").record(started.elapsed().as_secs_f64());

    let outcome = AssertUnwindSafe(action(lease.clone()))
        .catch_unwind()
        .await;

    match manager.release(&lease).await {
        Ok(true) => {}
        Ok(false) => warn!(key, "Lock lease expired before release"),
        Err(e) => warn!(key, error = %e, "Failed to release lock"),
    }

    match outcome {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
