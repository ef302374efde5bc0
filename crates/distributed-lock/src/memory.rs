use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use crate::manager::{Lease, LockManager, LockOptions};
use crate::{LockError, Result};

#[derive(Debug)]
struct Held {
    token: Uuid,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    held: Mutex<HashMap<String, Held>>,
    released: Notify,
}

/// In-process lock manager.
///
/// Waiters are woken when a key is released and when the current lease
/// expires, whichever comes first.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLockManager {
    inner: Arc<Inner>,
}

impl InMemoryLockManager {
    /// Creates a new lock manager with no held keys.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `key` is held by an unexpired lease.
    pub fn is_held(&self, key: &str) -> bool {
        self.table()
            .get(key)
            .is_some_and(|held| held.expires_at > Instant::now())
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Held>> {
        self.inner.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LockManager for InMemoryLockManager {
    async fn acquire(&self, key: &str, options: LockOptions) -> Result<Lease> {
        let deadline = Instant::now() + options.wait;

        loop {
            // Register interest before checking, so a release between the
            // check and the wait is not missed.
            let notified = self.inner.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let busy_until = {
                let mut table = self.table();
                let now = Instant::now();
                match table.get(key) {
                    Some(held) if held.expires_at > now => held.expires_at,
                    _ => {
                        let lease = Lease::new(key, options.lease);
                        table.insert(
                            key.to_string(),
                            Held {
                                token: lease.token(),
                                expires_at: now + options.lease,
                            },
                        );
                        return Ok(lease);
                    }
                }
            };

            if Instant::now() >= deadline {
                return Err(LockError::Unavailable {
                    key: key.to_string(),
                    waited: options.wait,
                });
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(busy_until.min(deadline)) => {}
            }
        }
    }

    async fn release(&self, lease: &Lease) -> Result<bool> {
        let released = {
            let mut table = self.table();
            match table.get(lease.key()) {
                Some(held) if held.token == lease.token() => {
                    table.remove(lease.key());
                    true
                }
                _ => false,
            }
        };

        if released {
            self.inner.released.notify_waiters();
        }
        Ok(released)
    }
}
