use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::manager::{Lease, LockManager, LockOptions};
use crate::{LockError, Result};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// PostgreSQL-backed lock manager.
///
/// Each held key is a row in `distributed_locks`. A row can be taken over only
/// once its `expires_at` has passed, and deleted only by the holder token that
/// wrote it. Waiting is done by polling.
#[derive(Clone)]
pub struct PostgresLockManager {
    pool: PgPool,
    poll_interval: Duration,
}

impl PostgresLockManager {
    /// Creates a new PostgreSQL lock manager.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets how often a busy key is retried while waiting.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn try_acquire(&self, key: &str, token: Uuid, lease: Duration) -> Result<bool> {
        let holder: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO distributed_locks (lock_key, holder, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (lock_key) DO UPDATE SET
                holder = EXCLUDED.holder,
                expires_at = EXCLUDED.expires_at
            WHERE distributed_locks.expires_at <= NOW()
            RETURNING holder
            "#,
        )
        .bind(key)
        .bind(token)
        .bind(lease.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(holder == Some(token))
    }
}

#[async_trait]
impl LockManager for PostgresLockManager {
    async fn acquire(&self, key: &str, options: LockOptions) -> Result<Lease> {
        let deadline = Instant::now() + options.wait;
        let lease = Lease::new(key, options.lease);

        loop {
            if self.try_acquire(key, lease.token(), options.lease).await? {
                return Ok(lease);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(LockError::Unavailable {
                    key: key.to_string(),
                    waited: options.wait,
                });
            }

            debug!(key, "Lock busy, retrying");
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn release(&self, lease: &Lease) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM distributed_locks WHERE lock_key = $1 AND holder = $2")
                .bind(lease.key())
                .bind(lease.token())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }
}
