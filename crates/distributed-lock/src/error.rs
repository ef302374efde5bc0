use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when acquiring or releasing a lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock stayed held by someone else for the whole wait window.
    #[error("Lock {key} not acquired within {waited:?}")]
    Unavailable { key: String, waited: Duration },

    /// The lease ran out while its holder was still working.
    #[error("Lock {key} lease expired while held")]
    LeaseExpired { key: String },

    /// The lock backend failed.
    #[error("Lock backend error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;
