//! Named, leased locks.
//!
//! A lock is identified by a string key. Acquisition waits at most
//! [`LockOptions::wait`]; a granted [`Lease`] expires on its own after
//! [`LockOptions::lease`] so a crashed holder cannot block a key forever.

pub mod error;
pub mod manager;
pub mod memory;
pub mod postgres;

pub use error::{LockError, Result};
pub use manager::{Lease, LockManager, LockOptions, with_lock};
pub use memory::InMemoryLockManager;
pub use postgres::PostgresLockManager;
