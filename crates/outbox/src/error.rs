//! Relay error types.

use thiserror::Error;

/// A downstream delivery failed. The relay records it and retries later.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("Downstream unavailable: {0}")]
    Unavailable(String),

    #[error("Downstream rejected event: {0}")]
    Rejected(String),
}

/// Errors that abort a relay pass.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Outbox store error: {0}")]
    Store(#[from] store::StoreError),
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
