use thiserror::Error;

/// Errors that can occur when interacting with the shop store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An optimistic version check failed: the record changed since it was loaded.
    #[error("Concurrency conflict for {entity} {id}: expected version {expected}")]
    ConcurrencyConflict {
        entity: &'static str,
        id: String,
        expected: i64,
    },

    /// A uniqueness constraint rejected the write.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// The record to update does not exist.
    #[error("Record not found: {entity} {id}")]
    NotFound { entity: &'static str, id: String },

    /// The store refused the write (used by in-memory fault injection).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be mapped back to a domain type.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true if the write lost an optimistic concurrency race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict { .. })
    }

    /// Returns the violated constraint name, if this is a uniqueness violation.
    pub fn unique_constraint(&self) -> Option<&str> {
        match self {
            StoreError::UniqueViolation { constraint } => Some(constraint),
            _ => None,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
