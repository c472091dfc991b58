//! Error types for ledger storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Record identifier.
        id: String,
    },

    /// Record already exists (create raced with another writer).
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// Kind of record.
        entity: &'static str,
        /// Record identifier.
        id: String,
    },

    /// Optimistic concurrency check failed: the row changed since it was read.
    #[error("version conflict: expected {expected}, found {found}")]
    VersionConflict {
        /// Version the writer read.
        expected: u64,
        /// Version currently stored.
        found: u64,
    },
}

impl StoreError {
    /// Whether the operation may succeed if retried against fresh state.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::VersionConflict { .. } | Self::AlreadyExists { .. }
        )
    }
}
