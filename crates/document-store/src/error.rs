use thiserror::Error;

use crate::{AggregateId, Version};

/// Errors that can occur when interacting with the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional write found a different version than the writer expected.
    #[error(
        "Concurrency conflict for document {document_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        document_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// An insert targeted an ID that is already taken.
    #[error("Document already exists: {0}")]
    DuplicateDocument(AggregateId),

    /// An update targeted a document that does not exist.
    #[error("Document not found: {0}")]
    DocumentNotFound(AggregateId),

    /// The write batch was rejected before touching storage.
    #[error("Invalid write batch: {0}")]
    InvalidBatch(String),

    /// The backend is temporarily unable to serve the request.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

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
    /// Returns true for infrastructure failures that may succeed when retried.
    ///
    /// Conflicts are not transient: the caller has to re-read before retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(err) => match err {
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
                sqlx::Error::Database(db_err) => {
                    // serialization_failure, deadlock_detected
                    matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Returns true if the error is an optimistic concurrency failure.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::ConcurrencyConflict { .. } | StoreError::DuplicateDocument(_)
        )
    }
}

/// Result type for document store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_is_transient_conflict_is_not() {
        assert!(StoreError::Unavailable("primary stepped down".into()).is_transient());

        let conflict = StoreError::ConcurrencyConflict {
            document_id: AggregateId::new(),
            expected: Version::new(1),
            actual: Version::new(2),
        };
        assert!(!conflict.is_transient());
        assert!(conflict.is_conflict());
    }

    #[test]
    fn pool_timeout_is_transient() {
        assert!(StoreError::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!StoreError::Database(sqlx::Error::RowNotFound).is_transient());
    }
}
