use thiserror::Error;

use crate::{CorrelationId, Version};

/// Errors that can occur when interacting with the instance store.
#[derive(Debug, Error)]
pub enum InstanceStoreError {
    /// A conditional update lost against a concurrent writer.
    /// The expected version did not match the stored version.
    #[error(
        "Concurrency conflict for instance {correlation_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        correlation_id: CorrelationId,
        expected: Version,
        actual: Version,
    },

    /// The instance was not found in the store.
    #[error("Instance not found: {0}")]
    InstanceNotFound(CorrelationId),

    /// The backing store could not be reached.
    #[error("Instance store unavailable: {0}")]
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

impl InstanceStoreError {
    /// Returns true for infrastructure failures that may succeed on retry.
    ///
    /// Concurrency conflicts are not included: they require a re-fetch
    /// before retrying, not a plain retry.
    pub fn is_transient(&self) -> bool {
        match self {
            InstanceStoreError::Unavailable(_) => true,
            InstanceStoreError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

/// Result type for instance store operations.
pub type Result<T> = std::result::Result<T, InstanceStoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_is_transient() {
        assert!(InstanceStoreError::Unavailable("down".to_string()).is_transient());
        assert!(InstanceStoreError::Database(sqlx::Error::PoolTimedOut).is_transient());
    }

    #[test]
    fn conflict_and_not_found_are_not_transient() {
        let id = CorrelationId::new();
        let conflict = InstanceStoreError::ConcurrencyConflict {
            correlation_id: id,
            expected: Version::first(),
            actual: Version::new(2),
        };
        assert!(!conflict.is_transient());
        assert!(!InstanceStoreError::InstanceNotFound(id).is_transient());
        assert!(!InstanceStoreError::Database(sqlx::Error::RowNotFound).is_transient());
    }
}
