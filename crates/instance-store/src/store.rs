use async_trait::async_trait;

use crate::{CorrelationId, InstanceQuery, InstanceRecord, InstanceStoreError, Result, Version};

/// Core trait for instance store implementations.
///
/// An instance store holds exactly one record per correlation id.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Retrieves an instance by correlation id.
    ///
    /// Returns None if no instance exists.
    async fn find_by_id(&self, correlation_id: CorrelationId) -> Result<Option<InstanceRecord>>;

    /// Returns the stored instance for `template.correlation_id`, creating it
    /// from `template` if absent.
    ///
    /// Atomic with respect to concurrent callers: only one record is ever
    /// created per correlation id. The boolean is true if this call created it.
    /// A created record is stored at [`Version::first`].
    async fn create_or_get(&self, template: InstanceRecord) -> Result<(InstanceRecord, bool)>;

    /// Replaces the stored record.
    ///
    /// Succeeds only if the stored version equals `record.version`; otherwise
    /// fails with `ConcurrencyConflict` and nothing is written.
    ///
    /// Returns the new version of the record.
    async fn save(&self, record: &InstanceRecord) -> Result<Version>;

    /// Retrieves instances matching a query, oldest first.
    async fn query(&self, query: InstanceQuery) -> Result<Vec<InstanceRecord>>;

    /// Counts instances of a saga type.
    async fn count(&self, saga_type: &str) -> Result<usize>;
}

/// Extension trait providing convenience methods for instance stores.
#[async_trait]
pub trait InstanceStoreExt: InstanceStore {
    /// Retrieves an instance, failing with `InstanceNotFound` if absent.
    async fn get(&self, correlation_id: CorrelationId) -> Result<InstanceRecord> {
        self.find_by_id(correlation_id)
            .await?
            .ok_or(InstanceStoreError::InstanceNotFound(correlation_id))
    }

    /// Checks if an instance exists.
    async fn exists(&self, correlation_id: CorrelationId) -> Result<bool> {
        Ok(self.find_by_id(correlation_id).await?.is_some())
    }
}

// Blanket implementation for all InstanceStore implementations
impl<T: InstanceStore + ?Sized> InstanceStoreExt for T {}
