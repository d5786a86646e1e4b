use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    CorrelationId, InstanceQuery, InstanceRecord, InstanceStoreError, Result, Version,
    store::InstanceStore,
};

/// In-memory instance store implementation for testing.
///
/// This implementation keeps all records in memory and provides
/// the same guarantees as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryInstanceStore {
    instances: Arc<RwLock<HashMap<CorrelationId, InstanceRecord>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryInstanceStore {
    /// Creates a new empty in-memory instance store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of instances stored.
    pub async fn len(&self) -> usize {
        self.instances.read().await.len()
    }

    /// Returns true if no instance has been stored.
    pub async fn is_empty(&self) -> bool {
        self.instances.read().await.is_empty()
    }

    /// Makes every subsequent operation fail with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(InstanceStoreError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl InstanceStore for InMemoryInstanceStore {
    async fn find_by_id(&self, correlation_id: CorrelationId) -> Result<Option<InstanceRecord>> {
        self.check_available()?;
        let store = self.instances.read().await;
        Ok(store.get(&correlation_id).cloned())
    }

    async fn create_or_get(&self, template: InstanceRecord) -> Result<(InstanceRecord, bool)> {
        self.check_available()?;
        let mut store = self.instances.write().await;

        match store.entry(template.correlation_id) {
            Entry::Occupied(existing) => Ok((existing.get().clone(), false)),
            Entry::Vacant(slot) => {
                let now = Utc::now();
                let record = InstanceRecord {
                    version: Version::first(),
                    created_at: now,
                    updated_at: now,
                    ..template
                };
                slot.insert(record.clone());
                Ok((record, true))
            }
        }
    }

    async fn save(&self, record: &InstanceRecord) -> Result<Version> {
        self.check_available()?;
        let mut store = self.instances.write().await;

        let stored = store
            .get_mut(&record.correlation_id)
            .ok_or(InstanceStoreError::InstanceNotFound(record.correlation_id))?;

        if stored.version != record.version {
            return Err(InstanceStoreError::ConcurrencyConflict {
                correlation_id: record.correlation_id,
                expected: record.version,
                actual: stored.version,
            });
        }

        let new_version = stored.version.next();
        *stored = InstanceRecord {
            version: new_version,
            created_at: stored.created_at,
            updated_at: Utc::now(),
            ..record.clone()
        };

        Ok(new_version)
    }

    async fn query(&self, query: InstanceQuery) -> Result<Vec<InstanceRecord>> {
        self.check_available()?;
        let store = self.instances.read().await;
        let mut records: Vec<_> = store
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();

        // Sort by creation time then id
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.correlation_id.cmp(&b.correlation_id))
        });

        let offset = query.offset.unwrap_or(0);
        let records = records.into_iter().skip(offset);
        let records = match query.limit {
            Some(limit) => records.take(limit).collect(),
            None => records.collect(),
        };

        Ok(records)
    }

    async fn count(&self, saga_type: &str) -> Result<usize> {
        self.check_available()?;
        let store = self.instances.read().await;
        Ok(store.values().filter(|r| r.saga_type == saga_type).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InstanceStoreExt;

    fn template(correlation_id: CorrelationId) -> InstanceRecord {
        InstanceRecord::new(
            correlation_id,
            "TestSaga",
            "Initial",
            serde_json::json!({"count": 0}),
        )
    }

    #[tokio::test]
    async fn create_or_get_creates_once() {
        let store = InMemoryInstanceStore::new();
        let id = CorrelationId::new();

        let (first, created) = store.create_or_get(template(id)).await.unwrap();
        assert!(created);
        assert_eq!(first.version, Version::first());

        let mut other = template(id);
        other.current_state = "Other".to_string();
        let (second, created) = store.create_or_get(other).await.unwrap();
        assert!(!created);
        assert_eq!(second.current_state, "Initial");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn concurrent_create_or_get_creates_single_instance() {
        let store = InMemoryInstanceStore::new();
        let id = CorrelationId::new();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.create_or_get(template(id)).await.unwrap() })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            let (_, was_created) = handle.await.unwrap();
            if was_created {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn save_increments_version() {
        let store = InMemoryInstanceStore::new();
        let id = CorrelationId::new();
        let (mut record, _) = store.create_or_get(template(id)).await.unwrap();

        record.current_state = "Running".to_string();
        record.data = serde_json::json!({"count": 1});
        let version = store.save(&record).await.unwrap();
        assert_eq!(version, Version::new(2));

        let stored = store.get(id).await.unwrap();
        assert_eq!(stored.current_state, "Running");
        assert_eq!(stored.data, serde_json::json!({"count": 1}));
        assert_eq!(stored.version, Version::new(2));
        assert_eq!(stored.created_at, record.created_at);
    }

    #[tokio::test]
    async fn concurrency_conflict_on_stale_version() {
        let store = InMemoryInstanceStore::new();
        let id = CorrelationId::new();
        let (record, _) = store.create_or_get(template(id)).await.unwrap();

        let mut winner = record.clone();
        winner.data = serde_json::json!({"count": 1});
        store.save(&winner).await.unwrap();

        let mut loser = record;
        loser.data = serde_json::json!({"count": 99});
        let result = store.save(&loser).await;

        assert!(matches!(
            result,
            Err(InstanceStoreError::ConcurrencyConflict { expected, actual, .. })
                if expected == Version::first() && actual == Version::new(2)
        ));
        let stored = store.get(id).await.unwrap();
        assert_eq!(stored.data, serde_json::json!({"count": 1}));
    }

    #[tokio::test]
    async fn save_missing_instance_fails() {
        let store = InMemoryInstanceStore::new();
        let record = template(CorrelationId::new());

        let result = store.save(&record).await;
        assert!(matches!(result, Err(InstanceStoreError::InstanceNotFound(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn find_by_id_returns_none_for_unknown() {
        let store = InMemoryInstanceStore::new();
        let found = store.find_by_id(CorrelationId::new()).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn unavailable_store_fails_transiently() {
        let store = InMemoryInstanceStore::new();
        store.set_unavailable(true);

        let err = store.find_by_id(CorrelationId::new()).await.unwrap_err();
        assert!(err.is_transient());

        store.set_unavailable(false);
        assert!(store.find_by_id(CorrelationId::new()).await.is_ok());
    }

    #[tokio::test]
    async fn query_filters_and_pages() {
        let store = InMemoryInstanceStore::new();
        for i in 0..5 {
            let mut record = template(CorrelationId::new());
            if i % 2 == 0 {
                record.current_state = "Available".to_string();
            }
            store.create_or_get(record).await.unwrap();
        }
        let mut other = template(CorrelationId::new());
        other.saga_type = "OtherSaga".to_string();
        store.create_or_get(other).await.unwrap();

        let available = store
            .query(InstanceQuery::for_saga_type("TestSaga").state("Available"))
            .await
            .unwrap();
        assert_eq!(available.len(), 3);

        let paged = store
            .query(InstanceQuery::for_saga_type("TestSaga").offset(1).limit(2))
            .await
            .unwrap();
        assert_eq!(paged.len(), 2);

        assert_eq!(store.count("TestSaga").await.unwrap(), 5);
        assert_eq!(store.count("OtherSaga").await.unwrap(), 1);
    }
}
