//! Saga states, domain data, and the immutable instance snapshot.

use std::fmt::Debug;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use common::CorrelationId;
use instance_store::{InstanceRecord, Version};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::SagaError;

/// A member of a state machine's finite state set.
///
/// The name is the storage encoding: it is what the instance store keeps,
/// so a name must never be reused for a different state once instances
/// exist in it.
pub trait SagaState: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// Returns the stable name of the state.
    fn name(&self) -> &'static str;

    /// Parses a stored state name.
    fn from_name(name: &str) -> Option<Self>;
}

/// Domain fields carried by a saga instance.
///
/// `Default` provides the fields of a freshly created instance.
pub trait SagaData:
    Clone + Default + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> SagaData for T where
    T: Clone + Default + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// An immutable snapshot of one saga instance.
///
/// Snapshots are never mutated in place. The transition executor is the
/// only place that derives a successor snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SagaInstance<S, D> {
    correlation_id: CorrelationId,
    state: S,
    data: D,
    version: Version,
    created_at: DateTime<Utc>,
}

impl<S: SagaState, D: SagaData> SagaInstance<S, D> {
    /// Creates an unsaved instance in `initial` with default data.
    pub(crate) fn new(correlation_id: CorrelationId, initial: S) -> Self {
        Self {
            correlation_id,
            state: initial,
            data: D::default(),
            version: Version::initial(),
            created_at: Utc::now(),
        }
    }

    /// Rebuilds a snapshot from a stored record.
    pub fn from_record(saga_type: &str, record: &InstanceRecord) -> Result<Self, SagaError> {
        let corrupt = |reason: String| SagaError::CorruptInstance {
            correlation_id: record.correlation_id,
            reason,
        };

        if record.saga_type != saga_type {
            return Err(corrupt(format!(
                "record belongs to saga type '{}', expected '{}'",
                record.saga_type, saga_type
            )));
        }

        let state = S::from_name(&record.current_state)
            .ok_or_else(|| corrupt(format!("unknown state '{}'", record.current_state)))?;
        let data = serde_json::from_value(record.data.clone())
            .map_err(|e| corrupt(format!("undecodable data: {e}")))?;

        Ok(Self {
            correlation_id: record.correlation_id,
            state,
            data,
            version: record.version,
            created_at: record.created_at,
        })
    }

    /// Converts the snapshot into a record for the store.
    ///
    /// The record carries the version the snapshot was read at, which is
    /// the version a conditional save expects to find.
    pub fn to_record(&self, saga_type: &str) -> Result<InstanceRecord, SagaError> {
        Ok(InstanceRecord {
            correlation_id: self.correlation_id,
            saga_type: saga_type.to_string(),
            current_state: self.state.name().to_string(),
            data: serde_json::to_value(&self.data)?,
            version: self.version,
            created_at: self.created_at,
            updated_at: Utc::now(),
        })
    }

    /// Derives the successor snapshot, still at the predecessor's version.
    pub(crate) fn succeed(&self, state: S, data: D) -> Self {
        Self {
            correlation_id: self.correlation_id,
            state,
            data,
            version: self.version,
            created_at: self.created_at,
        }
    }

    pub(crate) fn committed_at(self, version: Version) -> Self {
        Self { version, ..self }
    }
}

// Query methods
impl<S: SagaState, D: SagaData> SagaInstance<S, D> {
    /// Returns the correlation id.
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Returns the current state.
    pub fn state(&self) -> S {
        self.state
    }

    /// Returns the domain fields.
    pub fn data(&self) -> &D {
        &self.data
    }

    /// Returns the stored version this snapshot reflects.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns when the instance was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
