use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CorrelationId;

/// Version number for a stored instance, used for optimistic concurrency control.
///
/// A freshly created record is at version 1 and every successful save
/// increments the version by 1.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version (0) of a record that has never been written.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the version (1) of a freshly created record.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// The stored document for one saga instance.
///
/// The store treats `current_state` and `data` as opaque; their meaning
/// belongs to the state machine that owns `saga_type`. The state is
/// stored by name so that reordering a state enumeration can never
/// reinterpret existing records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Primary key. Immutable once assigned.
    pub correlation_id: CorrelationId,

    /// The state machine this instance belongs to (e.g., "Book").
    pub saga_type: String,

    /// Name of the current state.
    pub current_state: String,

    /// Domain fields as JSON.
    pub data: serde_json::Value,

    /// Version of the record as last read from, or written to, the store.
    pub version: Version,

    /// When the record was first created.
    pub created_at: DateTime<Utc>,

    /// When the record was last saved.
    pub updated_at: DateTime<Utc>,
}

impl InstanceRecord {
    /// Creates a record that has not been written yet.
    pub fn new(
        correlation_id: CorrelationId,
        saga_type: impl Into<String>,
        current_state: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            correlation_id,
            saga_type: saga_type.into(),
            current_state: current_state.into(),
            data,
            version: Version::initial(),
            created_at: now,
            updated_at: now,
        }
    }
}
