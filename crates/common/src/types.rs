use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Namespace for name-based correlation identifiers.
///
/// Changing this value changes every identifier derived by
/// [`CorrelationId::from_name`], orphaning instances already stored under them.
const CORRELATION_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2d8e_4b3a_5e7f_9a0b_1c2d_3e4f_5a6b);

/// Unique identifier for a saga instance.
///
/// Wraps a UUID to provide type safety and prevent mixing up
/// correlation IDs with other UUID-based identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Creates a new random correlation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a correlation ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Derives a correlation ID from an opaque business key.
    ///
    /// The same name always yields the same identifier.
    pub fn from_name(name: &str) -> Self {
        Self(Uuid::new_v5(&CORRELATION_NAMESPACE, name.as_bytes()))
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Returns true for the all-zero UUID, which never identifies an instance.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CorrelationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<CorrelationId> for Uuid {
    fn from(id: CorrelationId) -> Self {
        id.0
    }
}

/// Error returned when a string is not a valid correlation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid correlation id '{input}': {reason}")]
pub struct InvalidCorrelationId {
    pub input: String,
    pub reason: String,
}

impl FromStr for CorrelationId {
    type Err = InvalidCorrelationId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::parse_str(s.trim()).map_err(|e| InvalidCorrelationId {
            input: s.to_string(),
            reason: e.to_string(),
        })?;
        if uuid.is_nil() {
            return Err(InvalidCorrelationId {
                input: s.to_string(),
                reason: "nil uuid".to_string(),
            });
        }
        Ok(Self(uuid))
    }
}
