//! Saga error types.

use common::CorrelationId;
use instance_store::{InstanceStoreError, Version};
use thiserror::Error;

use crate::definition::DefinitionError;

/// Errors that can occur while handling saga events.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The event's correlation key is missing or malformed.
    #[error("Unresolvable correlation for event '{event_type}': {reason}")]
    UnresolvableCorrelation { event_type: String, reason: String },

    /// The event type is not declared anywhere in the state machine, or
    /// is not applicable in the current state under a rejecting policy.
    #[error("Unhandled event '{event_type}'")]
    UnhandledEvent { event_type: String },

    /// The payload could not be decoded into the declared message type.
    #[error("Malformed payload for event '{event_type}': {source}")]
    MalformedPayload {
        event_type: String,
        source: serde_json::Error,
    },

    /// A concurrent writer committed first.
    #[error(
        "Concurrency conflict for instance {correlation_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        correlation_id: CorrelationId,
        expected: Version,
        actual: Version,
    },

    /// Concurrency conflicts persisted past the retry bound.
    #[error("Retries exhausted for instance {correlation_id} after {attempts} attempts")]
    RetryExhausted {
        correlation_id: CorrelationId,
        attempts: u32,
    },

    /// Transient infrastructure failure of the instance store.
    #[error("Instance store unavailable: {0}")]
    StoreUnavailable(String),

    /// The state machine definition failed validation.
    #[error("Invalid state machine configuration: {0}")]
    ConfigurationInvalid(#[from] DefinitionError),

    /// A stored record cannot be read back as an instance of this machine.
    #[error("Corrupt instance {correlation_id}: {reason}")]
    CorruptInstance {
        correlation_id: CorrelationId,
        reason: String,
    },

    /// Non-transient instance store error.
    #[error("Instance store error: {0}")]
    Store(InstanceStoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SagaError {
    /// Returns true if the transport should redeliver the event later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SagaError::ConcurrencyConflict { .. }
                | SagaError::RetryExhausted { .. }
                | SagaError::StoreUnavailable(_)
        )
    }
}

impl From<InstanceStoreError> for SagaError {
    fn from(e: InstanceStoreError) -> Self {
        match e {
            InstanceStoreError::ConcurrencyConflict {
                correlation_id,
                expected,
                actual,
            } => SagaError::ConcurrencyConflict {
                correlation_id,
                expected,
                actual,
            },
            e if e.is_transient() => SagaError::StoreUnavailable(e.to_string()),
            e => SagaError::Store(e),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
