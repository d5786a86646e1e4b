//! Inbound events as delivered by the transport.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A typed message a state machine can react to.
///
/// `EVENT_TYPE` is the discriminator carried on the wire; it must stay
/// stable for as long as messages of this type can be delivered.
pub trait SagaMessage: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The type discriminator for this message.
    const EVENT_TYPE: &'static str;
}

/// An event received from the transport.
///
/// Events carry no identity of their own: two deliveries with the same
/// type and payload are the same event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// The type discriminator (e.g., "Added").
    pub event_type: String,

    /// The correlation key declared by the transport, if any.
    pub correlation_key: Option<String>,

    /// The message payload as JSON.
    pub payload: serde_json::Value,

    /// When the transport handed the event over.
    pub received_at: DateTime<Utc>,

    /// Transport headers, kept for logging only.
    pub headers: HashMap<String, String>,
}

impl InboundEvent {
    /// Creates an event from a raw type and payload.
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            correlation_key: None,
            payload,
            received_at: Utc::now(),
            headers: HashMap::new(),
        }
    }

    /// Creates an event from a typed message.
    pub fn from_message<M: SagaMessage>(message: &M) -> Result<Self, serde_json::Error> {
        Ok(Self::new(M::EVENT_TYPE, serde_json::to_value(message)?))
    }

    /// Sets the envelope-level correlation key.
    pub fn with_correlation_key(mut self, key: impl Into<String>) -> Self {
        self.correlation_key = Some(key.into());
        self
    }

    /// Sets the time the event was received.
    pub fn received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }

    /// Adds a transport header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}
