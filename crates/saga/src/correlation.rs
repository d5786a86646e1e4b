//! Maps inbound events to the correlation id of the instance they target.

use std::collections::HashMap;
use std::str::FromStr;

use common::CorrelationId;

use crate::definition::StateMachineDefinition;
use crate::error::SagaError;
use crate::event::InboundEvent;
use crate::state::{SagaData, SagaState};

/// Accepted shapes of a correlation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorrelationKeyFormat {
    /// The key must be a non-nil UUID.
    #[default]
    Uuid,

    /// UUID keys are used as-is; any other non-blank key is mapped to a
    /// name-based identifier.
    NameBased,
}

impl FromStr for CorrelationKeyFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uuid" => Ok(Self::Uuid),
            "name" | "name-based" => Ok(Self::NameBased),
            other => Err(format!("unknown correlation key format '{other}'")),
        }
    }
}

/// Computes correlation ids from events without consulting the store.
///
/// An event type may declare a payload field to correlate by; otherwise
/// the envelope's correlation key is used.
#[derive(Debug, Clone, Default)]
pub struct CorrelationResolver {
    fields: HashMap<String, String>,
    format: CorrelationKeyFormat,
}

impl CorrelationResolver {
    /// Creates a resolver that only reads envelope correlation keys.
    pub fn new(format: CorrelationKeyFormat) -> Self {
        Self {
            fields: HashMap::new(),
            format,
        }
    }

    /// Creates a resolver using the payload fields declared by `definition`.
    pub fn for_definition<S: SagaState, D: SagaData>(
        definition: &StateMachineDefinition<S, D>,
        format: CorrelationKeyFormat,
    ) -> Self {
        let fields = definition
            .event_types()
            .into_iter()
            .filter_map(|event_type| {
                definition
                    .correlation_field(event_type)
                    .map(|field| (event_type.to_string(), field.to_string()))
            })
            .collect();

        Self { fields, format }
    }

    /// Correlates `event_type` by a payload field.
    pub fn with_field(mut self, event_type: impl Into<String>, field: impl Into<String>) -> Self {
        self.fields.insert(event_type.into(), field.into());
        self
    }

    /// Returns the key format in use.
    pub fn format(&self) -> CorrelationKeyFormat {
        self.format
    }

    /// Resolves the correlation id targeted by `event`.
    pub fn resolve(&self, event: &InboundEvent) -> Result<CorrelationId, SagaError> {
        let unresolvable = |reason: String| SagaError::UnresolvableCorrelation {
            event_type: event.event_type.clone(),
            reason,
        };

        let key = match self.fields.get(&event.event_type) {
            Some(field) => match event.payload.get(field) {
                Some(serde_json::Value::String(key)) => key.as_str(),
                Some(other) => {
                    return Err(unresolvable(format!(
                        "payload field '{field}' is not a string: {other}"
                    )));
                }
                None => return Err(unresolvable(format!("payload field '{field}' is missing"))),
            },
            None => event
                .correlation_key
                .as_deref()
                .ok_or_else(|| unresolvable("no correlation key".to_string()))?,
        };

        let key = key.trim();
        if key.is_empty() {
            return Err(unresolvable("correlation key is blank".to_string()));
        }

        match self.format {
            CorrelationKeyFormat::Uuid => {
                CorrelationId::from_str(key).map_err(|e| unresolvable(e.to_string()))
            }
            CorrelationKeyFormat::NameBased => match CorrelationId::from_str(key) {
                Ok(id) => Ok(id),
                Err(_) if uuid::Uuid::parse_str(key).is_ok() => {
                    Err(unresolvable("correlation key is the nil uuid".to_string()))
                }
                Err(_) => Ok(CorrelationId::from_name(key)),
            },
        }
    }
}
