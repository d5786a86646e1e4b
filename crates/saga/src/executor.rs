//! Applies transition rules to saga instances and commits the result.

use std::str::FromStr;
use std::sync::Arc;

use common::CorrelationId;
use instance_store::InstanceStore;

use crate::definition::StateMachineDefinition;
use crate::error::{Result, SagaError};
use crate::event::InboundEvent;
use crate::state::{SagaData, SagaInstance, SagaState};

/// What to do with a declared event that has no rule in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotApplicablePolicy {
    /// Treat the event as a no-op for this state.
    #[default]
    Ignore,

    /// Fail with `UnhandledEvent`.
    Reject,
}

impl FromStr for NotApplicablePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown not-applicable policy '{other}'")),
        }
    }
}

/// The pure result of matching an event against an instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation<S, D> {
    /// No rule applies; nothing to write.
    Ignored,

    /// A rule applied but produced an identical snapshot; nothing to write.
    Unchanged,

    /// A rule applied; `next` must be committed.
    Advance {
        next: SagaInstance<S, D>,
        from: S,
        to: S,
    },
}

/// The result of applying an event to an instance.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome<S, D> {
    /// The successor snapshot was committed to the store.
    Committed {
        instance: SagaInstance<S, D>,
        from: S,
        to: S,
    },

    /// A rule applied but the instance already reflected it.
    Unchanged(SagaInstance<S, D>),

    /// No rule applied in the instance's current state.
    Ignored(SagaInstance<S, D>),
}

impl<S, D> TransitionOutcome<S, D> {
    /// Returns the instance as it stands after the outcome.
    pub fn instance(&self) -> &SagaInstance<S, D> {
        match self {
            TransitionOutcome::Committed { instance, .. }
            | TransitionOutcome::Unchanged(instance)
            | TransitionOutcome::Ignored(instance) => instance,
        }
    }

    /// Consumes the outcome, returning the instance.
    pub fn into_instance(self) -> SagaInstance<S, D> {
        match self {
            TransitionOutcome::Committed { instance, .. }
            | TransitionOutcome::Unchanged(instance)
            | TransitionOutcome::Ignored(instance) => instance,
        }
    }

    /// Returns a short label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionOutcome::Committed { .. } => "committed",
            TransitionOutcome::Unchanged(_) => "unchanged",
            TransitionOutcome::Ignored(_) => "ignored",
        }
    }
}

/// Looks up rules, runs their activities, and saves the successor snapshot.
///
/// Nothing reaches the store until the rule match and every activity have
/// succeeded, so abandoning `apply` before the save leaves no trace.
pub struct TransitionExecutor<St, S, D> {
    definition: Arc<StateMachineDefinition<S, D>>,
    store: St,
    policy: NotApplicablePolicy,
}

impl<St, S, D> TransitionExecutor<St, S, D>
where
    St: InstanceStore,
    S: SagaState,
    D: SagaData,
{
    /// Creates an executor that ignores not-applicable events.
    pub fn new(definition: Arc<StateMachineDefinition<S, D>>, store: St) -> Self {
        Self {
            definition,
            store,
            policy: NotApplicablePolicy::default(),
        }
    }

    /// Sets the not-applicable policy.
    pub fn with_policy(mut self, policy: NotApplicablePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the state machine definition.
    pub fn definition(&self) -> &StateMachineDefinition<S, D> {
        &self.definition
    }

    /// Returns a reference to the underlying instance store.
    pub fn store(&self) -> &St {
        &self.store
    }

    /// Loads an instance, returning None if it doesn't exist.
    pub async fn find(&self, correlation_id: CorrelationId) -> Result<Option<SagaInstance<S, D>>> {
        self.store
            .find_by_id(correlation_id)
            .await?
            .map(|record| self.decode(&record))
            .transpose()
    }

    /// Loads an instance, creating it in the initial state if absent.
    pub async fn load_or_create(&self, correlation_id: CorrelationId) -> Result<SagaInstance<S, D>> {
        let template = SagaInstance::<S, D>::new(correlation_id, self.definition.initial_state())
            .to_record(self.definition.saga_type())?;

        let (record, created) = self.store.create_or_get(template).await?;
        if created {
            tracing::debug!(
                %correlation_id,
                saga_type = self.definition.saga_type(),
                "saga instance created"
            );
        }

        self.decode(&record)
    }

    /// Matches `event` against `instance` without touching the store.
    pub fn evaluate(
        &self,
        instance: &SagaInstance<S, D>,
        event: &InboundEvent,
    ) -> Result<Evaluation<S, D>> {
        let event_type = event.event_type.as_str();
        if !self.definition.is_declared_event(event_type) {
            return Err(SagaError::UnhandledEvent {
                event_type: event_type.to_string(),
            });
        }

        let from = instance.state();
        if self.definition.is_final(from) {
            return Ok(Evaluation::Ignored);
        }

        let Some(rule) = self.definition.rule(from, event_type) else {
            return match self.policy {
                NotApplicablePolicy::Ignore => Ok(Evaluation::Ignored),
                NotApplicablePolicy::Reject => Err(SagaError::UnhandledEvent {
                    event_type: event_type.to_string(),
                }),
            };
        };

        let data = rule
            .run(instance.data().clone(), &event.payload)
            .map_err(|source| SagaError::MalformedPayload {
                event_type: event_type.to_string(),
                source,
            })?;
        let to = rule.target().unwrap_or(from);

        if to == from && &data == instance.data() {
            return Ok(Evaluation::Unchanged);
        }

        Ok(Evaluation::Advance {
            next: instance.succeed(to, data),
            from,
            to,
        })
    }

    /// Applies `event` to `instance` and commits the successor.
    ///
    /// Fails with `ConcurrencyConflict` if the stored instance moved past
    /// `instance.version()`; the caller re-fetches and re-applies.
    pub async fn apply(
        &self,
        instance: SagaInstance<S, D>,
        event: &InboundEvent,
    ) -> Result<TransitionOutcome<S, D>> {
        let correlation_id = instance.correlation_id();

        match self.evaluate(&instance, event)? {
            Evaluation::Ignored => {
                tracing::debug!(
                    %correlation_id,
                    event_type = %event.event_type,
                    state = instance.state().name(),
                    "event not applicable in current state"
                );
                Ok(TransitionOutcome::Ignored(instance))
            }
            Evaluation::Unchanged => Ok(TransitionOutcome::Unchanged(instance)),
            Evaluation::Advance { next, from, to } => {
                let record = next.to_record(self.definition.saga_type())?;
                let version = self.store.save(&record).await?;

                tracing::info!(
                    %correlation_id,
                    event_type = %event.event_type,
                    from = from.name(),
                    to = to.name(),
                    %version,
                    "saga transition committed"
                );

                Ok(TransitionOutcome::Committed {
                    instance: next.committed_at(version),
                    from,
                    to,
                })
            }
        }
    }

    fn decode(&self, record: &instance_store::InstanceRecord) -> Result<SagaInstance<S, D>> {
        let instance = SagaInstance::from_record(self.definition.saga_type(), record)?;
        if !self.definition.is_declared_state(instance.state()) {
            return Err(SagaError::CorruptInstance {
                correlation_id: record.correlation_id,
                reason: format!("state '{}' is not declared", record.current_state),
            });
        }
        Ok(instance)
    }
}
