//! Entry point for events arriving from the transport.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use common::CorrelationId;
use instance_store::{InstanceStore, Version};

use crate::config::{OrchestratorConfig, UnhandledEventPolicy};
use crate::correlation::CorrelationResolver;
use crate::definition::StateMachineDefinition;
use crate::error::{Result, SagaError};
use crate::event::InboundEvent;
use crate::executor::{TransitionExecutor, TransitionOutcome};
use crate::state::{SagaData, SagaInstance, SagaState};

/// The answer returned to the transport for one delivery.
#[derive(Debug)]
pub enum Acknowledgement {
    /// The event is done with; do not redeliver.
    Ack,

    /// The event failed. Redeliver only if `retryable`.
    Nack { retryable: bool, error: SagaError },
}

impl Acknowledgement {
    /// Returns true for `Ack`.
    pub fn is_ack(&self) -> bool {
        matches!(self, Acknowledgement::Ack)
    }

    /// Returns true if the transport should redeliver.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Acknowledgement::Nack {
                retryable: true,
                ..
            }
        )
    }

    /// Returns the error behind a `Nack`.
    pub fn error(&self) -> Option<&SagaError> {
        match self {
            Acknowledgement::Ack => None,
            Acknowledgement::Nack { error, .. } => Some(error),
        }
    }
}

/// A committed transition, as reported to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRecord {
    pub saga_type: &'static str,
    pub correlation_id: CorrelationId,
    pub event_type: String,
    pub from: &'static str,
    pub to: &'static str,
    pub version: Version,
    pub data: serde_json::Value,
}

/// Receives committed transitions, e.g. to publish follow-up events.
///
/// Listeners run after the commit; they cannot undo it and own their
/// error handling.
#[async_trait]
pub trait TransitionListener: Send + Sync {
    async fn on_transition(&self, record: &TransitionRecord);
}

/// Resolves, applies, and acknowledges inbound events for one state machine.
///
/// Holds no state between events beyond what the instance store keeps.
pub struct Orchestrator<St, S, D> {
    resolver: CorrelationResolver,
    executor: TransitionExecutor<St, S, D>,
    config: OrchestratorConfig,
    listeners: Vec<Arc<dyn TransitionListener>>,
}

impl<St, S, D> Orchestrator<St, S, D>
where
    St: InstanceStore,
    S: SagaState,
    D: SagaData,
{
    /// Creates an orchestrator for a validated definition.
    pub fn new(
        definition: Arc<StateMachineDefinition<S, D>>,
        store: St,
        config: OrchestratorConfig,
    ) -> Self {
        let resolver =
            CorrelationResolver::for_definition(&definition, config.correlation_key_format);
        let executor =
            TransitionExecutor::new(definition, store).with_policy(config.not_applicable_policy);

        Self {
            resolver,
            executor,
            config,
            listeners: Vec::new(),
        }
    }

    /// Registers a listener for committed transitions.
    pub fn with_listener(mut self, listener: Arc<dyn TransitionListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Returns the state machine definition.
    pub fn definition(&self) -> &StateMachineDefinition<S, D> {
        self.executor.definition()
    }

    /// Returns the configuration in use.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Returns the correlation resolver.
    pub fn resolver(&self) -> &CorrelationResolver {
        &self.resolver
    }

    /// Returns a reference to the underlying instance store.
    pub fn store(&self) -> &St {
        self.executor.store()
    }

    /// Loads an instance by correlation id.
    pub async fn instance(&self, correlation_id: CorrelationId) -> Result<Option<SagaInstance<S, D>>> {
        self.executor.find(correlation_id).await
    }

    /// Handles one delivery and tells the transport what to do with it.
    #[tracing::instrument(
        skip(self, event),
        fields(
            saga_type = self.definition().saga_type(),
            event_type = %event.event_type,
            correlation_id = tracing::field::Empty,
        )
    )]
    pub async fn handle(&self, event: &InboundEvent) -> Acknowledgement {
        let start = Instant::now();

        let ack = match self.process(event).await {
            Ok(outcome) => {
                tracing::debug!(outcome = outcome.as_str(), "event handled");
                metrics::counter!("saga_events_total", "outcome" => outcome.as_str())
                    .increment(1);
                Acknowledgement::Ack
            }
            Err(error) => self.disposition(event, error),
        };

        metrics::histogram!("saga_handle_duration_seconds")
            .record(start.elapsed().as_secs_f64());
        ack
    }

    /// Runs resolve, find-or-create, and apply, retrying conflicts and
    /// outages up to the configured bound.
    pub async fn process(&self, event: &InboundEvent) -> Result<TransitionOutcome<S, D>> {
        // Unknown events never create an instance, and carry no declared
        // correlation field to resolve.
        if !self.definition().is_declared_event(&event.event_type) {
            return Err(SagaError::UnhandledEvent {
                event_type: event.event_type.clone(),
            });
        }

        let correlation_id = self.resolver.resolve(event)?;
        tracing::Span::current().record("correlation_id", tracing::field::display(correlation_id));

        let max_attempts = self.config.max_attempts;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(correlation_id, event).await {
                Ok(outcome) => {
                    if let TransitionOutcome::Committed { instance, from, to } = &outcome {
                        self.notify(event, instance, *from, *to).await;
                    }
                    return Ok(outcome);
                }
                Err(SagaError::ConcurrencyConflict { .. }) if attempt < max_attempts => {
                    metrics::counter!("saga_concurrency_retries_total").increment(1);
                    tracing::debug!(attempt, "concurrency conflict, re-fetching instance");
                }
                Err(SagaError::ConcurrencyConflict { .. }) => {
                    return Err(SagaError::RetryExhausted {
                        correlation_id,
                        attempts: attempt,
                    });
                }
                Err(SagaError::StoreUnavailable(reason)) if attempt < max_attempts => {
                    tracing::warn!(attempt, %reason, "instance store unavailable, retrying");
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(
        &self,
        correlation_id: CorrelationId,
        event: &InboundEvent,
    ) -> Result<TransitionOutcome<S, D>> {
        let instance = self.executor.load_or_create(correlation_id).await?;
        self.executor.apply(instance, event).await
    }

    async fn notify(&self, event: &InboundEvent, instance: &SagaInstance<S, D>, from: S, to: S) {
        if self.listeners.is_empty() {
            return;
        }

        let data = match serde_json::to_value(instance.data()) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode transition for listeners");
                return;
            }
        };
        let record = TransitionRecord {
            saga_type: self.definition().saga_type(),
            correlation_id: instance.correlation_id(),
            event_type: event.event_type.clone(),
            from: from.name(),
            to: to.name(),
            version: instance.version(),
            data,
        };

        for listener in &self.listeners {
            listener.on_transition(&record).await;
        }
    }

    fn disposition(&self, event: &InboundEvent, error: SagaError) -> Acknowledgement {
        let outcome = match &error {
            SagaError::UnhandledEvent { .. } => match self.config.unhandled_event_policy {
                UnhandledEventPolicy::Ack => {
                    tracing::warn!(
                        event_type = %event.event_type,
                        error = %error,
                        "unhandled event acknowledged"
                    );
                    metrics::counter!("saga_events_total", "outcome" => "unhandled").increment(1);
                    return Acknowledgement::Ack;
                }
                UnhandledEventPolicy::Nack => "unhandled",
            },
            e if e.is_retryable() => "retryable",
            _ => "rejected",
        };

        let retryable = error.is_retryable();
        if retryable {
            tracing::warn!(event_type = %event.event_type, error = %error, "event failed, redelivery requested");
        } else {
            tracing::error!(event_type = %event.event_type, error = %error, "event rejected");
        }
        metrics::counter!("saga_events_total", "outcome" => outcome).increment(1);

        Acknowledgement::Nack { retryable, error }
    }
}
