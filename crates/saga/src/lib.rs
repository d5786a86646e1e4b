//! Saga orchestration core.
//!
//! Correlates inbound events to persisted saga instances, applies the
//! transition rules of a validated state machine, and commits each
//! successor snapshot with optimistic concurrency control.
//!
//! Event flow:
//! 1. [`CorrelationResolver`] computes the correlation id
//! 2. The instance is found or created in the [`instance_store::InstanceStore`]
//! 3. [`TransitionExecutor`] applies the matching rule and saves
//! 4. [`Orchestrator`] acknowledges the delivery, or asks for redelivery

pub mod book;
pub mod config;
pub mod correlation;
pub mod definition;
pub mod error;
pub mod event;
pub mod executor;
pub mod orchestrator;
pub mod state;

pub use config::{OrchestratorConfig, UnhandledEventPolicy};
pub use correlation::{CorrelationKeyFormat, CorrelationResolver};
pub use definition::{DefinitionError, StateMachineBuilder, StateMachineDefinition, TransitionRule, When};
pub use error::SagaError;
pub use event::{InboundEvent, SagaMessage};
pub use executor::{Evaluation, NotApplicablePolicy, TransitionExecutor, TransitionOutcome};
pub use orchestrator::{Acknowledgement, Orchestrator, TransitionListener, TransitionRecord};
pub use state::{SagaData, SagaInstance, SagaState};
