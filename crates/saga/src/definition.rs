//! State machine definitions: declared states, declared events, and the
//! `(state, event) -> rule` table.
//!
//! A definition is built once, validated eagerly, and read-only afterwards:
//!
//! ```text
//! StateMachineDefinition::builder("Book", BookState::Initial)
//!     .state(BookState::Available)
//!     .event_correlated_by::<BookAdded>("book_id")
//!     .initially(When::new().then(copy_data).transition_to(BookState::Available))
//!     .during_any(When::new().then(copy_data))
//!     .build()?
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::event::SagaMessage;
use crate::state::{SagaData, SagaState};

type Activity<D> =
    Arc<dyn Fn(D, &serde_json::Value) -> Result<D, serde_json::Error> + Send + Sync>;

type TypedActivity<M, D> = Arc<dyn Fn(D, &M) -> D + Send + Sync>;

/// Validation failures detected while building a definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("state '{0}' is declared more than once")]
    DuplicateState(&'static str),

    #[error("event '{0}' is declared more than once")]
    DuplicateEvent(&'static str),

    #[error("final state '{0}' cannot also be the initial state")]
    FinalIsInitial(&'static str),

    #[error("state name '{0}' is used by more than one state")]
    DuplicateStateName(&'static str),

    #[error("state '{0}' does not round-trip through its stored name")]
    UnstableStateName(&'static str),

    #[error("rule for event '{event}' is bound to undeclared state '{state}'")]
    UndeclaredSourceState {
        state: &'static str,
        event: &'static str,
    },

    #[error("rule for event '{event}' transitions to undeclared state '{state}'")]
    UndeclaredTargetState {
        state: &'static str,
        event: &'static str,
    },

    #[error("rule in state '{state}' uses undeclared event '{event}'")]
    UndeclaredEvent {
        state: &'static str,
        event: &'static str,
    },

    #[error("final state '{state}' cannot accept event '{event}'")]
    RuleFromFinalState {
        state: &'static str,
        event: &'static str,
    },

    #[error("more than one rule for event '{event}' in state '{state}'")]
    DuplicateRule {
        state: &'static str,
        event: &'static str,
    },
}

/// The action and next state bound to one `(state, event)` pair.
pub struct TransitionRule<S, D> {
    event_type: &'static str,
    activity: Activity<D>,
    target: Option<S>,
}

impl<S: SagaState, D: SagaData> TransitionRule<S, D> {
    /// Returns the event type this rule reacts to.
    pub fn event_type(&self) -> &'static str {
        self.event_type
    }

    /// Returns the next state, or None if the instance stays where it is.
    pub fn target(&self) -> Option<S> {
        self.target
    }

    /// Decodes the payload and runs the bound activities over `data`.
    pub(crate) fn run(&self, data: D, payload: &serde_json::Value) -> Result<D, serde_json::Error> {
        (self.activity)(data, payload)
    }
}

impl<S: Copy, D> Clone for TransitionRule<S, D> {
    fn clone(&self) -> Self {
        Self {
            event_type: self.event_type,
            activity: Arc::clone(&self.activity),
            target: self.target,
        }
    }
}

impl<S: fmt::Debug, D> fmt::Debug for TransitionRule<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionRule")
            .field("event_type", &self.event_type)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Binds a message type to a chain of activities and an optional transition.
///
/// The message type is usually inferred from the first activity:
/// `When::new().then(copy_data)`. Without activities, name it explicitly:
/// `When::<Returned, _, _>::new().transition_to(State::Available)`.
pub struct When<M, S, D> {
    activities: Vec<TypedActivity<M, D>>,
    target: Option<S>,
}

impl<M: SagaMessage, S: SagaState, D: SagaData> When<M, S, D> {
    pub fn new() -> Self {
        Self {
            activities: Vec::new(),
            target: None,
        }
    }

    /// Appends a pure activity deriving new domain fields from the message.
    pub fn then<F>(mut self, activity: F) -> Self
    where
        F: Fn(D, &M) -> D + Send + Sync + 'static,
    {
        self.activities.push(Arc::new(activity));
        self
    }

    /// Moves the instance to `state` after the activities ran.
    pub fn transition_to(mut self, state: S) -> Self {
        self.target = Some(state);
        self
    }

    fn into_rule(self) -> TransitionRule<S, D> {
        let activities = self.activities;
        let activity: Activity<D> = Arc::new(
            move |data: D, payload: &serde_json::Value| -> Result<D, serde_json::Error> {
                let message = M::deserialize(payload)?;
                Ok(activities
                    .iter()
                    .fold(data, |data, activity| activity(data, &message)))
            },
        );

        TransitionRule {
            event_type: M::EVENT_TYPE,
            activity,
            target: self.target,
        }
    }
}

impl<M: SagaMessage, S: SagaState, D: SagaData> Default for When<M, S, D> {
    fn default() -> Self {
        Self::new()
    }
}

enum RuleSource<S> {
    State(S),
    AnyState,
}

/// Collects declarations for a [`StateMachineDefinition`].
pub struct StateMachineBuilder<S, D> {
    saga_type: &'static str,
    initial: S,
    final_state: Option<S>,
    states: Vec<S>,
    events: Vec<(&'static str, Option<&'static str>)>,
    rules: Vec<(RuleSource<S>, TransitionRule<S, D>)>,
}

impl<S: SagaState, D: SagaData> StateMachineBuilder<S, D> {
    /// Declares a state.
    pub fn state(mut self, state: S) -> Self {
        self.states.push(state);
        self
    }

    /// Declares the terminal state. Events delivered to an instance in
    /// this state are ignored.
    pub fn final_state(mut self, state: S) -> Self {
        self.final_state = Some(state);
        self
    }

    /// Declares an event correlated by the transport's correlation key.
    pub fn event<M: SagaMessage>(mut self) -> Self {
        self.events.push((M::EVENT_TYPE, None));
        self
    }

    /// Declares an event correlated by a field of its payload.
    pub fn event_correlated_by<M: SagaMessage>(mut self, field: &'static str) -> Self {
        self.events.push((M::EVENT_TYPE, Some(field)));
        self
    }

    /// Adds a rule for the initial state.
    pub fn initially<M: SagaMessage>(mut self, when: When<M, S, D>) -> Self {
        let initial = self.initial;
        self.rules.push((RuleSource::State(initial), when.into_rule()));
        self
    }

    /// Adds a rule for `state`.
    pub fn during<M: SagaMessage>(mut self, state: S, when: When<M, S, D>) -> Self {
        self.rules.push((RuleSource::State(state), when.into_rule()));
        self
    }

    /// Adds a rule to every declared state other than the initial and
    /// final states.
    ///
    /// Expanded into explicit per-state rules when the definition is built,
    /// so it covers exactly the states declared at that point.
    pub fn during_any<M: SagaMessage>(mut self, when: When<M, S, D>) -> Self {
        self.rules.push((RuleSource::AnyState, when.into_rule()));
        self
    }

    /// Validates the declarations and builds the definition.
    pub fn build(self) -> Result<StateMachineDefinition<S, D>, DefinitionError> {
        let mut states = vec![self.initial];
        let mut declared = HashSet::from([self.initial]);
        for state in self.states.iter().copied().chain(self.final_state) {
            if !declared.insert(state) {
                if Some(state) == self.final_state && state == self.initial {
                    return Err(DefinitionError::FinalIsInitial(state.name()));
                }
                return Err(DefinitionError::DuplicateState(state.name()));
            }
            states.push(state);
        }

        // Instances store the state name, so it must identify the state.
        let mut names = HashSet::new();
        for state in &states {
            let name = state.name();
            if !names.insert(name) {
                return Err(DefinitionError::DuplicateStateName(name));
            }
            if S::from_name(name) != Some(*state) {
                return Err(DefinitionError::UnstableStateName(name));
            }
        }

        let mut events = HashMap::new();
        for (event_type, field) in self.events {
            if events.insert(event_type, field).is_some() {
                return Err(DefinitionError::DuplicateEvent(event_type));
            }
        }

        let mut table = RuleTable {
            initial: self.initial,
            final_state: self.final_state,
            declared: &declared,
            events: &events,
            rules: HashMap::new(),
        };

        for (source, rule) in self.rules {
            match source {
                RuleSource::State(state) => table.insert(state, rule)?,
                RuleSource::AnyState => table.insert_any(&states, rule)?,
            }
        }

        let rules = table.rules;
        Ok(StateMachineDefinition {
            saga_type: self.saga_type,
            initial: self.initial,
            final_state: self.final_state,
            states,
            events,
            rules,
        })
    }
}

struct RuleTable<'a, S, D> {
    initial: S,
    final_state: Option<S>,
    declared: &'a HashSet<S>,
    events: &'a HashMap<&'static str, Option<&'static str>>,
    rules: HashMap<S, HashMap<&'static str, TransitionRule<S, D>>>,
}

impl<S: SagaState, D: SagaData> RuleTable<'_, S, D> {
    fn check_rule(&self, state: S, rule: &TransitionRule<S, D>) -> Result<(), DefinitionError> {
        let event = rule.event_type;
        if !self.events.contains_key(event) {
            return Err(DefinitionError::UndeclaredEvent {
                state: state.name(),
                event,
            });
        }
        if let Some(target) = rule.target
            && !self.declared.contains(&target)
        {
            return Err(DefinitionError::UndeclaredTargetState {
                state: target.name(),
                event,
            });
        }
        Ok(())
    }

    fn insert(&mut self, state: S, rule: TransitionRule<S, D>) -> Result<(), DefinitionError> {
        let event = rule.event_type;
        if !self.declared.contains(&state) {
            return Err(DefinitionError::UndeclaredSourceState {
                state: state.name(),
                event,
            });
        }
        if self.final_state == Some(state) {
            return Err(DefinitionError::RuleFromFinalState {
                state: state.name(),
                event,
            });
        }
        self.check_rule(state, &rule)?;

        let by_event = self.rules.entry(state).or_default();
        if by_event.contains_key(event) {
            return Err(DefinitionError::DuplicateRule {
                state: state.name(),
                event,
            });
        }
        by_event.insert(event, rule);
        Ok(())
    }

    fn insert_any(&mut self, states: &[S], rule: TransitionRule<S, D>) -> Result<(), DefinitionError> {
        // Checked up front so a rule is validated even when no state qualifies.
        self.check_rule(self.initial, &rule)?;

        let targets: Vec<S> = states
            .iter()
            .copied()
            .filter(|s| *s != self.initial && Some(*s) != self.final_state)
            .collect();
        for state in targets {
            self.insert(state, rule.clone())?;
        }
        Ok(())
    }
}

/// A validated, read-only state machine.
pub struct StateMachineDefinition<S, D> {
    saga_type: &'static str,
    initial: S,
    final_state: Option<S>,
    states: Vec<S>,
    events: HashMap<&'static str, Option<&'static str>>,
    rules: HashMap<S, HashMap<&'static str, TransitionRule<S, D>>>,
}

impl<S: SagaState, D: SagaData> StateMachineDefinition<S, D> {
    /// Starts a definition for `saga_type` whose instances begin in `initial`.
    pub fn builder(saga_type: &'static str, initial: S) -> StateMachineBuilder<S, D> {
        StateMachineBuilder {
            saga_type,
            initial,
            final_state: None,
            states: Vec::new(),
            events: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// Returns the saga type, used as the instance store's type tag.
    pub fn saga_type(&self) -> &'static str {
        self.saga_type
    }

    /// Returns the initial state.
    pub fn initial_state(&self) -> S {
        self.initial
    }

    /// Returns the final state, if one is declared.
    pub fn final_state(&self) -> Option<S> {
        self.final_state
    }

    /// Returns true if `state` is the final state.
    pub fn is_final(&self, state: S) -> bool {
        self.final_state == Some(state)
    }

    /// Returns all declared states, initial state first.
    pub fn states(&self) -> &[S] {
        &self.states
    }

    /// Returns true if `state` is declared.
    pub fn is_declared_state(&self, state: S) -> bool {
        self.states.contains(&state)
    }

    /// Returns true if `event_type` is declared anywhere in the machine.
    pub fn is_declared_event(&self, event_type: &str) -> bool {
        self.events.contains_key(event_type)
    }

    /// Returns all declared event types, sorted.
    pub fn event_types(&self) -> Vec<&'static str> {
        let mut events: Vec<_> = self.events.keys().copied().collect();
        events.sort_unstable();
        events
    }

    /// Returns the payload field an event type correlates by, if declared.
    pub fn correlation_field(&self, event_type: &str) -> Option<&'static str> {
        self.events.get(event_type).copied().flatten()
    }

    /// Looks up the rule for `(state, event_type)`.
    pub fn rule(&self, state: S, event_type: &str) -> Option<&TransitionRule<S, D>> {
        self.rules.get(&state)?.get(event_type)
    }

    /// Returns the event types accepted in `state`, sorted.
    pub fn accepted_events(&self, state: S) -> Vec<&'static str> {
        let mut events: Vec<_> = self
            .rules
            .get(&state)
            .map(|by_event| by_event.keys().copied().collect())
            .unwrap_or_default();
        events.sort_unstable();
        events
    }

    /// Returns the total number of `(state, event)` rules.
    pub fn rule_count(&self) -> usize {
        self.rules.values().map(HashMap::len).sum()
    }
}

impl<S: fmt::Debug, D> fmt::Debug for StateMachineDefinition<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachineDefinition")
            .field("saga_type", &self.saga_type)
            .field("initial", &self.initial)
            .field("final_state", &self.final_state)
            .field("states", &self.states)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}
