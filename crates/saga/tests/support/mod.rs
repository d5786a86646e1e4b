//! Shared fixtures for saga integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use instance_store::{
    CorrelationId, InMemoryInstanceStore, InstanceQuery, InstanceRecord, InstanceStore,
    InstanceStoreError, Version,
};
use saga::{
    DefinitionError, SagaMessage, SagaState, StateMachineDefinition, TransitionListener,
    TransitionRecord, When,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// A circulation machine with more states than the book saga
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoanState {
    Initial,
    OnShelf,
    OnLoan,
    Withdrawn,
}

impl SagaState for LoanState {
    fn name(&self) -> &'static str {
        match self {
            LoanState::Initial => "Initial",
            LoanState::OnShelf => "OnShelf",
            LoanState::OnLoan => "OnLoan",
            LoanState::Withdrawn => "Withdrawn",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "Initial" => Some(LoanState::Initial),
            "OnShelf" => Some(LoanState::OnShelf),
            "OnLoan" => Some(LoanState::OnLoan),
            "Withdrawn" => Some(LoanState::Withdrawn),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub borrower: Option<String>,
    pub loans: u32,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shelved {}

impl SagaMessage for Shelved {
    const EVENT_TYPE: &'static str = "Shelved";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Borrowed {
    pub borrower: String,
}

impl SagaMessage for Borrowed {
    const EVENT_TYPE: &'static str = "Borrowed";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Returned {}

impl SagaMessage for Returned {
    const EVENT_TYPE: &'static str = "Returned";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tagged {
    pub tag: String,
}

impl SagaMessage for Tagged {
    const EVENT_TYPE: &'static str = "Tagged";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Withdrawn {}

impl SagaMessage for Withdrawn {
    const EVENT_TYPE: &'static str = "Withdrawn";
}

fn lend(mut loan: Loan, borrowed: &Borrowed) -> Loan {
    loan.borrower = Some(borrowed.borrower.clone());
    loan.loans += 1;
    loan
}

fn give_back(mut loan: Loan, _: &Returned) -> Loan {
    loan.borrower = None;
    loan
}

fn tag(mut loan: Loan, tagged: &Tagged) -> Loan {
    loan.tags.push(tagged.tag.clone());
    loan
}

pub fn loan_state_machine() -> Result<StateMachineDefinition<LoanState, Loan>, DefinitionError> {
    StateMachineDefinition::builder("Loan", LoanState::Initial)
        .state(LoanState::OnShelf)
        .state(LoanState::OnLoan)
        .final_state(LoanState::Withdrawn)
        .event::<Shelved>()
        .event::<Borrowed>()
        .event::<Returned>()
        .event::<Tagged>()
        .event::<Withdrawn>()
        .initially(When::<Shelved, _, _>::new().transition_to(LoanState::OnShelf))
        .during(
            LoanState::OnShelf,
            When::new().then(lend).transition_to(LoanState::OnLoan),
        )
        .during(
            LoanState::OnLoan,
            When::new().then(give_back).transition_to(LoanState::OnShelf),
        )
        .during(
            LoanState::OnShelf,
            When::<Withdrawn, _, _>::new().transition_to(LoanState::Withdrawn),
        )
        .during_any(When::new().then(tag))
        .build()
}

pub fn loan_event<M: SagaMessage>(id: CorrelationId, message: &M) -> saga::InboundEvent {
    saga::InboundEvent::from_message(message)
        .unwrap()
        .with_correlation_key(id.to_string())
}

// ---------------------------------------------------------------------------
// Store wrappers
// ---------------------------------------------------------------------------

/// Commits a competing record right before the next save, as if another
/// worker had won the race.
#[derive(Clone, Default)]
pub struct InterleavingStore {
    pub inner: InMemoryInstanceStore,
    competing: Arc<Mutex<Option<InstanceRecord>>>,
}

impl InterleavingStore {
    pub fn new(inner: InMemoryInstanceStore) -> Self {
        Self {
            inner,
            competing: Arc::default(),
        }
    }

    pub fn interleave(&self, record: InstanceRecord) {
        *self.competing.lock().unwrap() = Some(record);
    }
}

#[async_trait]
impl InstanceStore for InterleavingStore {
    async fn find_by_id(
        &self,
        correlation_id: CorrelationId,
    ) -> instance_store::Result<Option<InstanceRecord>> {
        self.inner.find_by_id(correlation_id).await
    }

    async fn create_or_get(
        &self,
        template: InstanceRecord,
    ) -> instance_store::Result<(InstanceRecord, bool)> {
        self.inner.create_or_get(template).await
    }

    async fn save(&self, record: &InstanceRecord) -> instance_store::Result<Version> {
        let competing = self.competing.lock().unwrap().take();
        if let Some(competing) = competing {
            self.inner.save(&competing).await?;
        }
        self.inner.save(record).await
    }

    async fn query(&self, query: InstanceQuery) -> instance_store::Result<Vec<InstanceRecord>> {
        self.inner.query(query).await
    }

    async fn count(&self, saga_type: &str) -> instance_store::Result<usize> {
        self.inner.count(saga_type).await
    }
}

/// Fails the first `conflicts` saves with a concurrency conflict.
#[derive(Clone)]
pub struct ContendedStore {
    pub inner: InMemoryInstanceStore,
    remaining: Arc<AtomicU32>,
    pub saves: Arc<AtomicU32>,
}

impl ContendedStore {
    pub fn new(conflicts: u32) -> Self {
        Self {
            inner: InMemoryInstanceStore::new(),
            remaining: Arc::new(AtomicU32::new(conflicts)),
            saves: Arc::new(AtomicU32::new(0)),
        }
    }
}

#[async_trait]
impl InstanceStore for ContendedStore {
    async fn find_by_id(
        &self,
        correlation_id: CorrelationId,
    ) -> instance_store::Result<Option<InstanceRecord>> {
        self.inner.find_by_id(correlation_id).await
    }

    async fn create_or_get(
        &self,
        template: InstanceRecord,
    ) -> instance_store::Result<(InstanceRecord, bool)> {
        self.inner.create_or_get(template).await
    }

    async fn save(&self, record: &InstanceRecord) -> instance_store::Result<Version> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        let contended = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if contended {
            return Err(InstanceStoreError::ConcurrencyConflict {
                correlation_id: record.correlation_id,
                expected: record.version,
                actual: record.version.next(),
            });
        }
        self.inner.save(record).await
    }

    async fn query(&self, query: InstanceQuery) -> instance_store::Result<Vec<InstanceRecord>> {
        self.inner.query(query).await
    }

    async fn count(&self, saga_type: &str) -> instance_store::Result<usize> {
        self.inner.count(saga_type).await
    }
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingListener {
    records: Mutex<Vec<TransitionRecord>>,
}

impl RecordingListener {
    pub fn records(&self) -> Vec<TransitionRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransitionListener for RecordingListener {
    async fn on_transition(&self, record: &TransitionRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}
