use std::sync::Arc;

use common::CorrelationId;
use criterion::{Criterion, criterion_group, criterion_main};
use instance_store::InMemoryInstanceStore;
use saga::book::{BookAdded, book_state_machine};
use saga::{CorrelationKeyFormat, InboundEvent, Orchestrator, OrchestratorConfig};

fn config() -> OrchestratorConfig {
    OrchestratorConfig::default().with_correlation_key_format(CorrelationKeyFormat::NameBased)
}

fn added(book_id: &str) -> InboundEvent {
    InboundEvent::from_message(&BookAdded::new(book_id, "Dune", "978-0441013593")).unwrap()
}

fn bench_build_definition(c: &mut Criterion) {
    c.bench_function("saga/build_book_definition", |b| {
        b.iter(|| book_state_machine().unwrap());
    });
}

fn bench_first_delivery(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let definition = Arc::new(book_state_machine().unwrap());

    c.bench_function("saga/first_delivery", |b| {
        b.iter(|| {
            rt.block_on(async {
                let orchestrator = Orchestrator::new(
                    definition.clone(),
                    InMemoryInstanceStore::new(),
                    config(),
                );
                let event = added(&CorrelationId::new().to_string());
                assert!(orchestrator.handle(&event).await.is_ack());
            });
        });
    });
}

fn bench_duplicate_delivery(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let orchestrator = Orchestrator::new(
        Arc::new(book_state_machine().unwrap()),
        InMemoryInstanceStore::new(),
        config(),
    );
    let event = added("B1");

    // Pre-populate so every iteration resolves to an unchanged instance
    rt.block_on(async {
        orchestrator.handle(&event).await;
    });

    c.bench_function("saga/duplicate_delivery", |b| {
        b.iter(|| {
            rt.block_on(async {
                assert!(orchestrator.handle(&event).await.is_ack());
            });
        });
    });
}

fn bench_resolve_name_based_key(c: &mut Criterion) {
    let definition = book_state_machine().unwrap();
    let resolver =
        saga::CorrelationResolver::for_definition(&definition, CorrelationKeyFormat::NameBased);
    let event = added("B1");

    c.bench_function("saga/resolve_name_based_key", |b| {
        b.iter(|| resolver.resolve(&event).unwrap());
    });
}

criterion_group!(
    benches,
    bench_build_definition,
    bench_first_delivery,
    bench_duplicate_delivery,
    bench_resolve_name_based_key,
);
criterion_main!(benches);
