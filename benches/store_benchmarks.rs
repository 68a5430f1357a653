//! In-memory store benchmarks
//!
//! Measures the leasing scan that every polling iteration performs and the
//! filtered query path used by management lookups.

use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use dataspace_core::state_machine::{StatefulEntity, TransferState};
use dataspace_core::store::{Criterion as QueryCriterion, EntityStore, InMemoryEntityStore, QuerySpec, SortOrder};
use serde_json::json;
use tokio::runtime::Runtime;

type Store = InMemoryEntityStore<TransferState, serde_json::Value>;

fn populated_store(rt: &Runtime, size: usize) -> Store {
    let store = Store::new("bench-node", Duration::seconds(60));
    let now = Utc::now();
    rt.block_on(async {
        for i in 0..size {
            let state = if i % 2 == 0 {
                TransferState::Started
            } else {
                TransferState::Provisioning
            };
            let entity = StatefulEntity::with_id(format!("tp-{i}"), state, json!({ "priority": i % 10 }), now);
            let _ = store.save(&entity).await;
        }
    });
    store
}

fn benchmark_next_not_leased(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("next_not_leased");

    for size in [100usize, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || populated_store(&rt, size),
                |store| {
                    rt.block_on(async {
                        black_box(store.next_not_leased(20, &[TransferState::Started]).await.unwrap())
                    })
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn benchmark_query(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = populated_store(&rt, 1_000);
    let spec = QuerySpec::all()
        .with_filter(QueryCriterion::parse("payload.priority >= 5").unwrap())
        .with_filter(QueryCriterion::parse("state = STARTED").unwrap())
        .sorted_by("createdAt", SortOrder::Desc)
        .with_range(0, 50);

    c.bench_function("find_all_filtered", |b| {
        b.iter(|| rt.block_on(async { black_box(store.find_all(&spec).await.unwrap()) }));
    });
}

criterion_group!(benches, benchmark_next_not_leased, benchmark_query);
criterion_main!(benches);
