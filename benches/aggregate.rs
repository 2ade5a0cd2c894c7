//! Performance benchmarks for a3s-trail
//!
//! Run with: cargo bench

use a3s_trail::store::memory::MemoryStore;
use a3s_trail::{BusEvent, Correlation, MetricsAggregator, ReceiptHandle, TrailEvent, TrailStore};
use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;

const BODY: &[u8] = br#"{
    "timestamp": 1700000000,
    "event": "document.share",
    "event_metadata": {"channel": "email"},
    "actor": "u-42",
    "actor_metadata": {"role": "editor"},
    "target": "doc-7",
    "origin": "web"
}"#;

fn bench_parse(c: &mut Criterion) {
    c.bench_function("TrailEvent::parse", |b| {
        b.iter(|| TrailEvent::parse(BODY).unwrap());
    });

    c.bench_function("BusEvent::create", |b| {
        let trail = TrailEvent::parse(BODY).unwrap();
        b.iter(|| {
            let correlation = Correlation::from_receipt(ReceiptHandle::new("$JS.ACK.A3S_TRAILS.a3s-trail.1.1.1.0.0"));
            BusEvent::create(trail.clone(), correlation)
        });
    });
}

fn bench_aggregate(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let store = Arc::new(MemoryStore::new());
    rt.block_on(async {
        for i in 0..10_000i64 {
            let trail = TrailEvent::new(i * 7 % 86_400, "login", "u", "t", "o");
            store.insert(&trail).await.unwrap();
        }
    });
    let aggregator = MetricsAggregator::new(store);

    c.bench_function("aggregate 10k trails, 24 hourly buckets", |b| {
        b.to_async(&rt)
            .iter(|| async { aggregator.aggregate(0, 86_400, 3_600).await.unwrap() });
    });

    c.bench_function("aggregate 10k trails, 1440 minute buckets", |b| {
        b.to_async(&rt)
            .iter(|| async { aggregator.aggregate(0, 86_400, 60).await.unwrap() });
    });
}

criterion_group!(benches, bench_parse, bench_aggregate);
criterion_main!(benches);
