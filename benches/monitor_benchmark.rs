//! Performance benchmarks for ConnSync
//!
//! Run with: cargo bench

use connsync::catalog::{CatalogSource, InMemoryCatalog};
use connsync::events::{decode_frame, ChangeAction, ChangeEvent};
use connsync::monitor::PendingWork;
use connsync::sync::{CatalogSynchronizer, ConnectionSynchronizer};
use connsync::workspace::InMemoryWorkspace;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Build a change-event frame the way the catalog sends it
fn change_frame(kind: &str, id: &str) -> String {
    let data = serde_json::json!({ "action": "updated", "kind": kind, "id": id }).to_string();
    serde_json::json!({ "event": "change-event", "data": data }).to_string()
}

/// Catalog with `count` postgres sources
fn catalog_with(count: usize) -> InMemoryCatalog {
    InMemoryCatalog::with_sources((0..count).map(|i| {
        let mut props = BTreeMap::new();
        props.insert("url".to_string(), format!("jdbc:postgresql://db-{}/sales", i));
        props.insert("user".to_string(), "sales".to_string());
        CatalogSource::new(format!("i-{:05}", i), format!("sales_{}", i), props)
    }))
}

fn bench_decode_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_frame");

    let frames = [
        ("handshake", r#"{"event":"message","data":"connected"}"#.to_string()),
        ("connection_change", change_frame("connection", "i-00042")),
        ("ignored_kind", change_frame("integration", "i-00042")),
        ("malformed", "{\"event\":\"change-event\",\"data\":\"{oops\"}".to_string()),
    ];

    for (name, frame) in frames.iter() {
        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::new("frame", name), frame, |b, frame| {
            b.iter(|| {
                let _ = black_box(decode_frame(frame));
            });
        });
    }

    group.finish();
}

fn bench_pending_ordering(c: &mut Criterion) {
    let mut group = c.benchmark_group("pending_work");

    for count in [100usize, 1_000, 10_000].iter() {
        // Interleaved ids so inserts do not arrive sorted
        let ids: Vec<String> = (0..*count)
            .map(|i| format!("i-{:06}", (i * 7919) % count))
            .collect();

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("insert_drain", count), &ids, |b, ids| {
            b.iter(|| {
                let mut pending = PendingWork::new();
                for id in ids {
                    pending.insert(ChangeEvent::new(ChangeAction::Updated, "connection", id.as_str()), ());
                }
                while let Some(entry) = pending.pop_first() {
                    black_box(entry);
                }
            });
        });
    }

    group.finish();
}

fn bench_reconciliation(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("reconcile");

    for count in [10usize, 100, 500].iter() {
        let catalog = Arc::new(catalog_with(*count));

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("in_memory", count), count, |b, _| {
            b.iter(|| {
                let synchronizer =
                    CatalogSynchronizer::new(catalog.clone(), Arc::new(InMemoryWorkspace::new()));
                runtime.block_on(async {
                    black_box(synchronizer.synchronize_connections().await.unwrap())
                })
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_decode_frames,
    bench_pending_ordering,
    bench_reconciliation
);

criterion_main!(benches);
