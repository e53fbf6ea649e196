//! Performance benchmarks for snapshot handling.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Map};
use task_sync::{
    decode_snapshot, sort_newest_first, DecodePolicy, Document, Generation, LocalStateCache,
    Timestamp,
};

fn documents(count: usize) -> Vec<Document> {
    (0..count)
        .map(|i| {
            let mut fields = Map::new();
            fields.insert("title".into(), json!(format!("Task {}", i)));
            fields.insert("description".into(), json!("benchmark"));
            fields.insert("ownerId".into(), json!("u1"));
            // Every tenth document has no creation time.
            if i % 10 != 0 {
                let ts = Timestamp::from_millis(((i * 7919) % 100_000) as i64).to_value();
                fields.insert("createdAt".into(), ts.clone());
                fields.insert("updatedAt".into(), ts);
            }
            Document::new(format!("doc-{:06}", i), fields)
        })
        .collect()
}

/// Benchmark decoding plus degraded-mode sorting of a snapshot
fn bench_degraded_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("degraded_snapshot");
    let policy = DecodePolicy::default();

    for size in [10, 100, 1000, 5000] {
        let docs = documents(size);
        group.bench_with_input(BenchmarkId::new("documents", size), &docs, |b, docs| {
            b.iter(|| {
                let mut tasks = decode_snapshot(docs.clone(), "u1", &policy).tasks;
                sort_newest_first(&mut tasks);
                black_box(tasks);
            });
        });
    }

    group.finish();
}

/// Benchmark wholesale replacement in the cache
fn bench_apply_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_snapshot");
    let policy = DecodePolicy::default();

    for size in [10, 100, 1000, 5000] {
        let tasks = decode_snapshot(documents(size), "u1", &policy).tasks;
        group.bench_with_input(BenchmarkId::new("tasks", size), &tasks, |b, tasks| {
            let cache = LocalStateCache::new(16);
            cache.activate(Generation(1));
            b.iter(|| {
                black_box(cache.apply_snapshot(Generation(1), tasks.clone()));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_degraded_snapshot, bench_apply_snapshot);
criterion_main!(benches);
