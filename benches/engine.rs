//! Engine benchmarks.
//!
//! Insert and point lookup throughput for each cache mode and split
//! strategy, against memory and disk stores.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use plustree::encoding::numeric_key;
use plustree::{Engine, Geometry, Options};
use tempfile::tempdir;

fn geometry() -> Geometry {
    Geometry::new(16, 32, 8)
}

fn scattered(count: u64) -> Vec<u64> {
    (0..count).map(|i| (i * 7_919) % count).collect()
}

fn modes() -> [(&'static str, Options); 4] {
    let base = Options::default();
    [
        ("cached_balanced", base),
        ("cached_append", base.with_balance(false)),
        ("uncached_balanced", base.with_cache(false)),
        ("uncached_append", base.with_cache(false).with_balance(false)),
    ]
}

fn bench_insert_memory(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_memory");
    let count = 10_000u64;
    group.throughput(Throughput::Elements(count));

    for (name, options) in modes() {
        group.bench_with_input(BenchmarkId::new(name, count), &options, |b, &options| {
            b.iter_with_setup(
                || scattered(count),
                |keys| {
                    let mut engine = Engine::create_memory(geometry(), options).unwrap();
                    let data = [0xA5u8; 32];
                    for n in keys {
                        engine.insert(&numeric_key(n, 16).unwrap(), &data).unwrap();
                    }
                    engine
                },
            );
        });
    }

    group.finish();
}

fn bench_insert_disk(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_disk");
    let count = 2_000u64;
    group.throughput(Throughput::Elements(count));
    group.sample_size(10);

    for (name, options) in modes() {
        group.bench_with_input(BenchmarkId::new(name, count), &options, |b, &options| {
            b.iter_with_setup(
                || {
                    let dir = tempdir().unwrap();
                    let path = dir.path().join("bench.btp");
                    (dir, path)
                },
                |(dir, path)| {
                    let mut engine = Engine::create_or_open(&path, geometry(), options).unwrap();
                    let data = [0x5Au8; 32];
                    for n in 0..count {
                        engine.insert(&numeric_key(n, 16).unwrap(), &data).unwrap();
                    }
                    engine.close().unwrap();
                    dir
                },
            );
        });
    }

    group.finish();
}

fn bench_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("find");
    let count = 10_000u64;

    for (name, options) in modes() {
        let mut engine = Engine::create_memory(geometry(), options).unwrap();
        for n in scattered(count) {
            engine.insert(&numeric_key(n, 16).unwrap(), &[1u8; 32]).unwrap();
        }
        engine.commit().unwrap();
        let keys: Vec<Vec<u8>> = scattered(count)
            .into_iter()
            .map(|n| numeric_key(n, 16).unwrap())
            .collect();

        group.bench_function(BenchmarkId::new("existing_key", name), |b| {
            let mut out = [0u8; 32];
            let mut i = 0;
            b.iter(|| {
                i = (i + 1) % keys.len();
                black_box(engine.find(&keys[i], &mut out).unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_insert_memory, bench_insert_disk, bench_find);
criterion_main!(benches);
