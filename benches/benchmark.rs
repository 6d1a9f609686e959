//! Benchmarks for caskdb performance.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use caskdb::{Engine, Options};
use tempfile::TempDir;

fn bench_options(dir: &TempDir) -> Options {
    Options {
        dir_path: dir.path().to_path_buf(),
        mmap_at_startup: false,
        ..Options::default()
    }
}

/// Benchmark sequential writes.
fn bench_sequential_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential_put");

    for size in [100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter_with_setup(
                || {
                    let dir = TempDir::new().unwrap();
                    let engine = Engine::open(bench_options(&dir)).unwrap();
                    (dir, engine)
                },
                |(_dir, engine)| {
                    for i in 0..size {
                        let key = Bytes::from(format!("key{:08}", i));
                        let value = Bytes::from(format!("value{:08}", i));
                        engine.put(key, value).unwrap();
                    }
                    black_box(())
                },
            );
        });
    }

    group.finish();
}

/// Benchmark random-ish overwrites.
fn bench_random_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_put");

    // Pseudo-random distribution without a rand dependency.
    let keys: Vec<Bytes> = (0..10000)
        .map(|i| Bytes::from(format!("rkey{:08}", (i * 7919) % 100000)))
        .collect();

    group.throughput(Throughput::Elements(10000));
    group.bench_function("10000_keys", |b| {
        b.iter_with_setup(
            || {
                let dir = TempDir::new().unwrap();
                let engine = Engine::open(bench_options(&dir)).unwrap();
                (dir, engine, keys.clone())
            },
            |(_dir, engine, keys)| {
                for key in keys {
                    engine.put(key, Bytes::from_static(b"value")).unwrap();
                }
                black_box(())
            },
        );
    });

    group.finish();
}

/// Benchmark point reads against a populated engine.
fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");

    let dir = TempDir::new().unwrap();
    let engine = Engine::open(bench_options(&dir)).unwrap();
    for i in 0..10000 {
        engine
            .put(
                Bytes::from(format!("key{:08}", i)),
                Bytes::from(format!("value{:08}", i)),
            )
            .unwrap();
    }

    group.throughput(Throughput::Elements(1));
    group.bench_function("hit", |b| {
        let mut i = 0;
        b.iter(|| {
            let key = format!("key{:08}", (i * 7919) % 10000);
            i += 1;
            black_box(engine.get(key.as_bytes()).unwrap())
        });
    });

    group.bench_function("miss", |b| {
        b.iter(|| black_box(engine.get(b"absent-key").is_err()));
    });

    group.finish();
}

criterion_group!(benches, bench_sequential_put, bench_random_put, bench_get);
criterion_main!(benches);
