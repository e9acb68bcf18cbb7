//! Throughput Benchmarks
//!
//! Measures the keyspace engine under point and mixed workloads, plus the
//! RESP frame decoder on typical command frames.

use blazekv::protocol::parse_frame;
use blazekv::storage::StorageEngine;
use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;

fn bench_set(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i));
            engine.set(key, Bytes::from("small_value"));
            i += 1;
        });
    });

    group.bench_function("set_medium", |b| {
        let mut i = 0u64;
        let value = Bytes::from("x".repeat(1024));
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i));
            engine.set(key, value.clone());
            i += 1;
        });
    });

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());
    for i in 0..100_000 {
        engine.set(
            Bytes::from(format!("key:{}", i)),
            Bytes::from(format!("value:{}", i)),
        );
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i % 100_000));
            black_box(engine.get(&key));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("missing:{}", i));
            black_box(engine.get(&key));
            i += 1;
        });
    });

    group.finish();
}

fn bench_mixed(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());
    for i in 0..10_000 {
        engine.set(
            Bytes::from(format!("key:{}", i)),
            Bytes::from(format!("value:{}", i)),
        );
    }

    let mut group = c.benchmark_group("mixed");
    group.throughput(Throughput::Elements(1));

    group.bench_function("80_read_20_write", |b| {
        let mut i = 0u64;
        b.iter(|| {
            if i % 5 == 0 {
                engine.set(Bytes::from(format!("new:{}", i)), Bytes::from("value"));
            } else {
                let key = Bytes::from(format!("key:{}", i % 10_000));
                black_box(engine.get(&key));
            }
            i += 1;
        });
    });

    group.finish();
}

fn bench_keys(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());
    for i in 0..1_000 {
        engine.set(Bytes::from(format!("user:{}", i)), Bytes::from("u"));
        engine.set(Bytes::from(format!("session:{}", i)), Bytes::from("s"));
        engine.set(Bytes::from(format!("cache:{}", i)), Bytes::from("c"));
    }

    let mut group = c.benchmark_group("keys");

    group.bench_function("keys_pattern", |b| {
        b.iter(|| {
            black_box(engine.keys("user:*"));
        });
    });

    group.bench_function("keys_all", |b| {
        b.iter(|| {
            black_box(engine.keys("*"));
        });
    });

    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let set_frame = b"*3\r\n$3\r\nSET\r\n$8\r\nuser:101\r\n$5\r\nhello\r\n";
    let get_frame = b"*2\r\n$3\r\nGET\r\n$8\r\nuser:101\r\n";

    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Elements(1));

    group.bench_function("parse_set_frame", |b| {
        b.iter(|| {
            black_box(parse_frame(set_frame).unwrap());
        });
    });

    group.bench_function("parse_get_frame", |b| {
        b.iter(|| {
            black_box(parse_frame(get_frame).unwrap());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_set, bench_get, bench_mixed, bench_keys, bench_parse);
criterion_main!(benches);
