// Read performance benchmarks for HosDb

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hosdb::{HosReader, HosWriter, Options};
use std::hint::black_box;
use std::path::Path;
use tempfile::TempDir;

fn populate(path: &Path, size: usize) {
    let mut writer = HosWriter::create(path, Options::default()).unwrap();
    for i in 0..size {
        let key = format!("key{:08}", i);
        let value = format!("value{:08}", i);
        writer.put(key.as_bytes(), value.as_bytes()).unwrap();
    }
    writer.build_index().unwrap();
    writer.close().unwrap();
}

fn benchmark_sequential_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential_get");

    for size in [100, 1000, 10000].iter() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bench.hos");
        populate(&path, *size);
        let reader = HosReader::open(&path).unwrap();

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                for i in 0..size {
                    let key = format!("key{:08}", i);
                    let value = reader.get(key.as_bytes()).unwrap();
                    black_box(value);
                }
            });
        });
    }

    group.finish();
}

fn benchmark_random_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_get");

    for size in [100, 1000, 10000].iter() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bench.hos");
        populate(&path, *size);
        let reader = HosReader::open(&path).unwrap();

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            use rand::Rng;
            let mut rng = rand::rng();

            b.iter(|| {
                for _ in 0..size {
                    let key = format!("key{:08}", rng.random_range(0..size));
                    let value = reader.get(key.as_bytes()).unwrap();
                    black_box(value);
                }
            });
        });
    }

    group.finish();
}

fn benchmark_missing_key(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bench.hos");
    populate(&path, 10000);
    let reader = HosReader::open(&path).unwrap();

    c.bench_function("missing_key", |b| {
        b.iter(|| {
            let value = reader.get(b"absent-key").unwrap();
            black_box(value);
        });
    });
}

fn benchmark_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");

    for size in [1000, 10000].iter() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bench.hos");
        populate(&path, *size);
        let reader = HosReader::open(&path).unwrap();

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let count = reader.entries().unwrap().filter(|entry| entry.is_ok()).count();
                black_box(count);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_sequential_get,
    benchmark_random_get,
    benchmark_missing_key,
    benchmark_scan
);
criterion_main!(benches);
