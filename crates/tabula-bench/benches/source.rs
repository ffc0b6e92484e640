//! Source benchmarks for Tabula.
//!
//! Benchmarks for:
//! - CSV scanning
//! - Schema inference at different sample sizes

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tabula_bench::utils::sales_csv;
use tabula_query::source::{CsvReadOptions, CsvSource, InferenceOptions, RowSource, SchemaInferencer};
use tabula_query::LazyFrame;

/// Benchmark a full pass over raw CSV records.
fn bench_csv_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("source/csv_scan");

    for size in [1_000, 10_000, 100_000].iter() {
        let bytes: Arc<[u8]> = sales_csv(*size).into_bytes().into();

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let source = CsvSource::from_bytes("sales", bytes.clone(), CsvReadOptions::default());
                let rows = source.open().expect("open failed").count();
                black_box(rows)
            });
        });
    }

    group.finish();
}

/// Benchmark schema inference as the sample grows.
fn bench_inference(c: &mut Criterion) {
    let mut group = c.benchmark_group("source/infer");
    let bytes: Arc<[u8]> = sales_csv(100_000).into_bytes().into();

    for sample_size in [100, 1_000, 10_000].iter() {
        let inferencer = SchemaInferencer::new(InferenceOptions {
            sample_size: *sample_size,
            ..InferenceOptions::default()
        });

        group.bench_with_input(
            BenchmarkId::from_parameter(sample_size),
            sample_size,
            |b, _| {
                b.iter(|| {
                    let source =
                        CsvSource::from_bytes("sales", bytes.clone(), CsvReadOptions::default());
                    black_box(inferencer.infer(&source).expect("inference failed"))
                });
            },
        );
    }

    group.finish();
}

/// Benchmark decoding typed rows through a scan.
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("source/decode");
    let size = 50_000;
    let bytes: Arc<[u8]> = sales_csv(size).into_bytes().into();

    group.throughput(Throughput::Elements(size as u64));
    group.bench_function("collect", |b| {
        b.iter(|| {
            let source = CsvSource::from_bytes("sales", bytes.clone(), CsvReadOptions::default());
            let df = LazyFrame::scan(Arc::new(source))
                .expect("scan failed")
                .collect()
                .expect("collect failed");
            black_box(df.height())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_csv_scan, bench_inference, bench_decode);
criterion_main!(benches);
