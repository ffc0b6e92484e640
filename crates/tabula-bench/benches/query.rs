//! Query engine benchmarks for Tabula.
//!
//! Benchmarks for:
//! - SQL parsing
//! - Plan optimization
//! - Query execution, streaming and whole-source
//! - Limit pushdown

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tabula_bench::utils::sales_session;
use tabula_query::optimizer::{Optimizer, OptimizerConfig};
use tabula_query::parser::Parser;

/// Queries of varying complexity over the `sales` table.
fn queries() -> Vec<(&'static str, &'static str)> {
    vec![
        ("select_star", "SELECT * FROM sales"),
        ("select_where", "SELECT town, value FROM sales WHERE year = 2020"),
        (
            "group_by_mean",
            "SELECT year, avg(value) AS mean FROM sales GROUP BY year",
        ),
        (
            "order_limit",
            "SELECT town, value FROM sales ORDER BY value DESC LIMIT 10",
        ),
        (
            "dense_rank",
            "SELECT town, value, dense_rank() OVER (PARTITION BY year ORDER BY value DESC) AS r FROM sales",
        ),
        (
            "self_join",
            "SELECT a.town, b.value FROM sales a JOIN sales b ON a.date = b.date WHERE a.year = 2016",
        ),
    ]
}

/// Benchmark SQL parsing.
fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("query/parse");

    for (name, sql) in queries() {
        group.bench_with_input(BenchmarkId::new("query", name), &sql, |b, sql| {
            b.iter(|| black_box(Parser::parse(black_box(sql))));
        });
    }

    group.finish();
}

/// Benchmark the optimizer on bound plans.
fn bench_optimize(c: &mut Criterion) {
    let mut group = c.benchmark_group("query/optimize");
    let ctx = sales_session(10).expect("session");
    let optimizer = Optimizer::new(OptimizerConfig::default());

    for (name, sql) in queries() {
        let plan = ctx.sql(sql).expect("bind failed").logical_plan();
        group.bench_with_input(BenchmarkId::new("query", name), &plan, |b, plan| {
            b.iter(|| black_box(optimizer.optimize(plan.clone())));
        });
    }

    group.finish();
}

/// Benchmark end-to-end execution in both modes.
fn bench_execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("query/execute");
    group.sample_size(20);
    let ctx = sales_session(20_000).expect("session");

    for (name, sql) in queries() {
        let frame = ctx.sql(sql).expect("bind failed");
        for streaming in [true, false] {
            let id = format!("{}/{}", name, if streaming { "streaming" } else { "whole" });
            group.bench_function(BenchmarkId::from_parameter(id), |b| {
                b.iter(|| black_box(frame.collect_with(streaming, None).map(|df| df.height())));
            });
        }
    }

    group.finish();
}

/// Benchmark how much a pushed-down limit saves.
fn bench_fetch(c: &mut Criterion) {
    let mut group = c.benchmark_group("query/fetch");
    let ctx = sales_session(50_000).expect("session");
    let frame = ctx
        .sql("SELECT town, value * 2 AS doubled FROM sales")
        .expect("bind failed");

    for k in [10, 1_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(k), k, |b, &k| {
            b.iter(|| black_box(frame.fetch(k).map(|df| df.height())));
        });
    }
    group.bench_function("all", |b| {
        b.iter(|| black_box(frame.collect().map(|df| df.height())));
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_optimize, bench_execute, bench_fetch);
criterion_main!(benches);
