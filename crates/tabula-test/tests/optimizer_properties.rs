//! Properties that hold across optimizer and execution settings: the
//! optimized plan returns the same rows as the unoptimized one, streaming
//! returns the same rows as whole-source execution, and a limit stops the
//! scan early.

use std::sync::Arc;

use tabula_query::optimizer::OptimizerConfig;
use tabula_query::physical::ExecutionContext;
use tabula_query::source::{CountingSource, MemorySource};
use tabula_query::{col, lit, EngineConfig, LazyFrame, SessionContext, SortExpr};
use tabula_test::utils::{rendered_rows, session, session_with_config};

const QUERIES: &[&str] = &[
    "SELECT * FROM sales",
    "SELECT town FROM sales WHERE value > 60",
    "SELECT town, value FROM sales WHERE 1 = 1 AND year = 2020",
    "SELECT year, avg(value) AS mean, count(*) AS n FROM sales GROUP BY year",
    "SELECT town, sum(value) AS total FROM sales GROUP BY town HAVING sum(value) > 120",
    "SELECT s.year, t.Address FROM sales s JOIN towns t ON s.town = t.town WHERE s.value < 150",
    "SELECT t.town, s.value FROM towns t LEFT JOIN sales s ON t.town = s.town WHERE t.town <> 'B'",
    "SELECT town FROM sales UNION ALL SELECT town FROM towns",
    "SELECT big.town FROM (SELECT town, value * 2 AS v FROM sales) big WHERE big.v > 150",
    "SELECT town, value FROM sales ORDER BY value DESC LIMIT 2",
    "SELECT town, value FROM sales LIMIT 2 OFFSET 1",
    "SELECT value, rank() OVER (ORDER BY value DESC) AS r FROM sales WHERE year = 2020",
    "SELECT town, row_number() OVER (PARTITION BY town ORDER BY year) AS n FROM sales LIMIT 2",
    "SELECT DISTINCT year FROM sales",
    "SELECT CASE WHEN value > 1 + 1 THEN upper(town) ELSE 'x' END AS c FROM sales",
];

fn unoptimized() -> SessionContext {
    session_with_config(EngineConfig {
        optimizer: OptimizerConfig::minimal(),
        ..EngineConfig::for_testing()
    })
    .unwrap()
}

#[test]
fn test_optimized_plans_return_the_same_rows() {
    let plain = unoptimized();
    let optimized = session().unwrap();

    for query in QUERIES {
        let expected = plain.sql(query).unwrap().collect().unwrap();
        let actual = optimized.sql(query).unwrap().collect().unwrap();
        assert_eq!(actual.column_names(), expected.column_names(), "{query}");
        assert_eq!(rendered_rows(&actual), rendered_rows(&expected), "{query}");
    }
}

#[test]
fn test_optimized_frames_return_the_same_rows() {
    let build = |ctx: &SessionContext| {
        ctx.table("sales")
            .unwrap()
            .with_columns(vec![col("value").mul(lit(10)).alias("scaled")])
            .unwrap()
            .filter(col("town").eq(lit("A")))
            .unwrap()
            .with_window(vec![col("scaled")
                .sum()
                .over(vec![col("town")])
                .alias("town_total")])
            .unwrap()
            .filter(col("year").gt(lit(2019)))
            .unwrap()
            .select(vec![col("year"), col("town_total")])
            .unwrap()
    };

    let expected = build(&unoptimized()).collect().unwrap();
    let frame = build(&session().unwrap());
    assert_eq!(frame.collect().unwrap(), expected);
    // The filter above the window must not move below it.
    assert_eq!(rendered_rows(&expected), vec!["(2020, 1500)"]);
}

#[test]
fn test_streaming_matches_whole_source_execution() {
    let ctx = session().unwrap();
    for query in QUERIES {
        let frame = ctx.sql(query).unwrap();
        let streamed = frame.collect_with(true, None).unwrap();
        let whole = frame.collect_with(false, None).unwrap();
        assert_eq!(streamed, whole, "{query}");
    }
}

fn counted_numbers(rows: usize) -> (CountingSource, LazyFrame) {
    let cells: Vec<[String; 2]> = (0..rows)
        .map(|i| [i.to_string(), (i % 7).to_string()])
        .collect();
    let raw = cells
        .iter()
        .map(|[a, b]| vec![Some(a.clone()), Some(b.clone())])
        .collect();
    let inner = MemorySource::new("numbers", vec!["n".into(), "m".into()], raw);
    let source = CountingSource::new(Arc::new(inner));
    let frame =
        LazyFrame::scan_with_config(Arc::new(source.clone()), Arc::new(EngineConfig::for_testing()))
            .unwrap();
    // Inference sampled the source; only execution counts from here.
    source.reset();
    (source, frame)
}

#[test]
fn test_fetch_pulls_exactly_k_rows() {
    let (source, frame) = counted_numbers(100);

    let df = frame.fetch(5).unwrap();
    assert_eq!(df.height(), 5);
    assert_eq!(source.pulled(), 5);
    assert_eq!(source.opened(), 1);

    source.reset();
    let df = frame
        .clone()
        .select(vec![col("n")])
        .unwrap()
        .limit(3)
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(df.height(), 3);
    assert_eq!(source.pulled(), 3);
}

#[test]
fn test_limit_over_filter_stops_within_one_chunk() {
    let (source, frame) = counted_numbers(100);
    let batch_size = EngineConfig::for_testing().execution.batch_size;

    let df = frame
        .filter(col("n").gt_eq(lit(0)))
        .unwrap()
        .fetch(5)
        .unwrap();
    assert_eq!(df.height(), 5);
    assert!(source.pulled() >= 5);
    assert!(
        source.pulled() <= 5 + batch_size,
        "pulled {} rows",
        source.pulled()
    );
}

#[test]
fn test_sort_reads_everything_but_returns_k() {
    let (source, frame) = counted_numbers(40);
    let df = frame
        .sort(vec![SortExpr::desc(col("n"))])
        .unwrap()
        .fetch(2)
        .unwrap();
    assert_eq!(df.height(), 2);
    assert_eq!(source.pulled(), 40);
    assert_eq!(rendered_rows(&df), vec!["(39, 4)", "(38, 3)"]);
}

#[test]
fn test_cancelled_context_stops_execution() {
    let (source, frame) = counted_numbers(10);
    let ctx = ExecutionContext::default();
    ctx.cancel();
    assert!(frame.collect_in(ctx, None).is_err());
    assert_eq!(source.pulled(), 0);
}

#[test]
fn test_metrics_report_pulled_rows() {
    let (_source, frame) = counted_numbers(10);
    let (df, metrics) = frame
        .filter(col("m").eq(lit(0)))
        .unwrap()
        .collect_in(ExecutionContext::default(), None)
        .unwrap();
    assert_eq!(df.height(), 2);
    assert_eq!(metrics.rows_pulled, 10);
}
