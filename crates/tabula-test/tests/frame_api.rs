//! End-to-end tests of the builder API: grouping, joins, reshaping,
//! windows, rolling aggregates and concatenation.

use std::sync::Arc;

use tabula_query::logical::RankMethod;
use tabula_query::source::MemorySource;
use tabula_query::{
    col, count_star, lit, AggregateFunc, JoinOptions, JoinType, LazyFrame, QueryError, SortExpr,
    UnionMode, Value,
};
use tabula_test::utils::{column, rendered_rows, session, towns_source};

fn frame(name: &str, columns: &[&str], rows: &[&[&str]]) -> LazyFrame {
    LazyFrame::scan(Arc::new(MemorySource::from_strs(name, columns, rows))).unwrap()
}

#[test]
fn test_group_by_mean_matches_expected() {
    let df = session()
        .unwrap()
        .table("sales")
        .unwrap()
        .group_by(vec![col("year")])
        .agg(vec![col("value").mean().alias("mean")])
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(column(&df, "year"), vec![Value::int(2020), Value::int(2019)]);
    assert_eq!(column(&df, "mean"), vec![Value::float(150.0), Value::float(50.0)]);
}

#[test]
fn test_single_group_equals_global_aggregate() {
    let sales = session().unwrap().table("sales").unwrap();
    let aggs = || {
        vec![
            col("value").sum().alias("total"),
            col("value").mean().alias("mean"),
            col("value").median().alias("median"),
            col("value").min().alias("low"),
            col("value").max().alias("high"),
            col("town").n_unique().alias("towns"),
            count_star().alias("n"),
        ]
    };

    let global = sales.clone().group_by(vec![]).agg(aggs()).unwrap().collect().unwrap();
    let grouped = sales
        .with_columns(vec![lit(1).alias("all")])
        .unwrap()
        .group_by(vec![col("all")])
        .agg(aggs())
        .unwrap()
        .select(vec![
            col("total"),
            col("mean"),
            col("median"),
            col("low"),
            col("high"),
            col("towns"),
            col("n"),
        ])
        .unwrap()
        .collect()
        .unwrap();

    assert_eq!(global.height(), 1);
    assert_eq!(global.rows(), grouped.rows());
}

#[test]
fn test_global_aggregate_over_empty_input() {
    let df = session()
        .unwrap()
        .table("sales")
        .unwrap()
        .filter(col("year").gt(lit(3000)))
        .unwrap()
        .group_by(vec![])
        .agg(vec![count_star().alias("n"), col("value").sum().alias("total")])
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(rendered_rows(&df), vec!["(0, null)"]);
}

#[test]
fn test_implode_groups_values() {
    let df = session()
        .unwrap()
        .table("sales")
        .unwrap()
        .group_by(vec![col("town")])
        .agg(vec![col("value").implode().alias("values")])
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(rendered_rows(&df), vec!["(A, [100, 50])", "(B, [200])"]);
}

#[test]
fn test_join_without_overlap_and_missing_key() {
    let towns = LazyFrame::scan(towns_source()).unwrap();
    let depots = frame(
        "depots",
        &["depot", "Address"],
        &[&["north", "9 Far Way"], &["south", "8 Near Cl"]],
    );

    let df = towns
        .clone()
        .join(depots, vec![col("Address")], vec![col("Address")], JoinType::Inner)
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(df.height(), 0);
    assert_eq!(df.column_names(), vec!["town", "Address", "depot", "Address_right"]);

    let sales = session().unwrap().table("sales").unwrap();
    let err = towns
        .join(sales, vec![col("Address")], vec![col("Address")], JoinType::Inner)
        .unwrap_err();
    assert!(
        matches!(err, QueryError::JoinKey { ref side, .. } if side == "right"),
        "got {err}"
    );
}

#[test]
fn test_null_keys_match_only_when_requested() {
    let left = frame("left", &["k", "l"], &[&["1", "a"], &["", "b"]]);
    let right = frame("right", &["k", "r"], &[&["1", "x"], &["", "y"]]);

    let df = left
        .clone()
        .join(right.clone(), vec![col("k")], vec![col("k")], JoinType::Inner)
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(column(&df, "l"), vec![Value::string("a")]);

    let df = left
        .join_with_options(
            right,
            vec![col("k")],
            vec![col("k")],
            JoinType::Inner,
            JoinOptions {
                nulls_equal: true,
                ..JoinOptions::default()
            },
        )
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(column(&df, "l"), vec![Value::string("a"), Value::string("b")]);
    assert_eq!(column(&df, "r"), vec![Value::string("x"), Value::string("y")]);
}

#[test]
fn test_semi_and_anti_join() {
    let towns = LazyFrame::scan(towns_source()).unwrap();
    let sales = session().unwrap().table("sales").unwrap();

    let semi = towns
        .clone()
        .join(sales.clone(), vec![col("town")], vec![col("town")], JoinType::Semi)
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(column(&semi, "town"), vec![Value::string("A"), Value::string("B")]);

    let anti = towns
        .join(sales, vec![col("town")], vec![col("town")], JoinType::Anti)
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(column(&anti, "town"), vec![Value::string("C")]);
}

#[test]
fn test_melt_then_pivot_round_trips() {
    let wide = frame(
        "scores",
        &["id", "q1", "q2"],
        &[&["1", "10", "11"], &["2", "20", ""], &["3", "30", "31"]],
    );

    let long = wide
        .clone()
        .melt(&["id"], &["q1", "q2"])
        .unwrap();
    assert_eq!(
        long.schema().names(),
        vec!["id", "variable", "value"]
    );
    assert_eq!(long.collect().unwrap().height(), 6);

    let back = long
        .pivot(
            &["id"],
            "variable",
            "value",
            vec![Value::string("q1"), Value::string("q2")],
            AggregateFunc::First,
        )
        .unwrap()
        .collect()
        .unwrap();

    let original = wide.collect().unwrap();
    assert_eq!(back.column_names(), original.column_names());
    assert_eq!(back.rows(), original.rows());
}

#[test]
fn test_pivot_discovers_values_in_first_seen_order() {
    let df = session().unwrap().table("sales").unwrap().collect().unwrap();
    let wide = df
        .pivot(&["year"], "town", "value", AggregateFunc::Sum)
        .unwrap();
    assert_eq!(wide.column_names(), vec!["year", "A", "B"]);
    assert_eq!(rendered_rows(&wide), vec!["(2020, 100, 200)", "(2019, 50, null)"]);
}

#[test]
fn test_dense_rank_descending() {
    let prices = frame("prices", &["price"], &[&["300"], &["300"], &["200"], &["100"]]);
    let df = prices
        .with_window(vec![col("price").rank(RankMethod::Dense, true).alias("r")])
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(
        column(&df, "r"),
        vec![Value::int(1), Value::int(1), Value::int(2), Value::int(3)]
    );
}

#[test]
fn test_max_and_average_rank_ties() {
    let prices = frame("prices", &["price"], &[&["200"], &["300"], &["100"], &["300"]]);
    let df = prices
        .with_window(vec![
            col("price").rank(RankMethod::Max, true).alias("max"),
            col("price").rank(RankMethod::Average, true).alias("avg"),
        ])
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(
        column(&df, "max"),
        vec![Value::int(3), Value::int(2), Value::int(4), Value::int(2)]
    );
    assert_eq!(
        column(&df, "avg"),
        vec![
            Value::float(3.0),
            Value::float(1.5),
            Value::float(4.0),
            Value::float(1.5)
        ]
    );
}

#[test]
fn test_lead_follows_window_order() {
    let readings = frame(
        "readings",
        &["day", "reading"],
        &[&["3", "30"], &["1", "10"], &["2", "20"]],
    );
    let by_day = || vec![SortExpr::asc(col("day"))];
    let df = readings
        .with_window(vec![
            col("reading").lead(1).order_by(by_day()).alias("next"),
            col("reading").lead(2).order_by(by_day()).alias("after_next"),
        ])
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(
        column(&df, "next"),
        vec![Value::Null, Value::int(20), Value::int(30)]
    );
    assert_eq!(
        column(&df, "after_next"),
        vec![Value::Null, Value::int(30), Value::Null]
    );
}

#[test]
fn test_window_partitions_and_lag() {
    let df = session()
        .unwrap()
        .table("sales")
        .unwrap()
        .with_window(vec![
            col("value").sum().over(vec![col("town")]).alias("town_total"),
            col("value")
                .lag(1)
                .over(vec![col("town")])
                .order_by(vec![SortExpr::asc(col("year"))])
                .alias("previous"),
        ])
        .unwrap()
        .collect()
        .unwrap();

    assert_eq!(
        column(&df, "town_total"),
        vec![Value::int(150), Value::int(200), Value::int(150)]
    );
    // Rows keep their input order; A's 2020 row follows its 2019 row.
    assert_eq!(
        column(&df, "previous"),
        vec![Value::int(50), Value::Null, Value::Null]
    );
}

#[test]
fn test_rolling_mean_over_isolated_dates() {
    let readings = frame(
        "readings",
        &["date", "value"],
        &[
            &["2021-01-01", "10"],
            &["2021-01-10", "20"],
            &["2021-01-11", "40"],
            &["2021-02-01", "7"],
        ],
    );
    let df = readings
        .rolling("date", "3d", &[], vec![col("value").mean().alias("mean_3d")])
        .unwrap()
        .collect()
        .unwrap();

    assert_eq!(
        column(&df, "mean_3d"),
        vec![
            Value::float(10.0),
            Value::float(20.0),
            Value::float(30.0),
            Value::float(7.0)
        ]
    );
}

#[test]
fn test_rolling_rejects_unsorted_index() {
    let readings = frame(
        "readings",
        &["date", "value"],
        &[&["2021-01-05", "1"], &["2021-01-01", "2"]],
    );
    let err = readings
        .rolling("date", "2d", &[], vec![col("value").sum().alias("total")])
        .unwrap()
        .collect()
        .unwrap_err();
    assert!(
        matches!(err, QueryError::UnsortedIndex { ref column } if column == "date"),
        "got {err}"
    );
}

#[test]
fn test_concat_modes() {
    let a = frame("a", &["x", "y"], &[&["1", "p"]]);
    let b = frame("b", &["x", "y"], &[&["2", "q"]]);
    let c = frame("c", &["x", "y", "z"], &[&["3.5", "7", "true"]]);

    let vertical = LazyFrame::concat(vec![a.clone(), b], UnionMode::Vertical)
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(rendered_rows(&vertical), vec!["(1, p)", "(2, q)"]);

    // Column counts differ, and y is text on one side and integer on the other.
    assert!(LazyFrame::concat(vec![a.clone(), c.clone()], UnionMode::Vertical).is_err());
    assert!(LazyFrame::concat(vec![a.clone(), c.clone()], UnionMode::Diagonal).is_err());

    let relaxed = LazyFrame::concat(vec![a, c], UnionMode::DiagonalRelaxed)
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(relaxed.column_names(), vec!["x", "y", "z"]);
    assert_eq!(
        rendered_rows(&relaxed),
        vec!["(1.0, p, null)", "(3.5, 7, true)"]
    );
}

#[test]
fn test_sort_is_stable_and_multi_key() {
    let df = session()
        .unwrap()
        .table("sales")
        .unwrap()
        .sort(vec![SortExpr::asc(col("town")), SortExpr::desc(col("year"))])
        .unwrap()
        .select(vec![col("town"), col("year")])
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(
        rendered_rows(&df),
        vec!["(A, 2020)", "(A, 2019)", "(B, 2020)"]
    );
}

#[test]
fn test_filter_requires_boolean() {
    let err = session()
        .unwrap()
        .table("sales")
        .unwrap()
        .filter(col("value").add(lit(1)))
        .unwrap_err();
    assert!(matches!(err, QueryError::TypeMismatch { .. }), "got {err}");
}
