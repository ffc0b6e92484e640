//! End-to-end SQL tests.
//!
//! Each test registers the fixture tables, runs a query through parsing,
//! binding, optimization and streaming execution, and checks the rows.

use std::sync::Arc;

use tabula_query::source::MemorySource;
use tabula_query::{QueryError, Value};
use tabula_test::utils::{column, rendered_rows, session};

fn sorted(mut rows: Vec<String>) -> Vec<String> {
    rows.sort();
    rows
}

#[test]
fn test_group_by_year_mean() {
    let ctx = session().unwrap();
    let df = ctx
        .sql("SELECT year, avg(value) AS mean FROM sales GROUP BY year")
        .unwrap()
        .collect()
        .unwrap();

    assert_eq!(df.column_names(), vec!["year", "mean"]);
    assert_eq!(rendered_rows(&df), vec!["(2020, 150.0)", "(2019, 50.0)"]);
}

#[test]
fn test_where_order_limit() {
    let ctx = session().unwrap();

    let df = ctx
        .sql("SELECT town, value FROM sales WHERE year = 2020 AND value > 150")
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(rendered_rows(&df), vec!["(B, 200)"]);

    let df = ctx
        .sql("SELECT town, value FROM sales ORDER BY value DESC LIMIT 2")
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(rendered_rows(&df), vec!["(B, 200)", "(A, 100)"]);
}

#[test]
fn test_inner_join_keeps_left_order() {
    let ctx = session().unwrap();
    let df = ctx
        .sql("SELECT s.year, t.Address FROM sales s JOIN towns t ON s.town = t.town")
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(
        rendered_rows(&df),
        vec!["(2020, 1 High St)", "(2020, 2 Low Rd)", "(2019, 1 High St)"]
    );
}

#[test]
fn test_left_join_null_fills() {
    let ctx = session().unwrap();
    let df = ctx
        .sql("SELECT t.town, s.value FROM towns t LEFT JOIN sales s ON t.town = s.town")
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(
        sorted(rendered_rows(&df)),
        vec!["(A, 100)", "(A, 50)", "(B, 200)", "(C, null)"]
    );
}

#[test]
fn test_inner_join_without_overlap_is_empty() {
    let ctx = session().unwrap();
    ctx.register_source(
        "depots",
        Arc::new(MemorySource::from_strs(
            "depots",
            &["depot", "Address"],
            &[&["north", "9 Far Way"], &["south", "8 Near Cl"]],
        )),
    )
    .unwrap();

    let df = ctx
        .sql("SELECT t.town, d.depot FROM towns t JOIN depots d ON t.Address = d.Address")
        .unwrap()
        .collect()
        .unwrap();
    assert!(df.is_empty());
    assert_eq!(df.width(), 2);
}

#[test]
fn test_union_all_and_distinct() {
    let ctx = session().unwrap();

    let df = ctx
        .sql("SELECT town FROM sales UNION ALL SELECT town FROM towns")
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(df.height(), 6);

    let df = ctx
        .sql("SELECT DISTINCT town FROM sales")
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(rendered_rows(&df), vec!["(A)", "(B)"]);
}

#[test]
fn test_case_in_between() {
    let ctx = session().unwrap();

    let df = ctx
        .sql("SELECT CASE WHEN value >= 100 THEN 'big' ELSE 'small' END AS size FROM sales")
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(
        column(&df, "size"),
        vec![Value::string("big"), Value::string("big"), Value::string("small")]
    );

    let df = ctx
        .sql("SELECT town FROM sales WHERE town IN ('B', 'C')")
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(df.height(), 1);

    let df = ctx
        .sql("SELECT town FROM sales WHERE value BETWEEN 50 AND 100")
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(df.height(), 2);
}

#[test]
fn test_having() {
    let ctx = session().unwrap();
    let df = ctx
        .sql("SELECT town, count(*) AS n FROM sales GROUP BY town HAVING count(*) > 1")
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(rendered_rows(&df), vec!["(A, 2)"]);
}

#[test]
fn test_subquery_in_from() {
    let ctx = session().unwrap();
    let df = ctx
        .sql(
            "SELECT big.town FROM (SELECT town, value FROM sales WHERE value > 60) big \
             WHERE big.value < 150",
        )
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(rendered_rows(&df), vec!["(A)"]);
}

#[test]
fn test_dense_rank_over_sql() {
    let ctx = session().unwrap();
    ctx.register_source(
        "prices",
        Arc::new(MemorySource::from_strs(
            "prices",
            &["price"],
            &[&["300"], &["300"], &["200"], &["100"]],
        )),
    )
    .unwrap();

    let df = ctx
        .sql("SELECT price, dense_rank() OVER (ORDER BY price DESC) AS r FROM prices")
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(
        column(&df, "r"),
        vec![Value::int(1), Value::int(1), Value::int(2), Value::int(3)]
    );
}

#[test]
fn test_integer_division_by_zero_is_null() {
    let ctx = session().unwrap();
    let df = ctx
        .sql("SELECT value / 0 AS d FROM sales")
        .unwrap()
        .collect()
        .unwrap();
    assert!(column(&df, "d").iter().all(Value::is_null));
}

#[test]
fn test_bad_cast_fails_collection() {
    let ctx = session().unwrap();
    let err = ctx
        .sql("SELECT CAST(town AS BIGINT) AS n FROM sales")
        .unwrap()
        .collect()
        .unwrap_err();
    assert!(matches!(err, QueryError::Cast { .. }), "got {err}");
}

#[test]
fn test_build_time_errors() {
    let ctx = session().unwrap();
    assert!(matches!(
        ctx.sql("SELECT price FROM sales").unwrap_err(),
        QueryError::UnknownColumn { .. }
    ));
    assert!(matches!(
        ctx.sql("SELECT * FROM nowhere").unwrap_err(),
        QueryError::Plan(_)
    ));
    assert!(matches!(
        ctx.sql("SELECT town FROM sales s JOIN towns t ON s.town = t.town").unwrap_err(),
        QueryError::Plan(_)
    ));
    assert!(matches!(
        ctx.sql("SELEC town FROM sales").unwrap_err(),
        QueryError::Parse(_)
    ));
}
