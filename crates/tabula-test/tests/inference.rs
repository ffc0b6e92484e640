//! Schema inference through the session: sampling, strictness, quoting,
//! null tokens and temporal detection.

use std::sync::Arc;

use tabula_query::source::{InferenceError, InferenceOptions, MemorySource, SchemaInferencer};
use tabula_query::{
    CsvReadOptions, CsvSource, DataType, EngineConfig, QueryError, SessionContext, Value,
};
use tabula_test::utils::{column, rendered_rows, CsvDir};

fn types(ctx: &SessionContext, table: &str) -> Vec<DataType> {
    ctx.table_schema(table)
        .unwrap()
        .fields()
        .iter()
        .map(|f| f.data_type.clone())
        .collect()
}

fn with_inference(inference: InferenceOptions) -> SessionContext {
    SessionContext::with_config(EngineConfig {
        inference,
        ..EngineConfig::default()
    })
    .unwrap()
}

#[test]
fn test_csv_types_are_inferred() {
    let dir = CsvDir::new().unwrap();
    let path = dir
        .write(
            "sales.csv",
            "year,town,value,flag,day\n\
             2020,A,100,true,2020-01-01\n\
             2020,B,2.5,false,2020-01-02\n\
             2019,A,NA,,2019-12-31\n",
        )
        .unwrap();

    let ctx = SessionContext::new();
    ctx.register_csv("sales", &path).unwrap();
    assert_eq!(
        types(&ctx, "sales"),
        vec![
            DataType::Int64,
            DataType::Utf8,
            DataType::Float64,
            DataType::Boolean,
            DataType::Date
        ]
    );

    let df = ctx
        .sql("SELECT value, flag, day FROM sales")
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(
        rendered_rows(&df),
        vec![
            "(100.0, true, 2020-01-01)",
            "(2.5, false, 2020-01-02)",
            "(null, null, 2019-12-31)"
        ]
    );
}

#[test]
fn test_inference_converges_once_sample_covers_all_rows() {
    let rows: Vec<Vec<String>> = (0..20)
        .map(|i| {
            let value = if i == 17 { "1.5".to_string() } else { i.to_string() };
            vec![i.to_string(), value]
        })
        .collect();
    let rows: Vec<Vec<&str>> = rows
        .iter()
        .map(|r| r.iter().map(String::as_str).collect())
        .collect();
    let rows: Vec<&[&str]> = rows.iter().map(Vec::as_slice).collect();
    let source = MemorySource::from_strs("t", &["id", "value"], &rows);

    let infer = |sample_size| {
        SchemaInferencer::new(InferenceOptions {
            sample_size,
            ..InferenceOptions::default()
        })
        .infer(&source)
        .unwrap()
    };

    // Too small a sample misses the float on row 18.
    assert_eq!(infer(10).fields()[1].data_type, DataType::Int64);

    let full = infer(20);
    assert_eq!(full.fields()[1].data_type, DataType::Float64);
    for n in [21, 50, 1000] {
        assert_eq!(infer(n), full);
    }
}

#[test]
fn test_short_sample_fails_at_collection() {
    let source = MemorySource::from_strs("t", &["n"], &[&["1"], &["2"], &["x"]]);
    let ctx = with_inference(InferenceOptions {
        sample_size: 2,
        ..InferenceOptions::default()
    });
    ctx.register_source("t", Arc::new(source)).unwrap();

    assert_eq!(types(&ctx, "t"), vec![DataType::Int64]);
    let err = ctx.sql("SELECT n FROM t").unwrap().collect().unwrap_err();
    assert!(matches!(err, QueryError::Cast { .. }), "got {err}");
}

fn csv(text: &'static str) -> Arc<CsvSource> {
    Arc::new(CsvSource::from_bytes("t", text.as_bytes(), CsvReadOptions::default()))
}

#[test]
fn test_quoted_conflict_errors_when_strict_and_widens_when_permissive() {
    let source = csv("id,code\n1,10\n2,\"abc\"\n");

    let strict = SessionContext::new();
    let err = strict.register_source("t", source.clone()).unwrap_err();
    assert!(
        matches!(
            err,
            QueryError::SchemaInference(InferenceError::ConflictingTypes { ref column, ref types })
                if column == "code" && types == &vec![DataType::Int64, DataType::Utf8]
        ),
        "got {err}"
    );
    assert!(strict.table("t").is_err());

    let permissive = with_inference(InferenceOptions {
        strict: false,
        ..InferenceOptions::default()
    });
    permissive.register_source("t", source).unwrap();
    assert_eq!(types(&permissive, "t"), vec![DataType::Int64, DataType::Utf8]);

    let df = permissive.table("t").unwrap().collect().unwrap();
    assert_eq!(
        column(&df, "code"),
        vec![Value::string("10"), Value::string("abc")]
    );
}

#[test]
fn test_unquoted_codes_mixed_with_text_load_as_text() {
    let ctx = SessionContext::new();
    ctx.register_source(
        "sales",
        csv("Serial,NonUseCode\n1,25\n2,07 - Change in Property\n"),
    )
    .unwrap();
    assert_eq!(types(&ctx, "sales"), vec![DataType::Int64, DataType::Utf8]);

    let df = ctx.table("sales").unwrap().collect().unwrap();
    assert_eq!(
        column(&df, "NonUseCode"),
        vec![Value::string("25"), Value::string("07 - Change in Property")]
    );
}

#[test]
fn test_booleans_widen_into_integers() {
    let ctx = SessionContext::new();
    ctx.register_source("t", csv("a,b\ntrue,x\n1,y\n")).unwrap();
    assert_eq!(types(&ctx, "t"), vec![DataType::Int64, DataType::Utf8]);

    let df = ctx.table("t").unwrap().collect().unwrap();
    assert_eq!(column(&df, "a"), vec![Value::int(1), Value::int(1)]);
}

#[test]
fn test_overlong_row_is_an_inference_error() {
    let source = csv("a,b\n1,2,3\n");

    let err = SessionContext::new()
        .register_source("t", source.clone())
        .unwrap_err();
    assert!(
        matches!(
            err,
            QueryError::SchemaInference(InferenceError::RowLength { row: 1, expected: 2, found: 3 })
        ),
        "got {err}"
    );
    assert_eq!(
        err.to_string(),
        "Cannot infer schema: row 1 has 3 fields, expected 2"
    );

    let permissive = with_inference(InferenceOptions {
        strict: false,
        ..InferenceOptions::default()
    });
    permissive.register_source("t", source).unwrap();
    assert_eq!(types(&permissive, "t"), vec![DataType::Int64, DataType::Int64]);
}

#[test]
fn test_ignore_errors_nulls_undecodable_cells() {
    let dir = CsvDir::new().unwrap();
    let path = dir.write("t.csv", "a\n1\nxyz\n").unwrap();
    let config = |ignore_errors| EngineConfig {
        inference: InferenceOptions {
            sample_size: 1,
            ..InferenceOptions::default()
        },
        csv: CsvReadOptions {
            ignore_errors,
            ..CsvReadOptions::default()
        },
        ..EngineConfig::default()
    };

    let strict = SessionContext::with_config(config(false)).unwrap();
    strict.register_csv("t", &path).unwrap();
    assert_eq!(types(&strict, "t"), vec![DataType::Int64]);
    let err = strict.table("t").unwrap().collect().unwrap_err();
    assert!(matches!(err, QueryError::Cast { .. }), "got {err}");

    let lenient = SessionContext::with_config(config(true)).unwrap();
    lenient.register_csv("t", &path).unwrap();
    let df = lenient.table("t").unwrap().collect().unwrap();
    assert_eq!(rendered_rows(&df), vec!["(1)", "(null)"]);
}

#[test]
fn test_int_and_float_widen_without_conflict() {
    let source = MemorySource::from_strs("t", &["x", "d"], &[
        &["1", "2021-01-01"],
        &["2.5", "2021-01-02 08:30:00"],
    ]);
    let ctx = SessionContext::new();
    ctx.register_source("t", Arc::new(source)).unwrap();
    assert_eq!(types(&ctx, "t"), vec![DataType::Float64, DataType::Datetime]);
}

#[test]
fn test_custom_null_tokens() {
    let source = Arc::new(MemorySource::from_strs(
        "t",
        &["n"],
        &[&["1"], &["-"], &["3"]],
    ));

    // "-" is not a default null token, so the column is text.
    let ctx = SessionContext::new();
    ctx.register_source("t", source.clone()).unwrap();
    assert_eq!(types(&ctx, "t"), vec![DataType::Utf8]);

    let ctx = with_inference(InferenceOptions {
        null_values: vec!["-".to_string()],
        ..InferenceOptions::default()
    });
    ctx.register_source("t", source).unwrap();
    assert_eq!(types(&ctx, "t"), vec![DataType::Int64]);

    let df = ctx
        .sql("SELECT sum(n) AS total, count(n) AS present FROM t")
        .unwrap()
        .collect()
        .unwrap();
    assert_eq!(rendered_rows(&df), vec!["(4, 2)"]);
}

#[test]
fn test_all_null_column_is_text() {
    let source = MemorySource::from_strs("t", &["a", "b"], &[&["1", ""], &["2", "NA"]]);
    let ctx = SessionContext::new();
    ctx.register_source("t", Arc::new(source)).unwrap();
    assert_eq!(types(&ctx, "t"), vec![DataType::Int64, DataType::Utf8]);
}
