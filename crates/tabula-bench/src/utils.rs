//! Benchmark utilities and helpers.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tabula_query::source::MemorySource;
use tabula_query::{SessionContext, TabulaResult};

const TOWNS: [&str; 8] = [
    "Aberdeen", "Bristol", "Cardiff", "Dundee", "Exeter", "Falkirk", "Glasgow", "Hull",
];

/// Generates sales records `(year, town, date, value)` with a fixed seed.
/// Dates are ascending so the output can drive rolling windows.
pub fn generate_sales(count: usize) -> Vec<[String; 4]> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count)
        .map(|i| {
            let year = 2015 + (i * 10 / count.max(1)) as i64;
            let day = 1 + (i % 28);
            let month = 1 + (i / 28) % 12;
            [
                year.to_string(),
                TOWNS[rng.gen_range(0..TOWNS.len())].to_string(),
                format!("{}-{:02}-{:02}", year, month, day),
                rng.gen_range(50_000..900_000).to_string(),
            ]
        })
        .collect()
}

/// Renders sales records as CSV text with a header.
pub fn sales_csv(count: usize) -> String {
    let mut out = String::from("year,town,date,value\n");
    for row in generate_sales(count) {
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

/// Builds an in-memory source over generated sales records.
pub fn sales_source(count: usize) -> Arc<MemorySource> {
    let columns = ["year", "town", "date", "value"].map(String::from).to_vec();
    let rows = generate_sales(count)
        .into_iter()
        .map(|r| r.into_iter().map(Some).collect())
        .collect();
    Arc::new(MemorySource::new("sales", columns, rows))
}

/// Creates a session with a `sales` table of `count` generated rows.
pub fn sales_session(count: usize) -> TabulaResult<SessionContext> {
    let ctx = SessionContext::new();
    ctx.register_source("sales", sales_source(count))?;
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_sales_is_deterministic() {
        assert_eq!(generate_sales(50), generate_sales(50));
        assert_eq!(sales_csv(3).lines().count(), 4);
    }

    #[test]
    fn test_sales_session_infers_types() {
        let ctx = sales_session(100).unwrap();
        let schema = ctx.table_schema("sales").unwrap();
        assert_eq!(schema.fields()[2].data_type.to_string(), "date");
        assert_eq!(schema.fields()[3].data_type.to_string(), "i64");
    }
}
