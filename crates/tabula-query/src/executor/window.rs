//! Window function and rolling aggregate execution.
//!
//! Both operators buffer their whole input: partitions interleave in
//! arrival order, so no partition is complete before the input ends.
//! Output rows keep the input order, with the computed columns appended.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use super::{
    compare_sort_keys, drain_rows, evaluate_expr, sort_key, Accumulator, ExecutionError,
    ExecutionResult, Operator, RecordBatch, Row, RowBuffer, Value,
};
use crate::logical::{RankMethod, Schema, WindowFunc};
use crate::physical::{PhysicalAggregateExpr, PhysicalWindowExpr};

/// Splits row positions into partitions, in first-seen order.
fn partition_rows<F>(num_rows: usize, mut key_of: F) -> ExecutionResult<Vec<Vec<usize>>>
where
    F: FnMut(usize) -> ExecutionResult<Vec<Value>>,
{
    let mut index: HashMap<Vec<Value>, usize> = HashMap::new();
    let mut partitions: Vec<Vec<usize>> = Vec::new();
    for i in 0..num_rows {
        let key = key_of(i)?;
        let pos = *index.entry(key).or_insert_with(|| {
            partitions.push(Vec::new());
            partitions.len() - 1
        });
        partitions[pos].push(i);
    }
    Ok(partitions)
}

/// Window operator.
#[derive(Debug)]
pub struct WindowExec {
    /// Child operator.
    child: Box<dyn Operator>,
    /// Window expressions.
    window_exprs: Vec<PhysicalWindowExpr>,
    /// Output schema.
    schema: Arc<Schema>,
    /// Output batch size.
    batch_size: usize,
    /// Results.
    results: Option<RowBuffer>,
}

impl WindowExec {
    /// Creates a new window operator.
    pub fn new(
        child: Box<dyn Operator>,
        window_exprs: Vec<PhysicalWindowExpr>,
        schema: Arc<Schema>,
        batch_size: usize,
    ) -> Self {
        Self {
            child,
            window_exprs,
            schema,
            batch_size,
            results: None,
        }
    }

    fn compute(&mut self) -> ExecutionResult<Vec<Row>> {
        let mut rows = drain_rows(self.child.as_mut())?;
        let columns = self
            .window_exprs
            .iter()
            .map(|expr| evaluate_window(expr, &rows))
            .collect::<ExecutionResult<Vec<_>>>()?;
        trace!(rows = rows.len(), exprs = columns.len(), "window evaluated");

        for column in columns {
            for (row, value) in rows.iter_mut().zip(column) {
                row.push(value);
            }
        }
        Ok(rows)
    }
}

impl Operator for WindowExec {
    fn schema(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    fn next_batch(&mut self) -> ExecutionResult<Option<RecordBatch>> {
        if self.results.is_none() {
            let rows = self.compute()?;
            self.results = Some(RowBuffer::new(rows));
        }
        match self.results.as_mut() {
            Some(results) => results.next_batch(&self.schema, self.batch_size),
            None => Ok(None),
        }
    }

    fn reset(&mut self) {
        self.child.reset();
        self.results = None;
    }
}

/// Evaluates one window expression, returning a value per input row.
pub fn evaluate_window(expr: &PhysicalWindowExpr, rows: &[Row]) -> ExecutionResult<Vec<Value>> {
    let partitions = partition_rows(rows.len(), |i| {
        expr.partition_by
            .iter()
            .map(|p| evaluate_expr(p, &rows[i]))
            .collect()
    })?;

    let mut output = vec![Value::Null; rows.len()];
    for mut partition in partitions {
        let keys = partition
            .iter()
            .map(|&i| sort_key(&expr.order_by, &rows[i]))
            .collect::<ExecutionResult<Vec<_>>>()?;
        let mut order: Vec<usize> = (0..partition.len()).collect();
        order.sort_by(|&a, &b| compare_sort_keys(&keys[a], &keys[b], &expr.order_by));
        let sorted_keys: Vec<&Vec<Value>> = order.iter().map(|&o| &keys[o]).collect();
        partition = order.iter().map(|&o| partition[o]).collect();

        let values = evaluate_partition(expr, rows, &partition, &sorted_keys)?;
        for (&i, value) in partition.iter().zip(values) {
            output[i] = value;
        }
    }
    Ok(output)
}

/// Returns the end (exclusive) of each position's peer group.
fn peer_group_ends(keys: &[&Vec<Value>], expr: &PhysicalWindowExpr) -> Vec<usize> {
    let mut ends = vec![keys.len(); keys.len()];
    let mut start = 0;
    for i in 1..=keys.len() {
        if i == keys.len()
            || compare_sort_keys(keys[i - 1], keys[i], &expr.order_by) != Ordering::Equal
        {
            for end in &mut ends[start..i] {
                *end = i;
            }
            start = i;
        }
    }
    ends
}

fn evaluate_partition(
    expr: &PhysicalWindowExpr,
    rows: &[Row],
    partition: &[usize],
    keys: &[&Vec<Value>],
) -> ExecutionResult<Vec<Value>> {
    let n = partition.len();
    let ends = peer_group_ends(keys, expr);

    match expr.func {
        WindowFunc::RowNumber => Ok((1..=n as i64).map(Value::Int64).collect()),

        WindowFunc::Rank(method) => {
            let mut values = Vec::with_capacity(n);
            let mut dense = 0i64;
            let mut group_start = 0;
            for pos in 0..n {
                if pos == 0 || ends[pos - 1] == pos {
                    dense += 1;
                    group_start = pos;
                }
                let first = group_start as i64 + 1;
                let last = ends[pos] as i64;
                values.push(match method {
                    RankMethod::Dense => Value::Int64(dense),
                    RankMethod::Min => Value::Int64(first),
                    RankMethod::Max => Value::Int64(last),
                    RankMethod::Ordinal => Value::Int64(pos as i64 + 1),
                    RankMethod::Average => Value::Float64((first + last) as f64 / 2.0),
                });
            }
            Ok(values)
        }

        WindowFunc::Lag | WindowFunc::Lead => {
            let value_expr = expr.args.first().ok_or_else(|| {
                ExecutionError::Internal(format!("{} requires an argument", expr.func))
            })?;
            let mut values = Vec::with_capacity(n);
            for pos in 0..n {
                let row = &rows[partition[pos]];
                let offset = match expr.args.get(1) {
                    Some(offset) => evaluate_expr(offset, row)?.to_i64().unwrap_or(1),
                    None => 1,
                };
                let target = if expr.func == WindowFunc::Lag {
                    (pos as i64).checked_sub(offset)
                } else {
                    (pos as i64).checked_add(offset)
                };
                let value = match target.and_then(|t| usize::try_from(t).ok()).filter(|&t| t < n) {
                    Some(t) => evaluate_expr(value_expr, &rows[partition[t]])?,
                    None => match expr.args.get(2) {
                        Some(default) => evaluate_expr(default, row)?,
                        None => Value::Null,
                    },
                };
                values.push(value);
            }
            Ok(values)
        }

        WindowFunc::Aggregate(func) => {
            let inputs = partition
                .iter()
                .map(|&i| match expr.args.first() {
                    Some(arg) => evaluate_expr(arg, &rows[i]),
                    None => Ok(Value::Boolean(true)),
                })
                .collect::<ExecutionResult<Vec<_>>>()?;
            let mut acc = Accumulator::for_function(func, false, &expr.data_type);

            if expr.order_by.is_empty() {
                for value in &inputs {
                    acc.accumulate(value)?;
                }
                return Ok(vec![acc.result(); n]);
            }

            // Running frame up to and including the current peer group.
            let mut values = Vec::with_capacity(n);
            let mut consumed = 0;
            for pos in 0..n {
                while consumed < ends[pos] {
                    acc.accumulate(&inputs[consumed])?;
                    consumed += 1;
                }
                values.push(acc.result());
            }
            Ok(values)
        }
    }
}

/// Rolling aggregate operator.
///
/// Each row's window holds the rows of its group whose index lies in
/// `(t - span, t]`, where `t` is the row's own index value.
#[derive(Debug)]
pub struct RollingExec {
    /// Child operator.
    child: Box<dyn Operator>,
    /// Index column position.
    index: usize,
    /// Index column name.
    index_name: String,
    /// Window length in index units.
    span: i64,
    /// Group column positions.
    group_by: Vec<usize>,
    /// Aggregates.
    aggregates: Vec<PhysicalAggregateExpr>,
    /// Output schema.
    schema: Arc<Schema>,
    /// Output batch size.
    batch_size: usize,
    /// Results.
    results: Option<RowBuffer>,
}

impl RollingExec {
    /// Creates a new rolling operator.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        child: Box<dyn Operator>,
        index: usize,
        index_name: String,
        span: i64,
        group_by: Vec<usize>,
        aggregates: Vec<PhysicalAggregateExpr>,
        schema: Arc<Schema>,
        batch_size: usize,
    ) -> Self {
        Self {
            child,
            index,
            index_name,
            span,
            group_by,
            aggregates,
            schema,
            batch_size,
            results: None,
        }
    }

    fn unsorted(&self) -> ExecutionError {
        ExecutionError::UnsortedIndex {
            column: self.index_name.clone(),
        }
    }

    fn compute(&mut self) -> ExecutionResult<Vec<Row>> {
        let mut rows = drain_rows(self.child.as_mut())?;
        let partitions = partition_rows(rows.len(), |i| Ok(rows[i].project(&self.group_by).into_values()))?;
        let mut results: Vec<Vec<Value>> = vec![Vec::new(); rows.len()];

        for partition in partitions {
            let mut positions = Vec::with_capacity(partition.len());
            for &i in &partition {
                let t = rows[i]
                    .value(self.index)
                    .index_position()
                    .ok_or_else(|| self.unsorted())?;
                if positions.last().is_some_and(|&prev| t < prev) {
                    return Err(self.unsorted());
                }
                positions.push(t);
            }

            let inputs = self
                .aggregates
                .iter()
                .map(|agg| {
                    partition
                        .iter()
                        .map(|&i| match &agg.arg {
                            Some(arg) => evaluate_expr(arg, &rows[i]),
                            None => Ok(Value::Boolean(true)),
                        })
                        .collect::<ExecutionResult<Vec<_>>>()
                })
                .collect::<ExecutionResult<Vec<_>>>()?;

            let mut start = 0;
            let mut end = 0;
            for (pos, &t) in positions.iter().enumerate() {
                let lower = t.saturating_sub(self.span);
                while end < positions.len() && positions[end] <= t {
                    end += 1;
                }
                while start < end && positions[start] <= lower {
                    start += 1;
                }

                for (agg, values) in self.aggregates.iter().zip(&inputs) {
                    let mut acc = Accumulator::new(agg);
                    for value in &values[start..end] {
                        acc.accumulate(value)?;
                    }
                    results[partition[pos]].push(acc.result());
                }
            }
        }
        trace!(rows = rows.len(), span = self.span, "rolling evaluated");

        for (row, values) in rows.iter_mut().zip(results) {
            row.extend(values);
        }
        Ok(rows)
    }
}

impl Operator for RollingExec {
    fn schema(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    fn next_batch(&mut self) -> ExecutionResult<Option<RecordBatch>> {
        if self.results.is_none() {
            let rows = self.compute()?;
            self.results = Some(RowBuffer::new(rows));
        }
        match self.results.as_mut() {
            Some(results) => results.next_batch(&self.schema, self.batch_size),
            None => Ok(None),
        }
    }

    fn reset(&mut self) {
        self.child.reset();
        self.results = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ValuesExec;
    use crate::logical::{AggregateFunc, Field};
    use crate::parser::DataType;
    use crate::physical::{ExecutionContext, PhysicalExpr, PhysicalSortExpr};

    fn rows(values: &[(&str, i64)]) -> Vec<Row> {
        values
            .iter()
            .map(|(k, v)| Row::new(vec![Value::string(*k), Value::int(*v)]))
            .collect()
    }

    fn window(func: WindowFunc, partition: bool, ordered: bool, data_type: DataType) -> PhysicalWindowExpr {
        PhysicalWindowExpr {
            func,
            args: match func {
                WindowFunc::Aggregate(_) | WindowFunc::Lag => vec![PhysicalExpr::column("v", 1)],
                _ => vec![],
            },
            partition_by: if partition {
                vec![PhysicalExpr::column("k", 0)]
            } else {
                vec![]
            },
            order_by: if ordered {
                vec![PhysicalSortExpr {
                    expr: PhysicalExpr::column("v", 1),
                    asc: false,
                    nulls_first: false,
                }]
            } else {
                vec![]
            },
            name: "w".into(),
            data_type,
        }
    }

    #[test]
    fn test_dense_rank_descending() {
        let input = rows(&[("a", 300), ("a", 300), ("a", 200), ("a", 100)]);
        let expr = window(WindowFunc::Rank(RankMethod::Dense), false, true, DataType::Int64);
        let ranks = evaluate_window(&expr, &input).unwrap();
        assert_eq!(ranks, vec![Value::int(1), Value::int(1), Value::int(2), Value::int(3)]);
    }

    #[test]
    fn test_rank_methods() {
        let input = rows(&[("a", 100), ("a", 300), ("a", 300), ("a", 200)]);
        let min = window(WindowFunc::Rank(RankMethod::Min), false, true, DataType::Int64);
        assert_eq!(
            evaluate_window(&min, &input).unwrap(),
            vec![Value::int(4), Value::int(1), Value::int(1), Value::int(3)]
        );
        let avg = window(WindowFunc::Rank(RankMethod::Average), false, true, DataType::Float64);
        assert_eq!(evaluate_window(&avg, &input).unwrap()[1], Value::float(1.5));
    }

    #[test]
    fn test_partitioned_aggregate_without_order() {
        let input = rows(&[("a", 1), ("b", 10), ("a", 3)]);
        let expr = window(WindowFunc::Aggregate(AggregateFunc::Sum), true, false, DataType::Int64);
        assert_eq!(
            evaluate_window(&expr, &input).unwrap(),
            vec![Value::int(4), Value::int(10), Value::int(4)]
        );
    }

    #[test]
    fn test_running_aggregate_includes_peers() {
        let input = rows(&[("a", 1), ("a", 3), ("a", 3)]);
        let expr = window(WindowFunc::Aggregate(AggregateFunc::Sum), false, true, DataType::Int64);
        // Descending: 3 and 3 are peers, so both see 6.
        assert_eq!(
            evaluate_window(&expr, &input).unwrap(),
            vec![Value::int(7), Value::int(6), Value::int(6)]
        );
    }

    #[test]
    fn test_lag() {
        let input = rows(&[("a", 1), ("a", 3), ("a", 2)]);
        let mut expr = window(WindowFunc::Lag, false, true, DataType::Int64);
        expr.args.push(PhysicalExpr::literal(1i64));
        // Ordered descending: 3, 2, 1.
        assert_eq!(
            evaluate_window(&expr, &input).unwrap(),
            vec![Value::int(2), Value::Null, Value::int(3)]
        );
    }

    fn rolling(input: Vec<Row>, span: i64) -> ExecutionResult<Vec<Row>> {
        let schema = Arc::new(Schema::new(vec![
            Field::nullable("date", DataType::Date),
            Field::nullable("v", DataType::Float64),
        ]));
        let out_schema = Arc::new(Schema::new(vec![
            Field::nullable("date", DataType::Date),
            Field::nullable("v", DataType::Float64),
            Field::nullable("mean", DataType::Float64),
        ]));
        let child = Box::new(ValuesExec::new(schema, Arc::new(input), ExecutionContext::default()));
        let mut exec = RollingExec::new(
            child,
            0,
            "date".into(),
            span,
            vec![],
            vec![PhysicalAggregateExpr {
                func: AggregateFunc::Mean,
                arg: Some(PhysicalExpr::column("v", 1)),
                distinct: false,
                name: "mean".into(),
                data_type: DataType::Float64,
            }],
            out_schema,
            1024,
        );
        drain_rows(&mut exec)
    }

    #[test]
    fn test_rolling_mean() {
        let input = vec![
            Row::new(vec![Value::date(2020, 1, 1), Value::float(1.0)]),
            Row::new(vec![Value::date(2020, 1, 2), Value::float(2.0)]),
            Row::new(vec![Value::date(2020, 1, 3), Value::float(6.0)]),
            Row::new(vec![Value::date(2020, 1, 4), Value::float(4.0)]),
            Row::new(vec![Value::date(2020, 2, 1), Value::float(9.0)]),
        ];
        let out = rolling(input, 3).unwrap();
        let means: Vec<_> = out.iter().map(|r| r.value(2).clone()).collect();
        assert_eq!(
            means,
            vec![
                Value::float(1.0),
                Value::float(1.5),
                Value::float(3.0),
                Value::float(4.0),
                Value::float(9.0)
            ]
        );
    }

    #[test]
    fn test_rolling_rejects_unsorted_index() {
        let input = vec![
            Row::new(vec![Value::date(2020, 1, 2), Value::float(1.0)]),
            Row::new(vec![Value::date(2020, 1, 1), Value::float(2.0)]),
        ];
        assert!(matches!(
            rolling(input, 3),
            Err(ExecutionError::UnsortedIndex { column }) if column == "date"
        ));

        let input = vec![Row::new(vec![Value::Null, Value::float(1.0)])];
        assert!(matches!(rolling(input, 3), Err(ExecutionError::UnsortedIndex { .. })));
    }
}
