//! Grouped aggregation and pivoting.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use super::{
    compare_values, evaluate_expr, Accumulator, ExecutionResult, Operator, RecordBatch,
    Row, RowBuffer, Value,
};
use crate::logical::{AggregateFunc, Schema};
use crate::parser::DataType;
use crate::physical::{PhysicalAggregateExpr, PhysicalExpr};

/// Groups in first-seen order.
#[derive(Debug)]
struct Groups<S> {
    index: HashMap<Vec<Value>, usize>,
    entries: Vec<(Vec<Value>, S)>,
}

impl<S> Groups<S> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }

    fn get_or_insert_with(&mut self, key: Vec<Value>, init: impl FnOnce() -> S) -> &mut S {
        let pos = match self.index.get(&key) {
            Some(&pos) => pos,
            None => {
                let pos = self.entries.len();
                self.index.insert(key.clone(), pos);
                self.entries.push((key, init()));
                pos
            }
        };
        &mut self.entries[pos].1
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Hash aggregate operator for grouping and aggregation.
///
/// Only accumulator state is kept per group. Without group keys the whole
/// input forms one group, so empty input still yields one row.
#[derive(Debug)]
pub struct HashAggregateExec {
    /// Child operator.
    child: Box<dyn Operator>,
    /// Group by expressions.
    group_by: Vec<PhysicalExpr>,
    /// Aggregate calls.
    aggregates: Vec<PhysicalAggregateExpr>,
    /// Output expressions over the group row.
    output_exprs: Vec<PhysicalExpr>,
    /// Output schema.
    schema: Arc<Schema>,
    /// Output batch size.
    batch_size: usize,
    /// Results.
    results: Option<RowBuffer>,
}

impl HashAggregateExec {
    /// Creates a new hash aggregate operator.
    pub fn new(
        child: Box<dyn Operator>,
        group_by: Vec<PhysicalExpr>,
        aggregates: Vec<PhysicalAggregateExpr>,
        output_exprs: Vec<PhysicalExpr>,
        schema: Arc<Schema>,
        batch_size: usize,
    ) -> Self {
        Self {
            child,
            group_by,
            aggregates,
            output_exprs,
            schema,
            batch_size,
            results: None,
        }
    }

    fn aggregate(&mut self) -> ExecutionResult<Vec<Row>> {
        let mut groups: Groups<Vec<Accumulator>> = Groups::new();
        let new_accumulators = |aggregates: &[PhysicalAggregateExpr]| {
            aggregates.iter().map(Accumulator::new).collect::<Vec<_>>()
        };

        while let Some(batch) = self.child.next_batch()? {
            for row in batch.rows() {
                let key = self
                    .group_by
                    .iter()
                    .map(|e| evaluate_expr(e, &row))
                    .collect::<ExecutionResult<Vec<_>>>()?;

                let accumulators =
                    groups.get_or_insert_with(key, || new_accumulators(&self.aggregates));
                for (acc, agg) in accumulators.iter_mut().zip(&self.aggregates) {
                    let value = match &agg.arg {
                        Some(arg) => evaluate_expr(arg, &row)?,
                        None => Value::Boolean(true),
                    };
                    acc.accumulate(&value)?;
                }
            }
        }

        if self.group_by.is_empty() && groups.len() == 0 {
            groups.get_or_insert_with(Vec::new(), || new_accumulators(&self.aggregates));
        }
        trace!(groups = groups.len(), "aggregation finished");

        let mut rows = Vec::with_capacity(groups.len());
        for (key, accumulators) in groups.entries {
            let mut group_row = Row::new(key.clone());
            group_row.extend(accumulators.iter().map(|a| a.result()));

            let mut out = Row::new(key);
            for expr in &self.output_exprs {
                out.push(evaluate_expr(expr, &group_row)?);
            }
            rows.push(out);
        }
        Ok(rows)
    }
}

impl Operator for HashAggregateExec {
    fn schema(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    fn next_batch(&mut self) -> ExecutionResult<Option<RecordBatch>> {
        if self.results.is_none() {
            let rows = self.aggregate()?;
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

/// Pivot operator: one output row per distinct index key, one column per
/// declared pivot value.
///
/// Cells with several input rows are combined with the aggregate; cells
/// with none are null. Rows whose pivot value was not declared are
/// dropped.
#[derive(Debug)]
pub struct PivotExec {
    /// Child operator.
    child: Box<dyn Operator>,
    /// Index column positions.
    index: Vec<usize>,
    /// Pivot column position.
    on: usize,
    /// Value column position.
    values: usize,
    /// Declared pivot values.
    on_values: Vec<Value>,
    /// Aggregate for cells.
    aggregate: AggregateFunc,
    /// Type of the pivoted cells.
    value_type: DataType,
    /// Output schema.
    schema: Arc<Schema>,
    /// Output batch size.
    batch_size: usize,
    /// Results.
    results: Option<RowBuffer>,
}

impl PivotExec {
    /// Creates a new pivot operator.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        child: Box<dyn Operator>,
        index: Vec<usize>,
        on: usize,
        values: usize,
        on_values: Vec<Value>,
        aggregate: AggregateFunc,
        value_type: DataType,
        schema: Arc<Schema>,
        batch_size: usize,
    ) -> Self {
        Self {
            child,
            index,
            on,
            values,
            on_values,
            aggregate,
            value_type,
            schema,
            batch_size,
            results: None,
        }
    }

    fn column_of(&self, value: &Value) -> ExecutionResult<Option<usize>> {
        for (i, declared) in self.on_values.iter().enumerate() {
            let matches = match (value.is_null(), declared.is_null()) {
                (true, true) => true,
                (false, false) => compare_values(value, declared)?.is_eq(),
                _ => false,
            };
            if matches {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    fn pivot(&mut self) -> ExecutionResult<Vec<Row>> {
        let width = self.on_values.len();
        let mut groups: Groups<Vec<Option<Accumulator>>> = Groups::new();

        while let Some(batch) = self.child.next_batch()? {
            for row in batch.rows() {
                let key = row.project(&self.index).into_values();
                let column = self.column_of(row.value(self.on))?;
                let cells = groups.get_or_insert_with(key, || vec![None; width]);
                if let Some(column) = column {
                    let aggregate = self.aggregate;
                    let value_type = &self.value_type;
                    cells[column]
                        .get_or_insert_with(|| {
                            Accumulator::for_function(aggregate, false, value_type)
                        })
                        .accumulate(row.value(self.values))?;
                }
            }
        }
        trace!(rows = groups.len(), columns = width, "pivot finished");

        Ok(groups
            .entries
            .into_iter()
            .map(|(key, cells)| {
                let mut out = Row::new(key);
                out.extend(
                    cells
                        .iter()
                        .map(|c| c.as_ref().map(|a| a.result()).unwrap_or(Value::Null)),
                );
                out
            })
            .collect())
    }
}

impl Operator for PivotExec {
    fn schema(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    fn next_batch(&mut self) -> ExecutionResult<Option<RecordBatch>> {
        if self.results.is_none() {
            let rows = self.pivot()?;
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

/// Collects the distinct values of one column in first-seen order, for
/// pivots whose columns are discovered from the data.
pub fn distinct_values(batches: &[RecordBatch], column: usize) -> Vec<Value> {
    let mut seen = Groups::<()>::new();
    for batch in batches {
        if let Some(col) = batch.column(column) {
            for value in col.iter() {
                seen.get_or_insert_with(vec![value.clone()], || ());
            }
        }
    }
    seen.entries
        .into_iter()
        .filter_map(|(mut key, _)| key.pop())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{drain_rows, ValuesExec};
    use crate::logical::{BinaryOp, Field};
    use crate::physical::ExecutionContext;

    fn sales() -> Box<dyn Operator> {
        let schema = Arc::new(Schema::new(vec![
            Field::nullable("year", DataType::Int64),
            Field::nullable("town", DataType::Utf8),
            Field::nullable("amount", DataType::Int64),
        ]));
        let rows = [
            (2020, "A", Some(100)),
            (2019, "A", Some(50)),
            (2020, "B", Some(200)),
            (2020, "A", None),
        ]
        .into_iter()
        .map(|(y, t, a)| Row::new(vec![Value::int(y), Value::string(t), Value::from(a)]))
        .collect();
        Box::new(ValuesExec::new(schema, Arc::new(rows), ExecutionContext::default()))
    }

    fn agg(func: AggregateFunc, arg: Option<usize>, data_type: DataType) -> PhysicalAggregateExpr {
        PhysicalAggregateExpr {
            func,
            arg: arg.map(|i| PhysicalExpr::column(format!("c{}", i), i)),
            distinct: false,
            name: func.to_string(),
            data_type,
        }
    }

    #[test]
    fn test_group_by_first_seen_order() {
        let schema = Arc::new(Schema::new(vec![
            Field::nullable("year", DataType::Int64),
            Field::nullable("mean", DataType::Float64),
            Field::nullable("n", DataType::Int64),
        ]));
        let mut exec = HashAggregateExec::new(
            sales(),
            vec![PhysicalExpr::column("year", 0)],
            vec![
                agg(AggregateFunc::Mean, Some(2), DataType::Float64),
                agg(AggregateFunc::CountStar, None, DataType::Int64),
            ],
            vec![PhysicalExpr::column("__agg_0", 1), PhysicalExpr::column("__agg_1", 2)],
            schema,
            1024,
        );
        let rows = drain_rows(&mut exec).unwrap();
        assert_eq!(
            rows[0].values(),
            &[Value::int(2020), Value::float(150.0), Value::int(3)]
        );
        assert_eq!(
            rows[1].values(),
            &[Value::int(2019), Value::float(50.0), Value::int(1)]
        );
    }

    #[test]
    fn test_composite_output_expression() {
        let schema = Arc::new(Schema::new(vec![Field::nullable("avg", DataType::Float64)]));
        let output = PhysicalExpr::binary(
            PhysicalExpr::column("__agg_0", 0),
            BinaryOp::Divide,
            PhysicalExpr::column("__agg_1", 1),
        );
        let mut exec = HashAggregateExec::new(
            sales(),
            vec![],
            vec![
                agg(AggregateFunc::Sum, Some(2), DataType::Int64),
                agg(AggregateFunc::Count, Some(2), DataType::Int64),
            ],
            vec![output],
            schema,
            1024,
        );
        let rows = drain_rows(&mut exec).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value(0), &Value::float(350.0 / 3.0));
    }

    #[test]
    fn test_global_aggregate_on_empty_input() {
        let schema = Arc::new(Schema::new(vec![Field::nullable("x", DataType::Int64)]));
        let input = Box::new(ValuesExec::new(
            schema.clone(),
            Arc::new(vec![]),
            ExecutionContext::default(),
        ));
        let out_schema = Arc::new(Schema::new(vec![
            Field::nullable("n", DataType::Int64),
            Field::nullable("s", DataType::Int64),
        ]));
        let mut exec = HashAggregateExec::new(
            input,
            vec![],
            vec![
                agg(AggregateFunc::Count, Some(0), DataType::Int64),
                agg(AggregateFunc::Sum, Some(0), DataType::Int64),
            ],
            vec![PhysicalExpr::column("__agg_0", 0), PhysicalExpr::column("__agg_1", 1)],
            out_schema,
            1024,
        );
        let rows = drain_rows(&mut exec).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value(0), &Value::int(0));
        assert!(rows[0].value(1).is_null());
    }

    #[test]
    fn test_pivot() {
        let schema = Arc::new(Schema::new(vec![
            Field::nullable("town", DataType::Utf8),
            Field::nullable("2020", DataType::Int64),
            Field::nullable("2019", DataType::Int64),
            Field::nullable("2018", DataType::Int64),
        ]));
        let mut exec = PivotExec::new(
            sales(),
            vec![1],
            0,
            2,
            vec![Value::int(2020), Value::int(2019), Value::int(2018)],
            AggregateFunc::Sum,
            DataType::Int64,
            schema,
            1024,
        );
        let rows = drain_rows(&mut exec).unwrap();
        assert_eq!(
            rows[0].values(),
            &[Value::string("A"), Value::int(100), Value::int(50), Value::Null]
        );
        assert_eq!(
            rows[1].values(),
            &[Value::string("B"), Value::int(200), Value::Null, Value::Null]
        );
    }

    #[test]
    fn test_distinct_values() {
        let mut input = sales();
        let batches: Vec<_> = std::iter::from_fn(|| input.next_batch().unwrap()).collect();
        assert_eq!(
            distinct_values(&batches, 0),
            vec![Value::int(2020), Value::int(2019)]
        );
    }
}
