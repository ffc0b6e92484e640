//! Operator execution implementations.
//!
//! This module implements executable operators that consume and produce
//! record batches in a pull-based iterator model.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use tracing::trace;

use super::{
    evaluate_expr, evaluate_predicate, is_true, ExecutionError, ExecutionResult, RecordBatch,
    RecordBatchBuilder, Row, Value,
};
use crate::logical::Schema;
use crate::parser::DataType;
use crate::physical::{ExecutionContext, PhysicalExpr, PhysicalSortExpr, SeqScanOperator};
use crate::source::{decode_cell, DecodeOptions, RowSource, RowStream, SourceError};

/// Trait for executable operators.
pub trait Operator: std::fmt::Debug {
    /// Returns the output schema.
    fn schema(&self) -> Arc<Schema>;

    /// Returns the next batch of results, or None if exhausted.
    fn next_batch(&mut self) -> ExecutionResult<Option<RecordBatch>>;

    /// Resets the operator to its initial state.
    fn reset(&mut self);
}

/// Pulls every remaining row out of an operator.
pub(crate) fn drain_rows(op: &mut dyn Operator) -> ExecutionResult<Vec<Row>> {
    let mut rows = Vec::new();
    while let Some(batch) = op.next_batch()? {
        rows.extend(batch.rows());
    }
    Ok(rows)
}

/// Materialized rows handed out one batch at a time.
#[derive(Debug, Default)]
pub(crate) struct RowBuffer {
    rows: Vec<Row>,
    pos: usize,
}

impl RowBuffer {
    pub(crate) fn new(rows: Vec<Row>) -> Self {
        Self { rows, pos: 0 }
    }

    pub(crate) fn next_batch(
        &mut self,
        schema: &Arc<Schema>,
        batch_size: usize,
    ) -> ExecutionResult<Option<RecordBatch>> {
        if self.pos >= self.rows.len() {
            return Ok(None);
        }
        let end = self.pos.saturating_add(batch_size.max(1)).min(self.rows.len());
        let rows = self.rows[self.pos..end].to_vec();
        self.pos = end;
        RecordBatch::from_rows(schema.clone(), rows).map(Some)
    }
}

/// Evaluates sort keys for a row.
pub(crate) fn sort_key(order_by: &[PhysicalSortExpr], row: &Row) -> ExecutionResult<Vec<Value>> {
    order_by.iter().map(|s| evaluate_expr(&s.expr, row)).collect()
}

/// Compares two sort keys. Null placement is independent of direction.
pub(crate) fn compare_sort_keys(a: &[Value], b: &[Value], order_by: &[PhysicalSortExpr]) -> Ordering {
    for ((a_val, b_val), sort) in a.iter().zip(b).zip(order_by) {
        let cmp = match (a_val.is_null(), b_val.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if sort.nulls_first => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if sort.nulls_first => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) if sort.asc => a_val.cmp(b_val),
            (false, false) => b_val.cmp(a_val),
        };
        if cmp != Ordering::Equal {
            return cmp;
        }
    }
    Ordering::Equal
}

/// Stable sort of rows by the given keys.
pub(crate) fn sort_rows(rows: Vec<Row>, order_by: &[PhysicalSortExpr]) -> ExecutionResult<Vec<Row>> {
    let mut keyed = rows
        .into_iter()
        .map(|row| Ok((sort_key(order_by, &row)?, row)))
        .collect::<ExecutionResult<Vec<_>>>()?;
    keyed.sort_by(|(a, _), (b, _)| compare_sort_keys(a, b, order_by));
    Ok(keyed.into_iter().map(|(_, row)| row).collect())
}

/// Converts a value to the declared column type when the two differ.
pub(crate) fn conform(value: Value, data_type: &DataType) -> ExecutionResult<Value> {
    if value.is_null() || data_type.is_null() || &value.data_type() == data_type {
        Ok(value)
    } else {
        value.cast(data_type)
    }
}

/// Sequential scan operator that decodes rows from a source.
///
/// Cells are decoded only for the projected columns. Pushed-down filters
/// run before a row is counted against the limit, and once the limit is
/// reached no further row is pulled.
pub struct SeqScanExec {
    /// Output schema.
    schema: Arc<Schema>,
    /// Table name.
    table_name: String,
    /// Row source.
    source: Arc<dyn RowSource>,
    /// Full table schema.
    table_schema: Arc<Schema>,
    /// Table columns to decode.
    projection: Vec<usize>,
    /// Filters bound to the projected row.
    filters: Vec<PhysicalExpr>,
    /// Maximum rows to emit.
    limit: Option<usize>,
    /// Cell decoding options.
    decode: DecodeOptions,
    /// Execution context.
    ctx: ExecutionContext,
    /// Open pass over the source.
    stream: Option<RowStream>,
    /// Rows read so far, for error messages.
    rows_read: usize,
    /// Rows emitted so far.
    emitted: usize,
    /// Whether the scan is exhausted.
    done: bool,
}

impl std::fmt::Debug for SeqScanExec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeqScanExec")
            .field("schema", &self.schema)
            .field("table_name", &self.table_name)
            .field("source", &self.source)
            .field("table_schema", &self.table_schema)
            .field("projection", &self.projection)
            .field("filters", &self.filters)
            .field("limit", &self.limit)
            .field("decode", &self.decode)
            .field("ctx", &self.ctx)
            .field("stream_open", &self.stream.is_some())
            .field("rows_read", &self.rows_read)
            .field("emitted", &self.emitted)
            .field("done", &self.done)
            .finish()
    }
}

impl SeqScanExec {
    /// Creates a scan from its physical description.
    pub fn from_physical(op: &SeqScanOperator, ctx: ExecutionContext) -> Self {
        Self {
            schema: op.projected_schema.clone(),
            table_name: op.table_name.clone(),
            source: Arc::clone(&op.source),
            table_schema: op.table_schema.clone(),
            projection: op.projection.clone(),
            filters: op.filters.clone(),
            limit: op.limit,
            decode: op.decode.clone(),
            ctx,
            stream: None,
            rows_read: 0,
            emitted: 0,
            done: false,
        }
    }

    fn limit_reached(&self) -> bool {
        self.limit.is_some_and(|limit| self.emitted >= limit)
    }

    fn read_chunk(&mut self) -> ExecutionResult<RecordBatch> {
        let batch_size = self.ctx.config.scan_batch_size();
        let mut builder = RecordBatchBuilder::new(self.schema.clone());
        let mut pulled = 0;

        while builder.num_rows() < batch_size && !self.limit_reached() {
            let Some(stream) = self.stream.as_mut() else {
                break;
            };
            let Some(raw) = stream.next() else {
                self.done = true;
                self.stream = None;
                break;
            };
            let raw = raw?;
            pulled += 1;
            self.rows_read += 1;
            if self.rows_read % 1024 == 0 {
                self.ctx.check_cancelled()?;
            }

            let row = self.decode_row(raw)?;
            let mut keep = true;
            for filter in &self.filters {
                if !is_true(&evaluate_expr(filter, &row)?)? {
                    keep = false;
                    break;
                }
            }
            if keep {
                builder.append_row(row)?;
                self.emitted += 1;
            }
        }

        self.ctx.metrics().add_rows_pulled(pulled);
        trace!(
            table = %self.table_name,
            pulled,
            rows = builder.num_rows(),
            "scan chunk"
        );
        builder.build()
    }

    fn decode_row(&self, raw: Vec<Option<String>>) -> ExecutionResult<Row> {
        let expected = self.table_schema.len();
        if raw.len() > expected && !self.decode.ignore_errors {
            return Err(SourceError::RowLength {
                row: self.rows_read,
                expected,
                found: raw.len(),
            }
            .into());
        }
        let values = self
            .projection
            .iter()
            .map(|&i| {
                let data_type = self
                    .table_schema
                    .field(i)
                    .map(|f| f.data_type.clone())
                    .unwrap_or(DataType::Utf8);
                let cell = raw.get(i).and_then(|c| c.as_deref());
                decode_cell(cell, &data_type, &self.decode)
            })
            .collect::<ExecutionResult<Vec<_>>>()?;
        Ok(Row::new(values))
    }
}

impl Operator for SeqScanExec {
    fn schema(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    fn next_batch(&mut self) -> ExecutionResult<Option<RecordBatch>> {
        loop {
            if self.done || self.limit_reached() {
                self.stream = None;
                return Ok(None);
            }
            self.ctx.check_cancelled()?;

            if self.stream.is_none() {
                self.stream = Some(self.source.open()?);
            }

            let batch = self.read_chunk()?;
            // A chunk whose rows were all filtered out is skipped.
            if batch.num_rows() > 0 {
                return Ok(Some(batch));
            }
        }
    }

    fn reset(&mut self) {
        self.stream = None;
        self.rows_read = 0;
        self.emitted = 0;
        self.done = false;
    }
}

/// Filter operator that applies a predicate to each row.
#[derive(Debug)]
pub struct FilterExec {
    /// Child operator.
    child: Box<dyn Operator>,
    /// Filter predicate.
    predicate: PhysicalExpr,
}

impl FilterExec {
    /// Creates a new filter operator.
    pub fn new(child: Box<dyn Operator>, predicate: PhysicalExpr) -> Self {
        Self { child, predicate }
    }
}

impl Operator for FilterExec {
    fn schema(&self) -> Arc<Schema> {
        self.child.schema()
    }

    fn next_batch(&mut self) -> ExecutionResult<Option<RecordBatch>> {
        while let Some(batch) = self.child.next_batch()? {
            if batch.is_empty() {
                continue;
            }

            let mask = evaluate_predicate(&self.predicate, &batch)?;
            if mask.iter().any(|&b| b) {
                return batch.filter(&mask).map(Some);
            }
        }

        Ok(None)
    }

    fn reset(&mut self) {
        self.child.reset();
    }
}

/// Projection operator that selects and transforms columns.
#[derive(Debug)]
pub struct ProjectionExec {
    /// Child operator.
    child: Box<dyn Operator>,
    /// Projection expressions.
    exprs: Vec<PhysicalExpr>,
    /// Output schema.
    schema: Arc<Schema>,
}

impl ProjectionExec {
    /// Creates a new projection operator.
    pub fn new(child: Box<dyn Operator>, exprs: Vec<PhysicalExpr>, schema: Arc<Schema>) -> Self {
        Self {
            child,
            exprs,
            schema,
        }
    }
}

impl Operator for ProjectionExec {
    fn schema(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    fn next_batch(&mut self) -> ExecutionResult<Option<RecordBatch>> {
        let Some(batch) = self.child.next_batch()? else {
            return Ok(None);
        };

        let mut builder = RecordBatchBuilder::with_capacity(self.schema.clone(), batch.num_rows());
        for row in batch.rows() {
            let values = self
                .exprs
                .iter()
                .map(|e| evaluate_expr(e, &row))
                .collect::<ExecutionResult<Vec<_>>>()?;
            builder.append_row(Row::new(values))?;
        }
        builder.build().map(Some)
    }

    fn reset(&mut self) {
        self.child.reset();
    }
}

/// Limit operator that restricts the number of output rows.
#[derive(Debug)]
pub struct LimitExec {
    /// Child operator.
    child: Box<dyn Operator>,
    /// Maximum rows to return.
    fetch: Option<usize>,
    /// Rows to skip.
    offset: usize,
    /// Rows emitted so far.
    emitted: usize,
    /// Rows skipped so far.
    skipped: usize,
}

impl LimitExec {
    /// Creates a new limit operator.
    pub fn new(child: Box<dyn Operator>, offset: usize, fetch: Option<usize>) -> Self {
        Self {
            child,
            fetch,
            offset,
            emitted: 0,
            skipped: 0,
        }
    }
}

impl Operator for LimitExec {
    fn schema(&self) -> Arc<Schema> {
        self.child.schema()
    }

    fn next_batch(&mut self) -> ExecutionResult<Option<RecordBatch>> {
        // Once satisfied the child is never pulled again.
        while self.fetch.map_or(true, |fetch| self.emitted < fetch) {
            let Some(batch) = self.child.next_batch()? else {
                break;
            };

            let skip_in_batch = (self.offset - self.skipped).min(batch.num_rows());
            self.skipped += skip_in_batch;
            if skip_in_batch >= batch.num_rows() {
                continue;
            }

            let available = batch.num_rows() - skip_in_batch;
            let take = match self.fetch {
                Some(fetch) => available.min(fetch - self.emitted),
                None => available,
            };
            let result = batch.slice(skip_in_batch, take);
            self.emitted += result.num_rows();
            return Ok(Some(result));
        }

        Ok(None)
    }

    fn reset(&mut self) {
        self.child.reset();
        self.emitted = 0;
        self.skipped = 0;
    }
}

/// Sort operator for ordering results. The sort is stable.
#[derive(Debug)]
pub struct SortExec {
    /// Child operator.
    child: Box<dyn Operator>,
    /// Sort expressions.
    sort_exprs: Vec<PhysicalSortExpr>,
    /// Output batch size.
    batch_size: usize,
    /// Buffered and sorted rows.
    sorted: Option<RowBuffer>,
}

impl SortExec {
    /// Creates a new sort operator.
    pub fn new(child: Box<dyn Operator>, sort_exprs: Vec<PhysicalSortExpr>, batch_size: usize) -> Self {
        Self {
            child,
            sort_exprs,
            batch_size,
            sorted: None,
        }
    }
}

impl Operator for SortExec {
    fn schema(&self) -> Arc<Schema> {
        self.child.schema()
    }

    fn next_batch(&mut self) -> ExecutionResult<Option<RecordBatch>> {
        if self.sorted.is_none() {
            let rows = drain_rows(self.child.as_mut())?;
            self.sorted = Some(RowBuffer::new(sort_rows(rows, &self.sort_exprs)?));
        }

        let schema = self.child.schema();
        match self.sorted.as_mut() {
            Some(sorted) => sorted.next_batch(&schema, self.batch_size),
            None => Ok(None),
        }
    }

    fn reset(&mut self) {
        self.child.reset();
        self.sorted = None;
    }
}

/// TopN operator for ORDER BY ... LIMIT.
///
/// Keeps at most `2 * limit` rows in memory, trimming with a stable sort so
/// ties keep their input order.
#[derive(Debug)]
pub struct TopNExec {
    /// Child operator.
    child: Box<dyn Operator>,
    /// Sort expressions.
    sort_exprs: Vec<PhysicalSortExpr>,
    /// Number of rows to keep.
    limit: usize,
    /// Top rows.
    top_rows: Option<RowBuffer>,
}

impl TopNExec {
    /// Creates a new TopN operator.
    pub fn new(child: Box<dyn Operator>, sort_exprs: Vec<PhysicalSortExpr>, limit: usize) -> Self {
        Self {
            child,
            sort_exprs,
            limit,
            top_rows: None,
        }
    }

    fn collect_top(&mut self) -> ExecutionResult<Vec<Row>> {
        let mut heap: Vec<(Vec<Value>, Row)> = Vec::new();
        if self.limit == 0 {
            return Ok(Vec::new());
        }

        while let Some(batch) = self.child.next_batch()? {
            for row in batch.rows() {
                heap.push((sort_key(&self.sort_exprs, &row)?, row));

                if heap.len() > self.limit.saturating_mul(2) {
                    heap.sort_by(|(a, _), (b, _)| compare_sort_keys(a, b, &self.sort_exprs));
                    heap.truncate(self.limit);
                }
            }
        }

        heap.sort_by(|(a, _), (b, _)| compare_sort_keys(a, b, &self.sort_exprs));
        heap.truncate(self.limit);
        Ok(heap.into_iter().map(|(_, row)| row).collect())
    }
}

impl Operator for TopNExec {
    fn schema(&self) -> Arc<Schema> {
        self.child.schema()
    }

    fn next_batch(&mut self) -> ExecutionResult<Option<RecordBatch>> {
        if self.top_rows.is_none() {
            let rows = self.collect_top()?;
            self.top_rows = Some(RowBuffer::new(rows));
        }

        let schema = self.child.schema();
        let limit = self.limit;
        match self.top_rows.as_mut() {
            Some(rows) => rows.next_batch(&schema, limit),
            None => Ok(None),
        }
    }

    fn reset(&mut self) {
        self.child.reset();
        self.top_rows = None;
    }
}

/// Distinct operator that removes duplicate rows, keeping first
/// occurrences in input order.
#[derive(Debug)]
pub struct DistinctExec {
    /// Child operator.
    child: Box<dyn Operator>,
    /// Seen rows.
    seen: HashSet<Row>,
}

impl DistinctExec {
    /// Creates a new distinct operator.
    pub fn new(child: Box<dyn Operator>) -> Self {
        Self {
            child,
            seen: HashSet::new(),
        }
    }
}

impl Operator for DistinctExec {
    fn schema(&self) -> Arc<Schema> {
        self.child.schema()
    }

    fn next_batch(&mut self) -> ExecutionResult<Option<RecordBatch>> {
        while let Some(batch) = self.child.next_batch()? {
            let mask: Vec<bool> = batch.rows().map(|row| self.seen.insert(row)).collect();
            if mask.iter().any(|&b| b) {
                return batch.filter(&mask).map(Some);
            }
        }

        Ok(None)
    }

    fn reset(&mut self) {
        self.child.reset();
        self.seen.clear();
    }
}

/// Values operator that produces inline rows.
#[derive(Debug)]
pub struct ValuesExec {
    /// Output schema.
    schema: Arc<Schema>,
    /// Rows to return.
    rows: Arc<Vec<Row>>,
    /// Output batch size.
    batch_size: usize,
    /// Position of the next row.
    pos: usize,
    /// Execution context.
    ctx: ExecutionContext,
}

impl ValuesExec {
    /// Creates a new values operator.
    pub fn new(schema: Arc<Schema>, rows: Arc<Vec<Row>>, ctx: ExecutionContext) -> Self {
        let batch_size = ctx.config.scan_batch_size();
        Self {
            schema,
            rows,
            batch_size,
            pos: 0,
            ctx,
        }
    }
}

impl Operator for ValuesExec {
    fn schema(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    fn next_batch(&mut self) -> ExecutionResult<Option<RecordBatch>> {
        if self.pos >= self.rows.len() {
            return Ok(None);
        }
        self.ctx.check_cancelled()?;

        let end = self.pos.saturating_add(self.batch_size).min(self.rows.len());
        let rows = self.rows[self.pos..end].to_vec();
        self.ctx.metrics().add_rows_pulled(rows.len());
        self.pos = end;
        RecordBatch::from_rows(self.schema.clone(), rows).map(Some)
    }

    fn reset(&mut self) {
        self.pos = 0;
    }
}

/// Union operator that reads its inputs one after another.
#[derive(Debug)]
pub struct UnionExec {
    /// Inputs.
    inputs: Vec<Box<dyn Operator>>,
    /// Per input, the source column of each output column.
    mappings: Vec<Vec<Option<usize>>>,
    /// Output schema.
    schema: Arc<Schema>,
    /// Index of the input being read.
    current: usize,
}

impl UnionExec {
    /// Creates a new union operator.
    pub fn new(
        inputs: Vec<Box<dyn Operator>>,
        mappings: Vec<Vec<Option<usize>>>,
        schema: Arc<Schema>,
    ) -> Self {
        Self {
            inputs,
            mappings,
            schema,
            current: 0,
        }
    }
}

impl Operator for UnionExec {
    fn schema(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    fn next_batch(&mut self) -> ExecutionResult<Option<RecordBatch>> {
        while self.current < self.inputs.len() {
            let Some(batch) = self.inputs[self.current].next_batch()? else {
                self.current += 1;
                continue;
            };

            let mapping = self.mappings.get(self.current).ok_or_else(|| {
                ExecutionError::Internal(format!("missing union mapping for input {}", self.current))
            })?;
            let mut builder = RecordBatchBuilder::with_capacity(self.schema.clone(), batch.num_rows());
            for row in batch.rows() {
                let values = mapping
                    .iter()
                    .zip(self.schema.fields())
                    .map(|(source, field)| match source {
                        Some(i) => conform(row.value(*i).clone(), &field.data_type),
                        None => Ok(Value::Null),
                    })
                    .collect::<ExecutionResult<Vec<_>>>()?;
                builder.append_row(Row::new(values))?;
            }
            return builder.build().map(Some);
        }

        Ok(None)
    }

    fn reset(&mut self) {
        for input in &mut self.inputs {
            input.reset();
        }
        self.current = 0;
    }
}

/// Melt operator: one output row per input row and value column.
#[derive(Debug)]
pub struct MeltExec {
    /// Child operator.
    child: Box<dyn Operator>,
    /// Identifier column positions.
    id_vars: Vec<usize>,
    /// Value column positions and names.
    value_vars: Vec<(usize, String)>,
    /// Type of the value column.
    value_type: DataType,
    /// Output schema.
    schema: Arc<Schema>,
}

impl MeltExec {
    /// Creates a new melt operator.
    pub fn new(
        child: Box<dyn Operator>,
        id_vars: Vec<usize>,
        value_vars: Vec<(usize, String)>,
        value_type: DataType,
        schema: Arc<Schema>,
    ) -> Self {
        Self {
            child,
            id_vars,
            value_vars,
            value_type,
            schema,
        }
    }
}

impl Operator for MeltExec {
    fn schema(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    fn next_batch(&mut self) -> ExecutionResult<Option<RecordBatch>> {
        while let Some(batch) = self.child.next_batch()? {
            if batch.is_empty() || self.value_vars.is_empty() {
                continue;
            }
            let mut builder = RecordBatchBuilder::with_capacity(
                self.schema.clone(),
                batch.num_rows() * self.value_vars.len(),
            );
            for row in batch.rows() {
                let ids = row.project(&self.id_vars);
                for (index, name) in &self.value_vars {
                    let mut out = ids.clone();
                    out.push(Value::Utf8(name.clone()));
                    out.push(conform(row.value(*index).clone(), &self.value_type)?);
                    builder.append_row(out)?;
                }
            }
            return builder.build().map(Some);
        }
        Ok(None)
    }

    fn reset(&mut self) {
        self.child.reset();
    }
}
