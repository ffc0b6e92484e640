//! Hash join execution.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use super::{evaluate_expr, is_true, ExecutionResult, Operator, RecordBatch, Row, Value};
use crate::logical::Schema;
use crate::parser::JoinType;
use crate::physical::PhysicalExpr;

/// Hash join operator.
///
/// The build side is read completely into a hash table on the first call;
/// the probe side streams and its row order is preserved. Right joins
/// build on the left and probe with the right. A join without keys puts
/// every build row under the same empty key, giving the cross product.
#[derive(Debug)]
pub struct HashJoinExec {
    /// Left input.
    left: Box<dyn Operator>,
    /// Right input.
    right: Box<dyn Operator>,
    /// Left join keys.
    left_keys: Vec<PhysicalExpr>,
    /// Right join keys.
    right_keys: Vec<PhysicalExpr>,
    /// Residual predicate over the concatenated row.
    filter: Option<PhysicalExpr>,
    /// Join type.
    join_type: JoinType,
    /// Whether null keys match each other.
    nulls_equal: bool,
    /// Output schema.
    schema: Arc<Schema>,
    /// Build side, once read.
    build: Option<BuildSide>,
    /// Whether the probe side is exhausted.
    probe_done: bool,
}

/// Materialized build side.
#[derive(Debug)]
struct BuildSide {
    rows: Vec<Row>,
    table: HashMap<Vec<Value>, Vec<usize>>,
    matched: Vec<bool>,
}

impl HashJoinExec {
    /// Creates a new hash join operator.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        left: Box<dyn Operator>,
        right: Box<dyn Operator>,
        left_keys: Vec<PhysicalExpr>,
        right_keys: Vec<PhysicalExpr>,
        filter: Option<PhysicalExpr>,
        join_type: JoinType,
        nulls_equal: bool,
        schema: Arc<Schema>,
    ) -> Self {
        Self {
            left,
            right,
            left_keys,
            right_keys,
            filter,
            join_type,
            nulls_equal,
            schema,
            build: None,
            probe_done: false,
        }
    }

    fn builds_left(&self) -> bool {
        self.join_type == JoinType::Right
    }

    fn join_key(&self, keys: &[PhysicalExpr], row: &Row) -> ExecutionResult<Option<Vec<Value>>> {
        let key = keys
            .iter()
            .map(|k| evaluate_expr(k, row))
            .collect::<ExecutionResult<Vec<_>>>()?;
        if !self.nulls_equal && key.iter().any(|v| v.is_null()) {
            return Ok(None);
        }
        Ok(Some(key))
    }

    fn build_hash_table(&mut self) -> ExecutionResult<BuildSide> {
        let builds_left = self.builds_left();
        let mut rows = Vec::new();
        let mut table: HashMap<Vec<Value>, Vec<usize>> = HashMap::new();

        loop {
            let batch = if builds_left {
                self.left.next_batch()?
            } else {
                self.right.next_batch()?
            };
            let Some(batch) = batch else {
                break;
            };
            for row in batch.rows() {
                let keys = if builds_left {
                    &self.left_keys
                } else {
                    &self.right_keys
                };
                if let Some(key) = self.join_key(keys, &row)? {
                    table.entry(key).or_default().push(rows.len());
                }
                rows.push(row);
            }
        }

        trace!(rows = rows.len(), keys = table.len(), "join build side ready");
        let matched = vec![false; rows.len()];
        Ok(BuildSide {
            rows,
            table,
            matched,
        })
    }

    /// Returns the left and right halves of a matched pair in output order.
    fn combine(&self, probe: &Row, build: &Row) -> Row {
        if self.builds_left() {
            build.concat(probe)
        } else {
            probe.concat(build)
        }
    }

    fn passes_filter(&self, combined: &Row) -> ExecutionResult<bool> {
        match &self.filter {
            Some(filter) => is_true(&evaluate_expr(filter, combined)?),
            None => Ok(true),
        }
    }

    fn probe_batch(&self, batch: &RecordBatch, build: &mut BuildSide) -> ExecutionResult<Vec<Row>> {
        let (probe_keys, build_width) = if self.builds_left() {
            (&self.right_keys, self.left.schema().len())
        } else {
            (&self.left_keys, self.right.schema().len())
        };
        let build_nulls = Row::nulls(build_width);
        let mut output = Vec::new();

        for probe_row in batch.rows() {
            let candidates = match self.join_key(probe_keys, &probe_row)? {
                Some(key) => build.table.get(&key).map(|v| v.as_slice()).unwrap_or(&[]),
                None => &[],
            };

            let mut any_match = false;
            for &i in candidates {
                let combined = self.combine(&probe_row, &build.rows[i]);
                if !self.passes_filter(&combined)? {
                    continue;
                }
                any_match = true;
                build.matched[i] = true;
                match self.join_type {
                    JoinType::Semi | JoinType::Anti => break,
                    _ => output.push(combined),
                }
            }

            match self.join_type {
                JoinType::Semi if any_match => output.push(probe_row),
                JoinType::Anti if !any_match => output.push(probe_row),
                JoinType::Left | JoinType::Full | JoinType::Right if !any_match => {
                    output.push(self.combine(&probe_row, &build_nulls));
                }
                _ => {}
            }
        }

        Ok(output)
    }

    /// Unmatched build rows of a full join, null-padded on the left.
    fn unmatched_build_rows(&self, build: &BuildSide) -> Vec<Row> {
        let left_nulls = Row::nulls(self.left.schema().len());
        build
            .rows
            .iter()
            .zip(&build.matched)
            .filter(|(_, matched)| !**matched)
            .map(|(row, _)| left_nulls.concat(row))
            .collect()
    }
}

impl Operator for HashJoinExec {
    fn schema(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    fn next_batch(&mut self) -> ExecutionResult<Option<RecordBatch>> {
        if self.probe_done {
            return Ok(None);
        }

        let mut build = match self.build.take() {
            Some(build) => build,
            None => self.build_hash_table()?,
        };

        loop {
            let batch = if self.builds_left() {
                self.right.next_batch()?
            } else {
                self.left.next_batch()?
            };

            let Some(batch) = batch else {
                self.probe_done = true;
                if self.join_type == JoinType::Full {
                    let rows = self.unmatched_build_rows(&build);
                    if !rows.is_empty() {
                        return RecordBatch::from_rows(self.schema.clone(), rows).map(Some);
                    }
                }
                return Ok(None);
            };

            let rows = self.probe_batch(&batch, &mut build)?;
            if !rows.is_empty() {
                self.build = Some(build);
                return RecordBatch::from_rows(self.schema.clone(), rows).map(Some);
            }
        }
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
        self.build = None;
        self.probe_done = false;
    }
}
