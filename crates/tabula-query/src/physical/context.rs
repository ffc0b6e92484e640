//! Execution context and runtime configuration.
//!
//! The execution context carries the runtime configuration, the
//! cancellation flag and the metric counters shared by the operators of
//! one execution.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::executor::ExecutionError;

/// Configuration for query execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Target number of rows per chunk.
    pub batch_size: usize,
    /// Produce chunks of `batch_size` rows. When false, scans read their
    /// whole input as one chunk.
    pub streaming: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            batch_size: 8192,
            streaming: true,
        }
    }
}

impl ExecutionConfig {
    /// Creates a config with small chunks, for tests and tiny inputs.
    pub fn for_small_data() -> Self {
        Self {
            batch_size: 1024,
            ..Default::default()
        }
    }

    /// Creates a config with large chunks.
    pub fn for_large_data() -> Self {
        Self {
            batch_size: 65536,
            ..Default::default()
        }
    }

    /// Chunk size used by scans.
    pub fn scan_batch_size(&self) -> usize {
        if self.streaming {
            self.batch_size.max(1)
        } else {
            usize::MAX
        }
    }
}

/// Live counters updated by operators during execution.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    rows_pulled: AtomicUsize,
    batches_produced: AtomicUsize,
}

impl MetricsRecorder {
    /// Records rows pulled from a source.
    pub fn add_rows_pulled(&self, n: usize) {
        self.rows_pulled.fetch_add(n, Ordering::Relaxed);
    }

    /// Records a batch produced by the root operator.
    pub fn add_batch(&self) {
        self.batches_produced.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of the counters.
    pub fn snapshot(&self) -> ExecutionMetrics {
        ExecutionMetrics {
            rows_pulled: self.rows_pulled.load(Ordering::Relaxed),
            batches_produced: self.batches_produced.load(Ordering::Relaxed),
            ..Default::default()
        }
    }
}

/// Execution context for one query run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Execution configuration.
    pub config: ExecutionConfig,
    cancelled: Arc<AtomicBool>,
    metrics: Arc<MetricsRecorder>,
}

impl ExecutionContext {
    /// Creates a new execution context with the given config.
    pub fn new(config: ExecutionConfig) -> Self {
        Self {
            config,
            cancelled: Arc::new(AtomicBool::new(false)),
            metrics: Arc::new(MetricsRecorder::default()),
        }
    }

    /// Uses an externally owned cancellation flag.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = flag;
        self
    }

    /// Returns a handle that cancels this execution when set.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fails with [`ExecutionError::Cancelled`] once cancellation was
    /// requested. Checked between chunks.
    pub fn check_cancelled(&self) -> Result<(), ExecutionError> {
        if self.is_cancelled() {
            Err(ExecutionError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Returns the metric counters.
    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// Returns the batch size.
    pub fn batch_size(&self) -> usize {
        self.config.batch_size.max(1)
    }
}

/// Execution metrics collected during query processing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionMetrics {
    /// Rows pulled from sources.
    pub rows_pulled: usize,
    /// Batches produced by the root operator.
    pub batches_produced: usize,
    /// Rows produced by the root operator.
    pub rows_produced: usize,
    /// Wall-clock execution time in microseconds.
    pub execution_time_us: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_config_default() {
        let config = ExecutionConfig::default();
        assert!(config.batch_size > 0);
        assert!(config.streaming);
        assert_eq!(config.scan_batch_size(), config.batch_size);

        let whole = ExecutionConfig {
            streaming: false,
            ..Default::default()
        };
        assert_eq!(whole.scan_batch_size(), usize::MAX);
    }

    #[test]
    fn test_cancellation() {
        let ctx = ExecutionContext::default();
        assert!(ctx.check_cancelled().is_ok());

        let flag = ctx.cancel_flag();
        flag.store(true, Ordering::SeqCst);
        assert!(matches!(ctx.check_cancelled(), Err(ExecutionError::Cancelled)));
    }

    #[test]
    fn test_metrics_shared_between_clones() {
        let ctx = ExecutionContext::default();
        let clone = ctx.clone();
        clone.metrics().add_rows_pulled(3);
        clone.metrics().add_batch();
        let snapshot = ctx.metrics().snapshot();
        assert_eq!(snapshot.rows_pulled, 3);
        assert_eq!(snapshot.batches_produced, 1);
    }
}
