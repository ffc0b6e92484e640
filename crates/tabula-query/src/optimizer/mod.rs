//! Query optimizer for lazy frames.
//!
//! This module implements a rule-based optimizer that rewrites logical
//! plans into observably equivalent, cheaper forms. Rules are applied in a
//! fixed order, and the whole sequence is repeated until no rule changes
//! the plan or `max_passes` is reached.
//!
//! # Optimization Rules
//!
//! - **ConstantFolding**: evaluates literal-only subexpressions
//! - **FilterSimplification**: removes `Filter(true)` and merges adjacent filters
//! - **PredicatePushdown**: moves filter conjuncts towards the scans
//! - **ProjectionPruning**: makes scans read only the columns that are used
//! - **LimitPushdown**: turns a limit over projections into a scan read limit
//!
//! Filters and limits never move below Window, Rolling, Pivot, Melt or Limit
//! nodes, so order-sensitive operations see the same input as before.
//!
//! # Example
//!
//! ```ignore
//! use tabula_query::optimizer::{Optimizer, OptimizerConfig};
//!
//! let optimizer = Optimizer::new(OptimizerConfig::default());
//! let optimized_plan = optimizer.optimize(plan)?;
//! ```

mod rules;

pub use rules::*;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::logical::LogicalPlan;

/// Errors that can occur during optimization.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Rule application failed.
    #[error("Rule '{rule}' failed: {message}")]
    RuleFailed {
        /// Rule name.
        rule: String,
        /// Error message.
        message: String,
    },

    /// Internal optimizer error.
    #[error("Internal optimizer error: {0}")]
    Internal(String),
}

/// Result type for optimizer operations.
pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// Configuration for the optimizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Maximum number of passes over the rule list.
    pub max_passes: usize,
    /// Whether to enable constant folding.
    pub enable_constant_folding: bool,
    /// Whether to enable filter simplification.
    pub enable_filter_simplification: bool,
    /// Whether to enable predicate pushdown.
    pub enable_predicate_pushdown: bool,
    /// Whether to enable projection pruning.
    pub enable_projection_pruning: bool,
    /// Whether to enable limit pushdown.
    pub enable_limit_pushdown: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_passes: 10,
            enable_constant_folding: true,
            enable_filter_simplification: true,
            enable_predicate_pushdown: true,
            enable_projection_pruning: true,
            enable_limit_pushdown: true,
        }
    }
}

impl OptimizerConfig {
    /// Creates a minimal config with all optimizations disabled.
    pub fn minimal() -> Self {
        Self {
            max_passes: 1,
            enable_constant_folding: false,
            enable_filter_simplification: false,
            enable_predicate_pushdown: false,
            enable_projection_pruning: false,
            enable_limit_pushdown: false,
        }
    }

    /// Creates a config with all optimizations enabled.
    pub fn full() -> Self {
        Self::default()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_passes == 0 {
            return Err("optimizer.max_passes must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Trait for optimizer rules.
///
/// Each rule attempts to transform a logical plan into a more efficient form.
/// Rules must be idempotent: once a rule has reached its fixed point it
/// returns `None` for the plan it produced.
pub trait OptimizerRule: std::fmt::Debug + Send + Sync {
    /// Returns the name of this rule.
    fn name(&self) -> &str;

    /// Attempts to optimize the given plan.
    ///
    /// Returns the optimized plan if any transformation was made,
    /// or None if the plan was not modified.
    fn optimize(&self, plan: &LogicalPlan) -> OptimizerResult<Option<LogicalPlan>>;
}

/// Statistics about optimization.
#[derive(Debug, Clone, Default)]
pub struct OptimizationStats {
    /// Number of passes performed.
    pub passes: usize,
    /// Number of rules applied.
    pub rules_applied: usize,
    /// Per-rule application counts, sorted by rule name.
    pub rule_applications: Vec<(String, usize)>,
    /// Total optimization time in microseconds.
    pub total_time_us: u64,
}

/// The query optimizer.
///
/// Coordinates the application of optimization rules. The output schema of
/// the plan is never changed.
#[derive(Debug)]
pub struct Optimizer {
    config: OptimizerConfig,
    rules: Vec<Arc<dyn OptimizerRule>>,
}

impl Optimizer {
    /// Creates a new optimizer with the given configuration.
    pub fn new(config: OptimizerConfig) -> Self {
        let mut rules: Vec<Arc<dyn OptimizerRule>> = Vec::new();

        // Rules in order of application
        if config.enable_constant_folding {
            rules.push(Arc::new(ConstantFoldingRule));
        }
        if config.enable_filter_simplification {
            rules.push(Arc::new(FilterSimplificationRule));
        }
        if config.enable_predicate_pushdown {
            rules.push(Arc::new(PredicatePushdownRule));
        }
        if config.enable_projection_pruning {
            rules.push(Arc::new(ProjectionPruningRule));
        }
        if config.enable_limit_pushdown {
            rules.push(Arc::new(LimitPushdownRule));
        }

        Self { config, rules }
    }

    /// Creates an optimizer with default configuration.
    pub fn default_optimizer() -> Self {
        Self::new(OptimizerConfig::default())
    }

    /// Optimizes a logical plan.
    pub fn optimize(&self, plan: LogicalPlan) -> OptimizerResult<LogicalPlan> {
        let (optimized, _) = self.optimize_with_stats(plan)?;
        Ok(optimized)
    }

    /// Optimizes a logical plan and returns optimization statistics.
    pub fn optimize_with_stats(
        &self,
        plan: LogicalPlan,
    ) -> OptimizerResult<(LogicalPlan, OptimizationStats)> {
        let start = Instant::now();
        let mut stats = OptimizationStats::default();
        let mut rule_counts: HashMap<String, usize> = HashMap::new();
        let original_schema = plan.schema();

        let mut current_plan = plan;

        for pass in 0..self.config.max_passes.max(1) {
            stats.passes = pass + 1;
            let mut plan_changed = false;

            for rule in &self.rules {
                if let Some(new_plan) = rule.optimize(&current_plan)? {
                    debug!(rule = rule.name(), pass, "optimizer rule applied");
                    current_plan = new_plan;
                    plan_changed = true;
                    stats.rules_applied += 1;
                    *rule_counts.entry(rule.name().to_string()).or_insert(0) += 1;
                }
            }

            if !plan_changed {
                break;
            }
        }

        if current_plan.schema() != original_schema {
            return Err(OptimizerError::Internal(format!(
                "output schema changed from {} to {}",
                original_schema,
                current_plan.schema()
            )));
        }

        let mut applications: Vec<_> = rule_counts.into_iter().collect();
        applications.sort();
        stats.rule_applications = applications;
        stats.total_time_us = start.elapsed().as_micros() as u64;

        debug!(
            passes = stats.passes,
            rules_applied = stats.rules_applied,
            elapsed_us = stats.total_time_us,
            "plan optimized"
        );

        Ok((current_plan, stats))
    }

    /// Adds a custom optimization rule, applied after the built-in ones.
    pub fn add_rule(&mut self, rule: Arc<dyn OptimizerRule>) {
        self.rules.push(rule);
    }

    /// Returns the current configuration.
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::default_optimizer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::{col, lit, LogicalOperator, LogicalPlanBuilder, Schema};
    use crate::logical::Field;
    use crate::parser::DataType;
    use crate::source::{DecodeOptions, MemorySource};

    fn sales() -> LogicalPlanBuilder {
        let schema = Schema::new(vec![
            Field::nullable("year", DataType::Int64),
            Field::nullable("town", DataType::Utf8),
            Field::nullable("value", DataType::Float64),
        ]);
        let source = MemorySource::from_strs(
            "sales",
            &["year", "town", "value"],
            &[&["2020", "A", "100"]],
        );
        LogicalPlanBuilder::scan("sales", Arc::new(source), schema, DecodeOptions::default())
    }

    #[test]
    fn test_optimizer_config_default() {
        let config = OptimizerConfig::default();
        assert_eq!(config.max_passes, 10);
        assert!(config.enable_predicate_pushdown);
        assert!(config.enable_projection_pruning);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_optimizer_config_minimal() {
        let config = OptimizerConfig::minimal();
        assert!(!config.enable_predicate_pushdown);
        assert!(!config.enable_limit_pushdown);
        assert!(Optimizer::new(config).rules.is_empty());
    }

    #[test]
    fn test_optimizer_config_from_toml() {
        let config: OptimizerConfig = toml::from_str("max_passes = 3").unwrap();
        assert_eq!(config.max_passes, 3);
        assert!(config.enable_constant_folding);

        let invalid = OptimizerConfig {
            max_passes: 0,
            ..OptimizerConfig::default()
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_optimizer_no_op() {
        let optimizer = Optimizer::default();
        let (optimized, stats) = optimizer.optimize_with_stats(sales().build()).unwrap();
        assert!(matches!(optimized.root.as_ref(), LogicalOperator::Scan(_)));
        assert_eq!(stats.passes, 1);
        assert_eq!(stats.rules_applied, 0);
    }

    #[test]
    fn test_optimizer_reaches_fixed_point() {
        let plan = sales()
            .filter(col("year").eq(lit(2019).add(lit(1))))
            .unwrap()
            .project(vec![col("value")])
            .unwrap()
            .limit(0, Some(5))
            .unwrap()
            .build();

        let (optimized, stats) = Optimizer::default().optimize_with_stats(plan.clone()).unwrap();
        assert!(stats.passes < 10);
        assert_eq!(optimized.schema(), plan.schema());

        let display = optimized.display();
        assert!(display.contains("Scan: sales (filters: 1) (projection: [year, value]) (limit: 5)"));
        assert!(!display.contains("Filter"));

        let again = Optimizer::default().optimize_with_stats(optimized).unwrap().1;
        assert_eq!(again.rules_applied, 0);
    }
}
