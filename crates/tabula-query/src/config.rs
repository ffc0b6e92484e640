//! Engine configuration.
//!
//! [`EngineConfig`] bundles the settings of every stage a query passes
//! through. It loads from TOML; every section and field is optional and
//! falls back to its default.
//!
//! # Example
//!
//! ```rust
//! use tabula_query::EngineConfig;
//!
//! let config = EngineConfig::from_toml_str(
//!     r#"
//!     [execution]
//!     batch_size = 256
//!
//!     [inference]
//!     strict = false
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(config.execution.batch_size, 256);
//! assert!(!config.inference.strict);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::optimizer::OptimizerConfig;
use crate::physical::ExecutionConfig;
use crate::source::{CsvReadOptions, DecodeOptions, InferenceOptions};

/// Top-level configuration of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Chunk size and streaming mode.
    pub execution: ExecutionConfig,
    /// Schema inference sampling, strictness, null tokens and formats.
    pub inference: InferenceOptions,
    /// Optimizer rules and pass limit.
    pub optimizer: OptimizerConfig,
    /// CSV dialect.
    pub csv: CsvReadOptions,
}

impl EngineConfig {
    /// Creates a configuration for tests: tiny chunks so that chunk
    /// boundaries are exercised.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            execution: ExecutionConfig {
                batch_size: 2,
                streaming: true,
            },
            ..Default::default()
        }
    }

    /// Parses a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, QueryError> {
        let config: Self =
            toml::from_str(text).map_err(|e| QueryError::Config(e.to_string()))?;
        config.validate().map_err(QueryError::Config)?;
        Ok(config)
    }

    /// Reads a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, QueryError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| QueryError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Serializes to TOML.
    pub fn to_toml_string(&self) -> Result<String, QueryError> {
        toml::to_string_pretty(self).map_err(|e| QueryError::Config(e.to_string()))
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.execution.batch_size == 0 {
            return Err("execution.batch_size must be at least 1".to_string());
        }
        if self.inference.sample_size == 0 {
            return Err("inference.sample_size must be at least 1".to_string());
        }
        if self.csv.delimiter == self.csv.quote {
            return Err("csv.delimiter and csv.quote must differ".to_string());
        }
        self.optimizer.validate()
    }

    /// Decoding options for scans: the inference null tokens and formats,
    /// with the CSV error policy.
    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            null_values: self.inference.null_values.clone(),
            formats: self.inference.formats.clone(),
            ignore_errors: self.csv.ignore_errors,
        }
    }
}
