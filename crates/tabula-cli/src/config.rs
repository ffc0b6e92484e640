//! Configuration file support for the CLI.
//!
//! Loads and saves CLI configuration from TOML files. The `[engine]`
//! section is passed through to the query engine unchanged.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use tabula_query::EngineConfig;

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Default output format.
    #[serde(default = "default_format")]
    pub output_format: String,

    /// Enable timing by default.
    #[serde(default)]
    pub timing: bool,

    /// Row limit applied to every query.
    #[serde(default)]
    pub limit: Option<usize>,

    /// Tables registered at startup, by name.
    #[serde(default)]
    pub tables: BTreeMap<String, PathBuf>,

    /// History file path.
    #[serde(default)]
    pub history_file: Option<PathBuf>,

    /// Maximum history size.
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Engine settings.
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_format() -> String {
    "table".to_string()
}

fn default_history_size() -> usize {
    1000
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            output_format: default_format(),
            timing: false,
            limit: None,
            tables: BTreeMap::new(),
            history_file: None,
            history_size: default_history_size(),
            engine: EngineConfig::default(),
        }
    }
}

impl CliConfig {
    /// Loads configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config
            .engine
            .validate()
            .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;
        Ok(config)
    }

    /// Saves configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Loads the default configuration file.
    ///
    /// Looks in the following locations:
    /// 1. ~/.config/tabula/config.toml
    /// 2. ~/.tabula/config.toml
    /// 3. Returns default if not found
    pub fn load_default() -> Result<Self> {
        if let Some(config_dir) = dirs::config_dir() {
            let path = config_dir.join("tabula").join("config.toml");
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        if let Some(home) = dirs::home_dir() {
            let path = home.join(".tabula").join("config.toml");
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// History file: the configured one, else under the local data dir.
    pub fn history_path(&self) -> Option<PathBuf> {
        self.history_file
            .clone()
            .or_else(|| dirs::data_local_dir().map(|dir| dir.join("tabula").join("history")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = CliConfig::default();
        assert_eq!(config.output_format, "table");
        assert!(config.tables.is_empty());
        assert!(config.limit.is_none());
        assert!(config.engine.execution.streaming);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut config = CliConfig::default();
        config.tables.insert("sales".into(), PathBuf::from("/data/sales.csv"));
        config.limit = Some(20);
        config.engine.execution.batch_size = 64;

        config.save(&path).unwrap();

        let loaded = CliConfig::from_file(&path).unwrap();
        assert_eq!(loaded.tables["sales"], PathBuf::from("/data/sales.csv"));
        assert_eq!(loaded.limit, Some(20));
        assert_eq!(loaded.engine.execution.batch_size, 64);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            output_format = "json"
            timing = true

            [tables]
            towns = "towns.csv"

            [engine.inference]
            strict = false
        "#;

        let config: CliConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.output_format, "json");
        assert!(config.timing);
        assert_eq!(config.tables["towns"], PathBuf::from("towns.csv"));
        assert!(!config.engine.inference.strict);
        assert_eq!(config.history_size, 1000);
    }

    #[test]
    fn test_invalid_engine_section_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[engine.execution]\nbatch_size = 0\n").unwrap();
        assert!(CliConfig::from_file(&path).is_err());
    }
}
