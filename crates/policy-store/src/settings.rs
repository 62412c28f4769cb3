//! Store configuration

use crate::error::AdapterError;
use config::{Config, Environment, File};
use rule_codec::DEFAULT_TABLE_NAME;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix of environment overrides, e.g. `POLICY_STORE_DATABASE_URL`
pub const ENV_PREFIX: &str = "POLICY_STORE";

/// Policy store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite connection URL
    pub database_url: String,

    /// Rule table name
    pub table_name: String,

    /// Create the rule table on connect if it does not exist
    pub create_table: bool,

    /// Log level for binaries ("error" .. "trace")
    pub log_level: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://casbin.db".to_string(),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            create_table: true,
            log_level: "info".to_string(),
        }
    }
}

impl StoreConfig {
    /// In-memory database, for tests and dry runs
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            ..Default::default()
        }
    }

    /// Load defaults, then an optional config file, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, AdapterError> {
        let defaults = Self::default();

        let mut builder = Config::builder()
            .set_default("database_url", defaults.database_url)?
            .set_default("table_name", defaults.table_name)?
            .set_default("create_table", defaults.create_table)?
            .set_default("log_level", defaults.log_level)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let config = builder
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.table_name, "casbin_rule");
        assert!(config.create_table);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "database_url = \"sqlite::memory:\"").unwrap();
        writeln!(file, "table_name = \"access_rules\"").unwrap();
        writeln!(file, "create_table = false").unwrap();

        let config = StoreConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.table_name, "access_rules");
        assert!(!config.create_table);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = StoreConfig::load(Some(Path::new("/nonexistent/policy-store.toml")));
        assert!(matches!(result, Err(AdapterError::Config(_))));
    }
}
