//! Configuration loading and validation.

mod filter;
mod types;
mod validation;

pub use filter::TableFilter;
pub use types::*;

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Starter configuration written by `init`.
pub const SAMPLE_CONFIG: &str = r#"# mysql-pg-migrate configuration

source:
  host: localhost
  port: 3306
  database: source_db
  user: root
  password: change-me
  # disabled | preferred | required | verify_ca | verify_identity
  ssl_mode: preferred

target:
  host: localhost
  port: 5432
  database: target_db
  user: postgres
  password: change-me
  schema: public
  # disable | require | verify-ca | verify-full
  ssl_mode: disable

migration:
  # preserve keeps MySQL identifier case (quoted); lower folds to lowercase
  case_mode: preserve
  # keep source ids and reseed sequences past the imported maximum
  include_id: true
  null_sentinel: '\N'
  query_timeout_secs: 60
  bulk_timeout_secs: 3600
  max_lines_per_row: 10
  analyze_after_import: true
  create_indexes: true
  create_foreign_keys: true
  # compare auto-increment / integer primary key values id by id on verify
  verify_ids: true
  include_tables: []
  exclude_tables: []
  type_mappings: []
  #  - pattern: '^enum\(.*\)$'
  #    replacement: 'VARCHAR(100)'
  tables: {}
  #  ClientSMS:
  #    nullable_columns: [message]
  #    column_types: { status: VARCHAR(100) }

batch:
  list_file: migration_scripts.txt
  log_dir: migration_logs
"#;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 hash of the configuration, recorded with each run.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Build the include/exclude matcher for table selection.
    pub fn table_filter(&self) -> Result<TableFilter> {
        TableFilter::new(
            &self.migration.include_tables,
            &self.migration.exclude_tables,
        )
    }
}

impl TargetConfig {
    /// Build a libpq-style connection string (password omitted).
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} sslmode={}",
            self.host, self.port, self.database, self.user, self.ssl_mode
        )
    }
}

impl SourceConfig {
    /// Build a MySQL URL for logging (password omitted).
    pub fn display_url(&self) -> String {
        format!(
            "mysql://{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}
