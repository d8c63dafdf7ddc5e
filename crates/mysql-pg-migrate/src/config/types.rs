//! Configuration type definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::CaseMode;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MySQL).
    pub source: SourceConfig,

    /// Target database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,

    /// Subprocess-per-table batch runner settings.
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Source database (MySQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database (schema) name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password. Never written back out.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// SSL mode: disabled, preferred, required, verify_ca, verify_identity.
    #[serde(default = "default_preferred")]
    pub ssl_mode: String,

    /// Connection pool size (default: 4).
    #[serde(default = "default_mysql_pool_size")]
    pub max_connections: u32,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Target database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password. Never written back out.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Target schema (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode (default: "require").
    #[serde(default = "default_require")]
    pub ssl_mode: String,

    /// Connection pool size (default: 4).
    #[serde(default = "default_pg_pool_size")]
    pub max_connections: usize,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Identifier case policy for the target (default: preserve).
    #[serde(default)]
    pub case_mode: CaseMode,

    /// Import auto-increment ids as-is and reseed the sequence (default: true).
    #[serde(default = "default_true")]
    pub include_id: bool,

    /// NULL marker used in the CSV spool and the COPY statement.
    #[serde(default = "default_null_sentinel")]
    pub null_sentinel: String,

    /// Timeout for metadata queries in seconds (default: 60).
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Timeout for COPY, export and index builds in seconds (default: 3600).
    #[serde(default = "default_bulk_timeout")]
    pub bulk_timeout_secs: u64,

    /// Physical lines a TSV row may span before it is dropped (default: 10).
    #[serde(default = "default_max_lines_per_row")]
    pub max_lines_per_row: usize,

    /// Directory for transient CSV files (default: system temp dir).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spool_dir: Option<PathBuf>,

    /// Run ANALYZE after each table import (default: true).
    #[serde(default = "default_true")]
    pub analyze_after_import: bool,

    /// Create indexes in phase 2 (default: true).
    #[serde(default = "default_true")]
    pub create_indexes: bool,

    /// Create foreign keys in phase 3 (default: true).
    #[serde(default = "default_true")]
    pub create_foreign_keys: bool,

    /// Compare the id column of every table id by id during verification
    /// (default: true).
    #[serde(default = "default_true")]
    pub verify_ids: bool,

    /// Tables to include (glob patterns).
    #[serde(default)]
    pub include_tables: Vec<String>,

    /// Tables to exclude (glob patterns).
    #[serde(default)]
    pub exclude_tables: Vec<String>,

    /// Extra type rules, tried before the built-in ones.
    #[serde(default)]
    pub type_mappings: Vec<TypeMappingRule>,

    /// Per-table overrides keyed by source table name.
    #[serde(default)]
    pub tables: BTreeMap<String, TableOverride>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            case_mode: CaseMode::default(),
            include_id: true,
            null_sentinel: default_null_sentinel(),
            query_timeout_secs: default_query_timeout(),
            bulk_timeout_secs: default_bulk_timeout(),
            max_lines_per_row: default_max_lines_per_row(),
            spool_dir: None,
            analyze_after_import: true,
            create_indexes: true,
            create_foreign_keys: true,
            verify_ids: true,
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
            type_mappings: Vec::new(),
            tables: BTreeMap::new(),
        }
    }
}

impl MigrationConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn bulk_timeout(&self) -> Duration {
        Duration::from_secs(self.bulk_timeout_secs)
    }

    /// Look up the override for a table, exact name first.
    pub fn override_for(&self, table: &str) -> Option<&TableOverride> {
        self.tables.get(table).or_else(|| {
            self.tables
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(table))
                .map(|(_, o)| o)
        })
    }

    /// Effective include_id for a table.
    pub fn include_id_for(&self, table: &str) -> bool {
        self.override_for(table)
            .and_then(|o| o.include_id)
            .unwrap_or(self.include_id)
    }

    /// Whether a table is marked `skip` in its override.
    pub fn is_skipped(&self, table: &str) -> bool {
        self.override_for(table).map(|o| o.skip).unwrap_or(false)
    }
}

/// A user-supplied type rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeMappingRule {
    /// Regex matched against the whole normalized MySQL type.
    pub pattern: String,

    /// PostgreSQL type, may use `$1`-style capture references.
    pub replacement: String,

    /// Optional warning logged when the rule is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Special cases for a single table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableOverride {
    /// Columns forced to be nullable in the target.
    #[serde(default)]
    pub nullable_columns: Vec<String>,

    /// Column name to target type, bypassing the type rules.
    #[serde(default)]
    pub column_types: BTreeMap<String, String>,

    /// Per-table include_id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_id: Option<bool>,

    /// Leave this table out of whole-database runs.
    #[serde(default)]
    pub skip: bool,
}

/// Batch runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// File listing one table per line.
    #[serde(default = "default_list_file")]
    pub list_file: PathBuf,

    /// Directory for per-table log files.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            list_file: default_list_file(),
            log_dir: default_log_dir(),
        }
    }
}

// Default value functions for serde
fn default_mysql_port() -> u16 {
    3306
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_preferred() -> String {
    "preferred".to_string()
}

fn default_require() -> String {
    "require".to_string()
}

fn default_mysql_pool_size() -> u32 {
    4
}

fn default_pg_pool_size() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn default_null_sentinel() -> String {
    "\\N".to_string()
}

fn default_query_timeout() -> u64 {
    60
}

fn default_bulk_timeout() -> u64 {
    3600
}

fn default_max_lines_per_row() -> usize {
    10
}

fn default_list_file() -> PathBuf {
    PathBuf::from("migration_scripts.txt")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("migration_logs")
}
