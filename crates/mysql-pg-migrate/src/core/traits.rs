//! Core traits for the MySQL → PostgreSQL pipeline.
//!
//! - [`SourceSchema`]: reads schema facts and rows from MySQL
//! - [`TargetSchema`]: applies DDL and bulk loads into PostgreSQL
//! - [`RowSink`]: receives exported rows (the CSV spool in production)
//!
//! The pipeline, builder and verifier only talk to these traits, so they can
//! be exercised against in-memory fakes.

use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

use super::schema::{ColumnFacts, ExportRow, ForeignKeySpec, IndexSpec, TableSpec};

/// Counters returned by a row export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExportStats {
    /// Rows accepted by the sink.
    pub rows: u64,
    /// Rows rejected for having the wrong field count.
    pub dropped: u64,
}

/// COUNT, MIN and MAX of an integer id column. NULLs are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IdStats {
    pub count: i64,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

/// Destination for exported rows.
pub trait RowSink {
    /// Accept a row. Returns `Ok(false)` when the row was dropped.
    fn write_row(&mut self, row: ExportRow) -> Result<bool>;
}

/// Read schema and data from the source database.
#[async_trait]
pub trait SourceSchema: Send + Sync {
    /// Base tables of the source database, sorted by name.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Full table description: columns, primary key, indexes, foreign keys.
    async fn describe_table(&self, table: &str) -> Result<TableSpec>;

    /// Raw `SHOW CREATE TABLE` text.
    async fn show_create_table(&self, table: &str) -> Result<String>;

    /// Exact row count.
    async fn row_count(&self, table: &str) -> Result<i64>;

    /// Column facts for the structure verifier.
    async fn column_facts(&self, table: &str) -> Result<Vec<ColumnFacts>>;

    /// Aggregates over an integer id column.
    async fn id_stats(&self, table: &str, column: &str) -> Result<IdStats>;

    /// Up to `limit` ids greater than `after`, ascending.
    async fn id_page(
        &self,
        table: &str,
        column: &str,
        after: Option<i64>,
        limit: usize,
    ) -> Result<Vec<i64>>;

    /// Stream every row of `spec` into `sink`, one field per column.
    async fn export_rows(
        &self,
        spec: &TableSpec,
        sink: &mut (dyn RowSink + Send),
    ) -> Result<ExportStats>;

    /// Round-trip a trivial query.
    async fn ping(&self) -> Result<()>;

    /// Database type identifier ("mysql").
    fn db_type(&self) -> &str;

    /// Close the connection pool.
    async fn close(&self);
}

/// Apply schema and load data into the target database.
///
/// Table names passed here are already mapped through the case policy and
/// are resolved inside [`TargetSchema::schema`].
#[async_trait]
pub trait TargetSchema: Send + Sync {
    /// Target schema name.
    fn schema(&self) -> &str;

    // ===== Schema Operations =====

    /// Execute a DDL statement.
    async fn execute_ddl(&self, sql: &str) -> Result<()>;

    /// `DROP TABLE IF EXISTS ... CASCADE`.
    async fn drop_table(&self, table: &str) -> Result<()>;

    /// Run a rendered `CREATE TABLE` statement for `table`.
    async fn create_table(&self, table: &str, ddl: &str) -> Result<()>;

    /// Check if a table exists.
    async fn table_exists(&self, table: &str) -> Result<bool>;

    // ===== Constraint Operations =====

    /// Check `pg_indexes` for an index name in the target schema.
    async fn index_exists(&self, index_name: &str) -> Result<bool>;

    /// Create an index named `index_name`.
    async fn create_index(&self, table: &str, index_name: &str, index: &IndexSpec) -> Result<()>;

    /// Check `information_schema.table_constraints` for a constraint on a table.
    async fn constraint_exists(&self, table: &str, constraint: &str) -> Result<bool>;

    /// Add the primary key as `<table>_pkey`.
    async fn add_primary_key(&self, table: &str, columns: &[String]) -> Result<()>;

    /// Add a foreign key constraint.
    async fn add_foreign_key(&self, table: &str, fk: &ForeignKeySpec) -> Result<()>;

    // ===== Data Operations =====

    /// COPY a CSV file into the table. Returns the number of rows loaded.
    async fn copy_csv(
        &self,
        table: &str,
        columns: &[String],
        path: &Path,
        null_sentinel: &str,
    ) -> Result<u64>;

    /// Create the backing sequence for an auto-increment column and attach
    /// it as the column default. Returns the sequence name.
    async fn prepare_sequence(&self, table: &str, column: &str) -> Result<String>;

    /// Move the sequence past the current maximum. Returns the next value.
    async fn reseed_sequence(&self, table: &str, column: &str) -> Result<i64>;

    /// Refresh planner statistics.
    async fn analyze(&self, table: &str) -> Result<()>;

    // ===== Read-only Operations =====

    /// Column facts from `information_schema.columns`.
    async fn columns(&self, table: &str) -> Result<Vec<ColumnFacts>>;

    /// Exact row count.
    async fn row_count(&self, table: &str) -> Result<i64>;

    /// Largest integer value of a column, `None` for an empty table.
    async fn max_value(&self, table: &str, column: &str) -> Result<Option<i64>>;

    /// The value `nextval` would return next, without consuming it.
    async fn sequence_next_value(&self, table: &str, column: &str) -> Result<Option<i64>>;

    /// Aggregates over an integer id column.
    async fn id_stats(&self, table: &str, column: &str) -> Result<IdStats>;

    /// Up to `limit` ids greater than `after`, ascending.
    async fn id_page(
        &self,
        table: &str,
        column: &str,
        after: Option<i64>,
        limit: usize,
    ) -> Result<Vec<i64>>;

    /// Round-trip a trivial query.
    async fn ping(&self) -> Result<()>;

    /// Database type identifier ("postgres").
    fn db_type(&self) -> &str;

    /// Close the connection pool.
    async fn close(&self);
}

/// Result of mapping a type from source to target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeMapping {
    /// Target type string (e.g., "VARCHAR(255)", "BIGINT").
    pub target_type: String,
    /// Whether this mapping loses data or precision.
    pub is_lossy: bool,
    /// Warning message for lossy mappings.
    pub warning: Option<String>,
}

impl TypeMapping {
    /// Create a lossless type mapping.
    pub fn lossless(target_type: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            is_lossy: false,
            warning: None,
        }
    }

    /// Create a lossy type mapping with a warning.
    pub fn lossy(target_type: impl Into<String>, warning: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            is_lossy: true,
            warning: Some(warning.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mapping_lossless() {
        let mapping = TypeMapping::lossless("BIGINT");
        assert_eq!(mapping.target_type, "BIGINT");
        assert!(!mapping.is_lossy);
        assert!(mapping.warning.is_none());
    }

    #[test]
    fn test_type_mapping_lossy() {
        let mapping = TypeMapping::lossy("TEXT", "ENUM values stored as text");
        assert_eq!(mapping.target_type, "TEXT");
        assert!(mapping.is_lossy);
        assert_eq!(
            mapping.warning.as_deref(),
            Some("ENUM values stored as text")
        );
    }

    #[test]
    fn test_export_stats_default() {
        let stats = ExportStats::default();
        assert_eq!(stats.rows, 0);
        assert_eq!(stats.dropped, 0);
    }
}
