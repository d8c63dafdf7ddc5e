//! Core types and traits shared by every stage of the migration.
//!
//! - [`schema`]: table, column and constraint metadata
//! - [`identifier`]: identifier validation and quoting
//! - [`traits`]: the source/target seams and the row sink

pub mod identifier;
pub mod schema;
pub mod traits;

pub use schema::{
    is_integer_type, CaseMode, ColumnDefault, ColumnFacts, ColumnSpec, ExportRow, ForeignKeySpec,
    IndexSpec, MigrationPhase, ReferentialAction, TableSpec,
};
pub use traits::{ExportStats, IdStats, RowSink, SourceSchema, TargetSchema, TypeMapping};
