//! # mysql-pg-migrate
//!
//! MySQL to PostgreSQL schema and data migration library.
//!
//! Every table goes through the same three phases:
//!
//! - **Phase 1**: create the table and bulk-load its rows with `COPY`
//! - **Phase 2**: create secondary indexes
//! - **Phase 3**: add foreign keys
//!
//! Tables are described from the live MySQL `information_schema` (or from
//! `SHOW CREATE TABLE` text), converted through an ordered type-rule table,
//! and adjusted by a small per-table override map in the configuration.
//!
//! ## Example
//!
//! ```rust,no_run
//! use mysql_pg_migrate::{Config, MigrationPhase, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> mysql_pg_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let result = orchestrator
//!         .run(&MigrationPhase::ALL, None, &CancellationToken::new())
//!         .await?;
//!     println!("Migrated {} rows", result.rows_transferred);
//!     Ok(())
//! }
//! ```

pub mod clean;
pub mod command;
pub mod config;
pub mod core;
pub mod ddl;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, SourceConfig, TableOverride, TargetConfig};
pub use core::{CaseMode, MigrationPhase, SourceSchema, TableSpec, TargetSchema};
pub use ddl::{parse_create_table, render_create_table, ConvertOptions, TypeMapper};
pub use error::{MigrateError, Result};
pub use orchestrator::{
    read_table_list, BatchRunner, BatchSummary, HealthCheckResult, MigrationResult, Orchestrator,
};
pub use pipeline::{DataSource, TableOutcome};
pub use verify::StructureReport;
