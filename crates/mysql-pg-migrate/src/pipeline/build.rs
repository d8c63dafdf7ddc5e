//! Phase 2 (indexes) and phase 3 (foreign keys).
//!
//! Both builders check for existing objects first, so re-running them only
//! reports skips. A failing statement is counted and the builder moves on.

use serde::Serialize;
use tracing::{info, warn};

use crate::core::identifier::truncate_pg_identifier;
use crate::core::{ForeignKeySpec, TableSpec, TargetSchema};
use crate::ddl::target_index_name;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BuildReport {
    pub fn is_ok(&self) -> bool {
        self.failed == 0
    }
}

/// Create the table's secondary indexes. `spec` carries target names.
pub async fn build_indexes(target: &dyn TargetSchema, spec: &TableSpec) -> BuildReport {
    let mut report = BuildReport::default();
    for index in &spec.indexes {
        let name = target_index_name(&spec.name, &index.name);
        match target.index_exists(&name).await {
            Ok(true) => {
                info!("{}: index {} already exists", spec.name, name);
                report.skipped += 1;
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("{}: could not check index {}: {}", spec.name, name, e);
                report.failed += 1;
                continue;
            }
        }
        match target.create_index(&spec.name, &name, index).await {
            Ok(()) => {
                info!("{}: created index {}", spec.name, name);
                report.created += 1;
            }
            Err(e) => {
                warn!("{}: index {} failed: {}", spec.name, name, e);
                report.failed += 1;
            }
        }
    }
    report
}

/// Add the table's foreign keys. A missing referenced table is a skip.
pub async fn build_foreign_keys(target: &dyn TargetSchema, spec: &TableSpec) -> BuildReport {
    let mut report = BuildReport::default();
    for fk in &spec.foreign_keys {
        let fk = ForeignKeySpec {
            name: truncate_pg_identifier(&fk.name).to_string(),
            ..fk.clone()
        };
        match target.constraint_exists(&spec.name, &fk.name).await {
            Ok(true) => {
                info!("{}: foreign key {} already exists", spec.name, fk.name);
                report.skipped += 1;
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("{}: could not check foreign key {}: {}", spec.name, fk.name, e);
                report.failed += 1;
                continue;
            }
        }
        match target.table_exists(&fk.ref_table).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    "{}: skipping foreign key {}, referenced table {} does not exist",
                    spec.name, fk.name, fk.ref_table
                );
                report.skipped += 1;
                continue;
            }
            Err(e) => {
                warn!("{}: could not check table {}: {}", spec.name, fk.ref_table, e);
                report.failed += 1;
                continue;
            }
        }
        match target.add_foreign_key(&spec.name, &fk).await {
            Ok(()) => {
                info!(
                    "{}: added foreign key {} -> {}",
                    spec.name, fk.name, fk.ref_table
                );
                report.created += 1;
            }
            Err(e) => {
                warn!("{}: foreign key {} failed: {}", spec.name, fk.name, e);
                report.failed += 1;
            }
        }
    }
    report
}
