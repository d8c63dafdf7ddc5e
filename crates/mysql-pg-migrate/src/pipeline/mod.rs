//! Per-table migration: one data-driven pipeline for every table.
//!
//! - Phase 1 ([`TableMigrator::table_and_data`]): drop, create, sequence
//!   setup, export to a CSV spool, COPY, reseed, primary key, ANALYZE
//! - Phase 2: secondary indexes ([`build::build_indexes`])
//! - Phase 3: foreign keys ([`build::build_foreign_keys`])

pub mod build;

pub use build::{build_foreign_keys, build_indexes, BuildReport};

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tokio::io::AsyncBufReadExt;
use tracing::{info, warn};

use crate::clean::{is_json_type, CsvSpool, LineOutcome, RowAssembler, SpoolFile};
use crate::config::MigrationConfig;
use crate::core::{MigrationPhase, RowSink, SourceSchema, TableSpec, TargetSchema};
use crate::ddl::{apply_override, primary_key_name, render_create_table, ConvertOptions, TypeMapper};
use crate::error::{MigrateError, Result};

/// Where phase 1 takes its rows from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// Query the live MySQL source.
    Live,
    /// A raw tab-separated export, reassembled line by line.
    TsvFile { path: PathBuf, has_header: bool },
}

/// Phase 1 counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub rows_exported: u64,
    pub rows_dropped: u64,
    pub rows_copied: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_next: Option<i64>,
    pub primary_key_added: bool,
}

/// Outcome of all requested phases for one table.
#[derive(Debug, Clone, Serialize)]
pub struct TableOutcome {
    pub table: String,
    pub target_table: String,
    pub status: String,
    pub phases: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load: Option<LoadReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexes: Option<BuildReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_keys: Option<BuildReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_seconds: f64,
}

impl TableOutcome {
    /// An outcome for a table that failed before any phase ran.
    pub fn failed(table: &str, error: impl Into<String>) -> Self {
        Self {
            table: table.to_string(),
            target_table: table.to_string(),
            status: "failed".to_string(),
            phases: Vec::new(),
            load: None,
            indexes: None,
            foreign_keys: None,
            error: Some(error.into()),
            duration_seconds: 0.0,
        }
    }

    /// Fold the outcome of a later phase run into this one.
    pub fn absorb(&mut self, later: TableOutcome) {
        self.phases.extend(later.phases);
        if later.load.is_some() {
            self.load = later.load;
        }
        if later.indexes.is_some() {
            self.indexes = later.indexes;
        }
        if later.foreign_keys.is_some() {
            self.foreign_keys = later.foreign_keys;
        }
        if later.error.is_some() {
            self.status = later.status;
            self.error = later.error;
        }
        self.duration_seconds += later.duration_seconds;
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn rows_copied(&self) -> u64 {
        self.load.as_ref().map(|l| l.rows_copied).unwrap_or(0)
    }

    pub fn rows_dropped(&self) -> u64 {
        self.load.as_ref().map(|l| l.rows_dropped).unwrap_or(0)
    }
}

/// Runs the phases for one table against a source and a target.
pub struct TableMigrator<'a> {
    source: &'a dyn SourceSchema,
    target: &'a dyn TargetSchema,
    mapper: &'a TypeMapper,
    config: &'a MigrationConfig,
}

impl<'a> TableMigrator<'a> {
    pub fn new(
        source: &'a dyn SourceSchema,
        target: &'a dyn TargetSchema,
        mapper: &'a TypeMapper,
        config: &'a MigrationConfig,
    ) -> Self {
        Self {
            source,
            target,
            mapper,
            config,
        }
    }

    /// Source spec with the table's override applied.
    pub fn effective_spec(&self, described: &TableSpec) -> TableSpec {
        let mut spec = described.clone();
        if let Some(table_override) = self.config.override_for(&spec.name) {
            apply_override(&mut spec, table_override);
        }
        spec
    }

    /// Run `phases` in order, stopping at the first failing phase.
    pub async fn run(
        &self,
        described: &TableSpec,
        phases: &[MigrationPhase],
        data: &DataSource,
    ) -> TableOutcome {
        let started = Instant::now();
        let spec = self.effective_spec(described);
        let target_spec = spec.with_case(self.config.case_mode);
        let mut outcome = TableOutcome {
            table: spec.name.clone(),
            target_table: target_spec.name.clone(),
            status: "success".to_string(),
            phases: Vec::new(),
            load: None,
            indexes: None,
            foreign_keys: None,
            error: None,
            duration_seconds: 0.0,
        };

        for phase in phases {
            info!("{}: starting {}", spec.name, phase);
            let result = match phase {
                MigrationPhase::TableAndData => self
                    .table_and_data(&spec, data)
                    .await
                    .map(|load| outcome.load = Some(load)),
                MigrationPhase::Indexes => {
                    if self.config.create_indexes {
                        let report = build_indexes(self.target, &target_spec).await;
                        outcome.indexes = Some(report);
                        check_build(&spec.name, "index", report)
                    } else {
                        info!("{}: index creation disabled", spec.name);
                        Ok(())
                    }
                }
                MigrationPhase::ForeignKeys => {
                    if self.config.create_foreign_keys {
                        let report = build_foreign_keys(self.target, &target_spec).await;
                        outcome.foreign_keys = Some(report);
                        check_build(&spec.name, "foreign key", report)
                    } else {
                        info!("{}: foreign key creation disabled", spec.name);
                        Ok(())
                    }
                }
            };
            match result {
                Ok(()) => outcome.phases.push(phase.number()),
                Err(e) => {
                    warn!("{}: {} failed: {}", spec.name, phase, e);
                    outcome.status = "failed".to_string();
                    outcome.error = Some(format!("{}: {}", phase, e));
                    break;
                }
            }
        }

        outcome.duration_seconds = started.elapsed().as_secs_f64();
        outcome
    }

    /// Phase 1 for one table. `spec` is the source spec after overrides.
    pub async fn table_and_data(&self, spec: &TableSpec, data: &DataSource) -> Result<LoadReport> {
        let case_mode = self.config.case_mode;
        let target_spec = spec.with_case(case_mode);
        let table = target_spec.name.as_str();

        // render first: a parse or mapping failure leaves the target untouched
        let opts = ConvertOptions::new(case_mode, Some(self.target.schema().to_string()));
        let ddl = render_create_table(spec, self.mapper, &opts)?;

        self.target.drop_table(table).await?;
        self.target.create_table(table, &ddl).await?;

        let auto_increment = target_spec.auto_increment_column().map(|c| c.name.clone());
        if let Some(column) = &auto_increment {
            self.target.prepare_sequence(table, column).await?;
        }

        let include_id = self.config.include_id_for(&spec.name);
        let skip_index = match (&auto_increment, include_id) {
            (Some(column), false) => target_spec.columns.iter().position(|c| &c.name == column),
            _ => None,
        };
        let copy_columns: Vec<String> = target_spec
            .columns
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != skip_index)
            .map(|(_, c)| c.name.clone())
            .collect();
        let json_columns = spec
            .columns
            .iter()
            .map(|c| is_json_type(&self.mapper.map_column(c).target_type))
            .collect();

        let spool = CsvSpool::create(
            &spec.name,
            spec.columns.len(),
            &self.config.null_sentinel,
            self.config.spool_dir.as_deref(),
        )?
        .skip_column(skip_index)
        .json_columns(json_columns);
        let (spool, upstream_dropped) = match data {
            DataSource::Live => self.export_live(spec, spool).await?,
            DataSource::TsvFile { path, has_header } => {
                self.export_tsv(spec, path, *has_header, spool).await?
            }
        };

        let rows_copied = self
            .target
            .copy_csv(table, &copy_columns, spool.path(), &self.config.null_sentinel)
            .await?;
        let stats = spool.stats;
        drop(spool);

        if rows_copied != stats.rows {
            return Err(MigrateError::transfer(
                table,
                format!("spooled {} rows but COPY loaded {}", stats.rows, rows_copied),
            ));
        }
        let mut report = LoadReport {
            rows_exported: stats.rows,
            rows_dropped: stats.dropped + upstream_dropped,
            rows_copied,
            sequence_next: None,
            primary_key_added: false,
        };

        if let (Some(column), true) = (&auto_increment, include_id) {
            report.sequence_next = Some(self.target.reseed_sequence(table, column).await?);
        }

        if !target_spec.primary_key.is_empty() {
            let pk_name = primary_key_name(table);
            if self.target.constraint_exists(table, &pk_name).await? {
                info!("{}: primary key {} already exists", table, pk_name);
            } else {
                self.target
                    .add_primary_key(table, &target_spec.primary_key)
                    .await?;
                report.primary_key_added = true;
            }
        }

        if self.config.analyze_after_import {
            self.target.analyze(table).await?;
        }

        if report.rows_dropped > 0 {
            warn!("{}: {} rows dropped", table, report.rows_dropped);
        }
        info!(
            "{}: phase 1 complete, {} rows copied",
            table, report.rows_copied
        );
        Ok(report)
    }

    /// Rows rejected by the spool are counted in the spool itself.
    async fn export_live(&self, spec: &TableSpec, mut spool: CsvSpool) -> Result<(SpoolFile, u64)> {
        self.source.export_rows(spec, &mut spool).await?;
        Ok((spool.finish()?, 0))
    }

    async fn export_tsv(
        &self,
        spec: &TableSpec,
        path: &Path,
        has_header: bool,
        mut spool: CsvSpool,
    ) -> Result<(SpoolFile, u64)> {
        let file = tokio::fs::File::open(path).await.map_err(|e| {
            MigrateError::transfer(&spec.name, format!("opening {}: {}", path.display(), e))
        })?;
        let mut reader = tokio::io::BufReader::new(file);
        let mut assembler = RowAssembler::new(spec.columns.len(), self.config.max_lines_per_row)
            .with_header(has_header);

        let mut dropped = 0u64;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            let line = line.strip_suffix('\n').unwrap_or(&line);
            match assembler.push_line(line) {
                LineOutcome::Row(row) => {
                    spool.write_row(row)?;
                }
                LineOutcome::Dropped => dropped += 1,
                LineOutcome::Pending => {}
            }
        }
        if assembler.finish() {
            dropped += 1;
        }
        Ok((spool.finish()?, dropped))
    }
}

fn check_build(table: &str, kind: &str, report: BuildReport) -> Result<()> {
    if report.is_ok() {
        Ok(())
    } else {
        Err(MigrateError::Validation(format!(
            "{}: {} of {} {} statements failed",
            table,
            report.failed,
            report.created + report.skipped + report.failed,
            kind
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableOverride;
    use crate::core::{CaseMode, ColumnSpec, IndexSpec};
    use crate::testing::{MemorySource, MemoryTarget};

    fn clients() -> TableSpec {
        let mut spec = TableSpec::new("Clients");
        let mut id = ColumnSpec::new("id", "int(11)");
        id.nullable = false;
        id.auto_increment = true;
        spec.columns.push(id);
        spec.columns.push(ColumnSpec::new("fullName", "varchar(50)"));
        spec.columns.push(ColumnSpec::new("note", "text"));
        spec.primary_key = vec!["id".into()];
        spec.indexes.push(IndexSpec {
            name: "idx_name".into(),
            columns: vec!["fullName".into()],
            unique: false,
        });
        spec
    }

    fn source() -> MemorySource {
        MemorySource::default().with_table(
            clients(),
            vec![
                vec![Some("5"), Some("O'Brien"), None],
                vec![Some("9"), Some("Ann"), Some("")],
            ],
        )
    }

    fn value(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    #[tokio::test]
    async fn test_phase1_preserves_ids_and_reseeds() {
        let source = source();
        let target = MemoryTarget::default();
        let mapper = TypeMapper::builtin();
        let config = MigrationConfig::default();
        let migrator = TableMigrator::new(&source, &target, &mapper, &config);

        let report = migrator
            .table_and_data(&clients(), &DataSource::Live)
            .await
            .unwrap();
        assert_eq!(report.rows_copied, 2);
        assert_eq!(report.rows_dropped, 0);
        assert_eq!(report.sequence_next, Some(10));
        assert!(report.primary_key_added);

        let rows = target.rows("Clients");
        assert_eq!(rows[0], vec![value("5"), value("O'Brien"), None]);
        // empty string stays distinct from NULL
        assert_eq!(rows[1], vec![value("9"), value("Ann"), value("")]);
        assert!(target.has_constraint("Clients", "Clients_pkey"));
        assert_eq!(
            target.sequence_next_value("Clients", "id").await.unwrap(),
            Some(10)
        );
        let executed = target.state.lock().unwrap().executed.clone();
        assert!(executed.iter().any(|s| s == "ANALYZE Clients"));
    }

    #[tokio::test]
    async fn test_phase1_without_ids_uses_sequence() {
        let source = source();
        let target = MemoryTarget::default();
        let mapper = TypeMapper::builtin();
        let mut config = MigrationConfig::default();
        config.tables.insert(
            "Clients".into(),
            TableOverride {
                include_id: Some(false),
                ..TableOverride::default()
            },
        );
        let migrator = TableMigrator::new(&source, &target, &mapper, &config);

        let report = migrator
            .table_and_data(&clients(), &DataSource::Live)
            .await
            .unwrap();
        assert_eq!(report.sequence_next, None);
        let ids: Vec<_> = target.rows("Clients").into_iter().map(|r| r[0].clone()).collect();
        assert_eq!(ids, vec![value("1"), value("2")]);
        assert_eq!(
            target.sequence_next_value("Clients", "id").await.unwrap(),
            Some(3)
        );
    }

    #[tokio::test]
    async fn test_phase1_repairs_json_only_in_json_columns() {
        let mut spec = TableSpec::new("Events");
        spec.columns.push(ColumnSpec::new("id", "int(11)"));
        spec.columns.push(ColumnSpec::new("note", "text"));
        spec.columns.push(ColumnSpec::new("payload", "json"));
        let source = MemorySource::default().with_table(
            spec.clone(),
            vec![
                vec![Some("1"), Some("[1, two]"), Some("{k: v}")],
                vec![Some("2"), Some("\\."), Some("[1, two]")],
            ],
        );
        let target = MemoryTarget::default();
        let mapper = TypeMapper::builtin();
        let config = MigrationConfig::default();
        TableMigrator::new(&source, &target, &mapper, &config)
            .table_and_data(&spec, &DataSource::Live)
            .await
            .unwrap();

        let rows = target.rows("Events");
        assert_eq!(rows[0], vec![value("1"), value("[1, two]"), value(r#"{"k": "v"}"#)]);
        assert_eq!(rows[1], vec![value("2"), value("\\."), value(r#"[1, "two"]"#)]);
    }

    #[tokio::test]
    async fn test_phase1_keeps_rows_after_backslash_dot_value() {
        let mut spec = TableSpec::new("Marks");
        spec.columns.push(ColumnSpec::new("mark", "varchar(5)"));
        let source = MemorySource::default().with_table(
            spec.clone(),
            vec![vec![Some("a")], vec![Some("\\.")], vec![Some("b")]],
        );
        let target = MemoryTarget::default();
        let mapper = TypeMapper::builtin();
        let config = MigrationConfig::default();
        let report = TableMigrator::new(&source, &target, &mapper, &config)
            .table_and_data(&spec, &DataSource::Live)
            .await
            .unwrap();

        assert_eq!(report.rows_copied, 3);
        assert_eq!(
            target.rows("Marks"),
            vec![vec![value("a")], vec![value("\\.")], vec![value("b")]]
        );
    }

    #[tokio::test]
    async fn test_render_failure_leaves_target_untouched() {
        let source = source();
        let target = MemoryTarget::default();
        target
            .create_table("Clients", "CREATE TABLE \"public\".\"Clients\" (\"id\" INTEGER)")
            .await
            .unwrap();
        let mapper = TypeMapper::builtin();
        let config = MigrationConfig::default();
        let migrator = TableMigrator::new(&source, &target, &mapper, &config);

        let mut bad = clients();
        bad.columns.push(ColumnSpec::new("", "int"));
        assert!(migrator.table_and_data(&bad, &DataSource::Live).await.is_err());
        assert!(target.table_exists("Clients").await.unwrap());
    }

    #[tokio::test]
    async fn test_tsv_file_rows_are_reassembled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clients.tsv");
        std::fs::write(
            &path,
            "id\tfullName\tnote\n1\tAnn\nSmith\tfirst\n2\tBob\tNULL\n3\ttoo\tmany\tfields\n4\tEve\n",
        )
        .unwrap();

        let source = MemorySource::default();
        let target = MemoryTarget::default();
        let mapper = TypeMapper::builtin();
        let config = MigrationConfig::default();
        let migrator = TableMigrator::new(&source, &target, &mapper, &config);

        let data = DataSource::TsvFile {
            path,
            has_header: true,
        };
        let report = migrator.table_and_data(&clients(), &data).await.unwrap();
        assert_eq!(report.rows_copied, 2);
        assert_eq!(report.rows_dropped, 2);

        let rows = target.rows("Clients");
        assert_eq!(rows[0], vec![value("1"), value("Ann Smith"), value("first")]);
        assert_eq!(rows[1], vec![value("2"), value("Bob"), None]);
        assert_eq!(report.sequence_next, Some(3));
    }

    #[tokio::test]
    async fn test_full_run_is_repeatable() {
        let source = source();
        let target = MemoryTarget::default();
        let mapper = TypeMapper::builtin();
        let config = MigrationConfig::default();
        let migrator = TableMigrator::new(&source, &target, &mapper, &config);

        let first = migrator
            .run(&clients(), &MigrationPhase::ALL, &DataSource::Live)
            .await;
        assert!(first.is_success(), "{:?}", first.error);
        assert_eq!(first.phases, vec![1, 2, 3]);
        assert_eq!(first.indexes.unwrap().created, 1);

        let again = migrator
            .run(&clients(), &[MigrationPhase::Indexes], &DataSource::Live)
            .await;
        assert_eq!(again.indexes.unwrap().skipped, 1);
        assert_eq!(again.indexes.unwrap().created, 0);
    }

    #[tokio::test]
    async fn test_lower_case_mode() {
        let source = source();
        let target = MemoryTarget::default();
        let mapper = TypeMapper::builtin();
        let config = MigrationConfig {
            case_mode: CaseMode::Lower,
            ..MigrationConfig::default()
        };
        let migrator = TableMigrator::new(&source, &target, &mapper, &config);

        let outcome = migrator
            .run(&clients(), &[MigrationPhase::TableAndData], &DataSource::Live)
            .await;
        assert_eq!(outcome.target_table, "clients");
        assert_eq!(target.rows("clients").len(), 2);
        assert!(target.has_constraint("clients", "clients_pkey"));
    }
}
