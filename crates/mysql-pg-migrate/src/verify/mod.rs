//! Read-only structure and data verification.
//!
//! For each table the verifier compares the columns the target should have
//! (source facts run through the type mapper, overrides and case policy)
//! with what `information_schema` reports on the target, compares row
//! counts, checks that an auto-increment sequence is ahead of the data and
//! compares the id column value by value ([`ids`]). Nothing here writes to
//! either database.

pub mod ids;
pub mod normalize;

pub use ids::{compare_ids, IdCheck, ID_PAGE_SIZE, ID_SAMPLE_LIMIT};
pub use normalize::{actual_type, canonical_type, expected_type, serial_for};

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::MigrationConfig;
use crate::core::identifier::{qualify_pg, quote_pg};
use crate::core::{is_integer_type, ColumnFacts, ColumnSpec, SourceSchema, TableSpec, TargetSchema};
use crate::ddl::{apply_override, TypeMapper};
use crate::error::Result;

/// A column whose name differs from the target only by case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseDifference {
    pub expected: String,
    pub actual: String,
    /// `ALTER TABLE ... RENAME COLUMN` restoring the expected spelling.
    pub suggested_sql: String,
}

/// Type or nullability difference on a matched column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMismatch {
    pub column: String,
    pub expected_type: String,
    pub actual_type: String,
    pub expected_nullable: bool,
    pub actual_nullable: bool,
}

/// Result of [`compare_columns`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnComparison {
    pub only_in_source: Vec<String>,
    pub only_in_target: Vec<String>,
    pub case_differences: Vec<CaseDifference>,
    pub mismatches: Vec<ColumnMismatch>,
}

impl ColumnComparison {
    pub fn is_clean(&self) -> bool {
        self.only_in_source.is_empty()
            && self.only_in_target.is_empty()
            && self.case_differences.is_empty()
            && self.mismatches.is_empty()
    }
}

/// Compare expected columns against the target's columns.
///
/// Names are matched case-insensitively; an inexact match is reported as a
/// case difference and still compared for type and nullability.
pub fn compare_columns(
    table_ref: &str,
    source: &[ColumnSpec],
    target: &[ColumnFacts],
    mapper: &TypeMapper,
) -> Result<ColumnComparison> {
    let mut result = ColumnComparison::default();
    let mut by_lower: HashMap<String, &ColumnFacts> = HashMap::new();
    for col in target {
        by_lower.entry(col.name.to_lowercase()).or_insert(col);
    }
    let mut matched = vec![false; target.len()];

    for expected in source {
        let exact = target.iter().position(|t| t.name == expected.name);
        let found = match exact {
            Some(i) => Some(i),
            None => by_lower
                .get(&expected.name.to_lowercase())
                .and_then(|t| target.iter().position(|c| c.name == t.name)),
        };
        let Some(i) = found else {
            result.only_in_source.push(expected.name.clone());
            continue;
        };
        matched[i] = true;
        let actual = &target[i];

        if actual.name != expected.name {
            result.case_differences.push(CaseDifference {
                expected: expected.name.clone(),
                actual: actual.name.clone(),
                suggested_sql: format!(
                    "ALTER TABLE {} RENAME COLUMN {} TO {};",
                    table_ref,
                    quote_pg(&actual.name)?,
                    quote_pg(&expected.name)?
                ),
            });
        }

        let expected_type = expected_type(expected, mapper);
        let actual_type = actual_type(actual);
        if expected_type != actual_type || expected.nullable != actual.nullable {
            result.mismatches.push(ColumnMismatch {
                column: expected.name.clone(),
                expected_type,
                actual_type,
                expected_nullable: expected.nullable,
                actual_nullable: actual.nullable,
            });
        }
    }

    result.only_in_target = target
        .iter()
        .zip(&matched)
        .filter(|(_, m)| !**m)
        .map(|(c, _)| c.name.clone())
        .collect();
    Ok(result)
}

/// Sequence position relative to the data it feeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceCheck {
    pub column: String,
    pub next_value: Option<i64>,
    pub max_value: Option<i64>,
    pub ok: bool,
}

/// Verification report for one table.
#[derive(Debug, Clone, Serialize)]
pub struct StructureReport {
    pub table: String,
    pub target_table: String,
    pub target_exists: bool,
    pub columns: ColumnComparison,
    pub source_rows: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_rows: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<SequenceCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<IdCheck>,
}

impl StructureReport {
    pub fn rows_match(&self) -> bool {
        self.target_rows == Some(self.source_rows)
    }

    pub fn is_ok(&self) -> bool {
        self.target_exists
            && self.columns.is_clean()
            && self.rows_match()
            && self.sequence.as_ref().map(|s| s.ok).unwrap_or(true)
            && self.ids.as_ref().map(IdCheck::is_ok).unwrap_or(true)
    }
}

/// Compares source and target tables without modifying either.
pub struct Verifier<'a> {
    source: &'a dyn SourceSchema,
    target: &'a dyn TargetSchema,
    mapper: &'a TypeMapper,
    config: &'a MigrationConfig,
}

impl<'a> Verifier<'a> {
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

    /// Source columns from live facts, overrides applied, source case.
    async fn source_spec(&self, table: &str) -> Result<TableSpec> {
        let facts = self.source.column_facts(table).await?;
        let mut spec = TableSpec::new(table);
        spec.columns = facts
            .into_iter()
            .map(|f| ColumnSpec {
                nullable: f.nullable,
                auto_increment: f.auto_increment,
                ..ColumnSpec::new(f.name, f.data_type)
            })
            .collect();
        if let Some(table_override) = self.config.override_for(table) {
            apply_override(&mut spec, table_override);
        }
        Ok(spec)
    }

    /// Column compared id by id: the auto-increment column, else a
    /// single-column integer primary key.
    async fn id_column(&self, table: &str, source_spec: &TableSpec) -> Result<Option<usize>> {
        if let Some(i) = source_spec.columns.iter().position(|c| c.auto_increment) {
            return Ok(Some(i));
        }
        let described = self.source.describe_table(table).await?;
        let [pk] = described.primary_key.as_slice() else {
            return Ok(None);
        };
        Ok(source_spec
            .columns
            .iter()
            .position(|c| &c.name == pk && is_integer_type(&c.source_type)))
    }

    pub async fn verify_table(&self, table: &str) -> Result<StructureReport> {
        let source_spec = self.source_spec(table).await?;
        let spec = source_spec.with_case(self.config.case_mode);
        let target_table = spec.name.clone();
        let source_rows = self.source.row_count(table).await?;

        if !self.target.table_exists(&target_table).await? {
            warn!("{}: target table {} does not exist", table, target_table);
            return Ok(StructureReport {
                table: table.to_string(),
                target_table,
                target_exists: false,
                columns: ColumnComparison {
                    only_in_source: spec.column_names(),
                    ..ColumnComparison::default()
                },
                source_rows,
                target_rows: None,
                sequence: None,
                ids: None,
            });
        }

        let target_columns = self.target.columns(&target_table).await?;
        let table_ref = qualify_pg(self.target.schema(), &target_table)?;
        let columns = compare_columns(&table_ref, &spec.columns, &target_columns, self.mapper)?;
        let target_rows = self.target.row_count(&target_table).await?;

        let sequence = match spec.auto_increment_column() {
            Some(col) => Some(self.check_sequence(&target_table, &col.name, &target_columns).await?),
            None => None,
        };

        let id_column = if self.config.verify_ids {
            self.id_column(table, &source_spec).await?
        } else {
            None
        };
        let ids = match id_column {
            Some(i) if target_columns.iter().any(|c| c.name == spec.columns[i].name) => Some(
                compare_ids(
                    self.source,
                    self.target,
                    (table, source_spec.columns[i].name.as_str()),
                    (target_table.as_str(), spec.columns[i].name.as_str()),
                    ID_PAGE_SIZE,
                )
                .await?,
            ),
            _ => None,
        };

        let report = StructureReport {
            table: table.to_string(),
            target_table,
            target_exists: true,
            columns,
            source_rows,
            target_rows: Some(target_rows),
            sequence,
            ids,
        };
        log_report(&report);
        Ok(report)
    }

    async fn check_sequence(
        &self,
        table: &str,
        column: &str,
        target_columns: &[ColumnFacts],
    ) -> Result<SequenceCheck> {
        if !target_columns.iter().any(|c| c.name == column) {
            return Ok(SequenceCheck {
                column: column.to_string(),
                next_value: None,
                max_value: None,
                ok: false,
            });
        }
        let next_value = self.target.sequence_next_value(table, column).await?;
        let max_value = self.target.max_value(table, column).await?;
        let ok = match next_value {
            Some(next) => next > max_value.unwrap_or(0),
            None => false,
        };
        Ok(SequenceCheck {
            column: column.to_string(),
            next_value,
            max_value,
            ok,
        })
    }
}

fn log_report(report: &StructureReport) {
    let t = &report.table;
    for name in &report.columns.only_in_source {
        warn!("{}: column {} missing in target", t, name);
    }
    for name in &report.columns.only_in_target {
        warn!("{}: column {} only in target", t, name);
    }
    for diff in &report.columns.case_differences {
        warn!("{}: column case differs, suggested: {}", t, diff.suggested_sql);
    }
    for m in &report.columns.mismatches {
        warn!(
            "{}: column {} expected {} (nullable={}), found {} (nullable={})",
            t, m.column, m.expected_type, m.expected_nullable, m.actual_type, m.actual_nullable
        );
    }
    if !report.rows_match() {
        warn!(
            "{}: row count mismatch, source {} target {:?}",
            t, report.source_rows, report.target_rows
        );
    }
    if let Some(seq) = report.sequence.as_ref().filter(|s| !s.ok) {
        warn!(
            "{}: sequence for {} is behind (next {:?}, max {:?})",
            t, seq.column, seq.next_value, seq.max_value
        );
    }
    if let Some(ids) = report.ids.as_ref().filter(|c| !c.is_ok()) {
        warn!(
            "{}: {} ids differ: {} missing in target {:?}, {} extra in target {:?} \
             (source count {} min {:?} max {:?}, target count {} min {:?} max {:?})",
            t,
            ids.column,
            ids.missing_in_target,
            ids.missing_sample,
            ids.extra_in_target,
            ids.extra_sample,
            ids.source.count,
            ids.source.min,
            ids.source.max,
            ids.target.count,
            ids.target.min,
            ids.target.max
        );
    }
    if report.is_ok() {
        info!("{}: structure, row count and ids verified", t);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CaseMode;
    use crate::pipeline::{DataSource, TableMigrator};
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
        spec
    }

    fn source() -> MemorySource {
        MemorySource::default().with_table(
            clients(),
            vec![vec![Some("3"), Some("Ann"), None], vec![Some("8"), Some("Bob"), Some("x")]],
        )
    }

    fn facts(name: &str, data_type: &str, nullable: bool) -> ColumnFacts {
        ColumnFacts {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default: None,
            auto_increment: false,
        }
    }

    #[test]
    fn test_compare_columns_reports_differences() {
        let mapper = TypeMapper::builtin();
        let source = clients().columns;
        let target = vec![
            facts("ID", "integer", false),
            facts("fullName", "text", true),
            facts("extra", "integer", true),
        ];
        let cmp = compare_columns("\"public\".\"Clients\"", &source, &target, &mapper).unwrap();

        assert_eq!(cmp.only_in_source, vec!["note".to_string()]);
        assert_eq!(cmp.only_in_target, vec!["extra".to_string()]);
        assert_eq!(cmp.case_differences.len(), 1);
        assert_eq!(
            cmp.case_differences[0].suggested_sql,
            "ALTER TABLE \"public\".\"Clients\" RENAME COLUMN \"ID\" TO \"id\";"
        );
        // id lacks a nextval default, fullName is text instead of varchar
        let columns: Vec<_> = cmp.mismatches.iter().map(|m| m.column.as_str()).collect();
        assert_eq!(columns, vec!["id", "fullName"]);
        assert_eq!(cmp.mismatches[0].expected_type, "serial");
        assert_eq!(cmp.mismatches[0].actual_type, "integer");
        assert!(!cmp.is_clean());
    }

    #[test]
    fn test_compare_columns_clean() {
        let mapper = TypeMapper::builtin();
        let mut id = facts("id", "integer", false);
        id.default = Some("nextval('\"Clients_id_seq\"'::regclass)".into());
        let target = vec![
            id,
            facts("fullName", "character varying", true),
            facts("note", "text", true),
        ];
        let cmp = compare_columns("t", &clients().columns, &target, &mapper).unwrap();
        assert!(cmp.is_clean(), "{:?}", cmp);
    }

    #[tokio::test]
    async fn test_verify_after_migration() {
        let source = source();
        let target = MemoryTarget::default();
        let mapper = TypeMapper::builtin();
        let config = MigrationConfig::default();
        TableMigrator::new(&source, &target, &mapper, &config)
            .table_and_data(&clients(), &DataSource::Live)
            .await
            .unwrap();

        let report = Verifier::new(&source, &target, &mapper, &config)
            .verify_table("Clients")
            .await
            .unwrap();
        assert!(report.columns.is_clean(), "{:?}", report.columns);
        assert_eq!(report.source_rows, 2);
        assert_eq!(report.target_rows, Some(2));
        let seq = report.sequence.clone().unwrap();
        assert_eq!(seq.next_value, Some(9));
        assert_eq!(seq.max_value, Some(8));
        assert!(seq.ok);
        let ids = report.ids.clone().unwrap();
        assert_eq!(ids.column, "id");
        assert_eq!(ids.source.min, Some(3));
        assert_eq!(ids.target.max, Some(8));
        assert!(ids.is_ok());
        assert!(report.is_ok());
    }

    #[tokio::test]
    async fn test_verify_lower_case_target() {
        let source = source();
        let target = MemoryTarget::default();
        let mapper = TypeMapper::builtin();
        let config = MigrationConfig {
            case_mode: CaseMode::Lower,
            ..MigrationConfig::default()
        };
        TableMigrator::new(&source, &target, &mapper, &config)
            .table_and_data(&clients(), &DataSource::Live)
            .await
            .unwrap();

        let report = Verifier::new(&source, &target, &mapper, &config)
            .verify_table("Clients")
            .await
            .unwrap();
        assert_eq!(report.target_table, "clients");
        assert!(report.is_ok(), "{:?}", report);
    }

    #[tokio::test]
    async fn test_verify_missing_target_table() {
        let source = source();
        let target = MemoryTarget::default();
        let mapper = TypeMapper::builtin();
        let config = MigrationConfig::default();

        let report = Verifier::new(&source, &target, &mapper, &config)
            .verify_table("Clients")
            .await
            .unwrap();
        assert!(!report.target_exists);
        assert_eq!(report.columns.only_in_source.len(), 3);
        assert!(!report.is_ok());
        // read-only
        assert!(target.state.lock().unwrap().executed.is_empty());
    }

    #[tokio::test]
    async fn test_verify_detects_row_count_and_sequence() {
        let source = source();
        let target = MemoryTarget::default();
        let mapper = TypeMapper::builtin();
        let config = MigrationConfig::default();
        TableMigrator::new(&source, &target, &mapper, &config)
            .table_and_data(&clients(), &DataSource::Live)
            .await
            .unwrap();
        {
            let mut state = target.state.lock().unwrap();
            let table = state.tables.get_mut("Clients").unwrap();
            table.rows.push(vec![Some("40".into()), Some("Zed".into()), None]);
        }

        let report = Verifier::new(&source, &target, &mapper, &config)
            .verify_table("Clients")
            .await
            .unwrap();
        assert!(!report.rows_match());
        let seq = report.sequence.unwrap();
        assert_eq!(seq.max_value, Some(40));
        assert!(!seq.ok);
    }

    #[tokio::test]
    async fn test_verify_reports_renumbered_ids() {
        let source = source();
        let target = MemoryTarget::default();
        let mapper = TypeMapper::builtin();
        let config = MigrationConfig::default();
        TableMigrator::new(&source, &target, &mapper, &config)
            .table_and_data(&clients(), &DataSource::Live)
            .await
            .unwrap();
        {
            let mut state = target.state.lock().unwrap();
            let table = state.tables.get_mut("Clients").unwrap();
            table.rows[0][0] = Some("4".into());
        }

        let report = Verifier::new(&source, &target, &mapper, &config)
            .verify_table("Clients")
            .await
            .unwrap();
        assert!(report.rows_match());
        let ids = report.ids.clone().unwrap();
        assert_eq!(ids.missing_sample, vec![3]);
        assert_eq!(ids.extra_sample, vec![4]);
        assert_eq!(ids.source.count, ids.target.count);
        assert!(!report.is_ok());
    }

    #[tokio::test]
    async fn test_verify_ids_on_integer_primary_key() {
        let mut spec = TableSpec::new("Codes");
        let mut code = ColumnSpec::new("code", "smallint(5) unsigned");
        code.nullable = false;
        spec.columns.push(code);
        spec.columns.push(ColumnSpec::new("label", "varchar(20)"));
        spec.primary_key = vec!["code".into()];
        let source = MemorySource::default().with_table(
            spec.clone(),
            vec![vec![Some("10"), Some("a")], vec![Some("20"), Some("b")]],
        );
        let target = MemoryTarget::default();
        let mapper = TypeMapper::builtin();
        let config = MigrationConfig::default();
        TableMigrator::new(&source, &target, &mapper, &config)
            .table_and_data(&spec, &DataSource::Live)
            .await
            .unwrap();

        let report = Verifier::new(&source, &target, &mapper, &config)
            .verify_table("Codes")
            .await
            .unwrap();
        assert!(report.sequence.is_none());
        let ids = report.ids.clone().unwrap();
        assert_eq!(ids.column, "code");
        assert_eq!(ids.source.count, 2);
        assert!(report.is_ok(), "{:?}", report);
    }

    #[tokio::test]
    async fn test_verify_ids_can_be_disabled() {
        let source = source();
        let target = MemoryTarget::default();
        let mapper = TypeMapper::builtin();
        let config = MigrationConfig {
            verify_ids: false,
            ..MigrationConfig::default()
        };
        TableMigrator::new(&source, &target, &mapper, &config)
            .table_and_data(&clients(), &DataSource::Live)
            .await
            .unwrap();

        let report = Verifier::new(&source, &target, &mapper, &config)
            .verify_table("Clients")
            .await
            .unwrap();
        assert!(report.ids.is_none());
        assert!(report.is_ok());
    }
}
