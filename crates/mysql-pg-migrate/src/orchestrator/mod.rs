//! Migration orchestrator - runs the per-table pipeline over a whole database.

pub mod batch;
pub mod order;

pub use batch::{read_table_list, BatchRunner, BatchSummary, BatchTableRun};
pub use order::dependency_order;

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::core::identifier::quote_pg;
use crate::core::{MigrationPhase, SourceSchema, TableSpec, TargetSchema};
use crate::ddl::{parse_create_table, TypeMapper};
use crate::drivers::{MysqlSource, PostgresTarget};
use crate::error::{MigrateError, Result};
use crate::pipeline::{DataSource, TableMigrator, TableOutcome};
use crate::verify::{StructureReport, Verifier};

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    mapper: TypeMapper,
    source: Arc<dyn SourceSchema>,
    target: Arc<dyn TargetSchema>,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// "completed", "failed" or "cancelled".
    pub status: String,

    pub duration_seconds: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,

    /// SHA-256 of the configuration used for the run.
    pub config_hash: String,

    /// Phases requested, in execution order.
    pub phases: Vec<u8>,

    pub tables_total: usize,
    pub tables_success: usize,
    pub tables_failed: usize,
    pub rows_transferred: u64,
    pub rows_dropped: u64,
    pub failed_tables: Vec<String>,

    /// Per-table outcomes in dependency order.
    pub tables: Vec<TableOutcome>,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn is_success(&self) -> bool {
        self.status == "completed"
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == "cancelled"
    }
}

/// Connectivity of both ends.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_error: Option<String>,
    pub healthy: bool,
}

impl Orchestrator {
    /// Connect to both databases.
    pub async fn new(config: Config) -> Result<Self> {
        let qt = config.migration.query_timeout();
        let bt = config.migration.bulk_timeout();
        let source = MysqlSource::connect(&config.source, qt, bt).await?;
        let target = PostgresTarget::connect(&config.target, qt, bt).await?;
        Self::with_endpoints(config, Arc::new(source), Arc::new(target))
    }

    /// Build an orchestrator over already-connected endpoints.
    pub fn with_endpoints(
        config: Config,
        source: Arc<dyn SourceSchema>,
        target: Arc<dyn TargetSchema>,
    ) -> Result<Self> {
        let mapper = TypeMapper::with_rules(&config.migration.type_mappings)?;
        Ok(Self {
            config,
            mapper,
            source,
            target,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Parse the source's `SHOW CREATE TABLE` text for `table` and apply
    /// its configured override.
    pub async fn table_definition(&self, table: &str) -> Result<TableSpec> {
        let text = self.source.show_create_table(table).await?;
        let parsed = parse_create_table(&text)?;
        Ok(self.migrator().effective_spec(&parsed))
    }

    fn migrator(&self) -> TableMigrator<'_> {
        TableMigrator::new(
            self.source.as_ref(),
            self.target.as_ref(),
            &self.mapper,
            &self.config.migration,
        )
    }

    /// Source tables selected by the include/exclude globs and `skip`
    /// overrides, further narrowed to `only` when given.
    pub async fn resolve_tables(&self, only: Option<&[String]>) -> Result<Vec<String>> {
        let all = self.source.list_tables().await?;
        let filter = self.config.table_filter()?;
        let selected: Vec<String> = filter
            .apply(&all)
            .into_iter()
            .filter(|t| {
                let skipped = self.config.migration.is_skipped(t);
                if skipped {
                    info!("{}: skipped by override", t);
                }
                !skipped
            })
            .collect();

        let Some(only) = only else {
            return Ok(selected);
        };
        let mut resolved = Vec::with_capacity(only.len());
        let mut missing = Vec::new();
        for name in only {
            match selected.iter().find(|t| t.eq_ignore_ascii_case(name)) {
                Some(t) => resolved.push(t.clone()),
                None => missing.push(name.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(MigrateError::Validation(format!(
                "tables not found or excluded: {}",
                missing.join(", ")
            )));
        }
        Ok(resolved)
    }

    /// Run `phases` over every selected table.
    ///
    /// Each phase runs for all tables before the next phase starts. A table
    /// that fails a phase is left out of the later phases; the others go on.
    /// Cancellation is honored between tables.
    pub async fn run(
        &self,
        phases: &[MigrationPhase],
        only: Option<&[String]>,
        cancel: &CancellationToken,
    ) -> Result<MigrationResult> {
        let started = Instant::now();
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let mut phases = phases.to_vec();
        phases.sort();
        phases.dedup();

        info!("Starting migration run: {}", run_id);

        if phases.contains(&MigrationPhase::TableAndData) {
            let sql = format!(
                "CREATE SCHEMA IF NOT EXISTS {}",
                quote_pg(self.target.schema())?
            );
            self.target.execute_ddl(&sql).await?;
        }

        let names = self.resolve_tables(only).await?;
        let mut outcomes: Vec<TableOutcome> = Vec::new();
        let mut specs = Vec::with_capacity(names.len());
        for name in &names {
            match self.source.describe_table(name).await {
                Ok(spec) => specs.push(spec),
                Err(e) => {
                    error!("{}: describe failed: {}", name, e);
                    outcomes.push(TableOutcome::failed(name, format!("describe: {}", e)));
                }
            }
        }

        let order = dependency_order(&specs);
        info!("Migrating {} tables: {}", order.len(), order.join(", "));
        let mut ordered: Vec<(TableSpec, Option<TableOutcome>)> = order
            .iter()
            .filter_map(|name| specs.iter().find(|s| &s.name == name).cloned())
            .map(|spec| (spec, None))
            .collect();

        let migrator = self.migrator();
        let mut cancelled = false;
        'phases: for phase in &phases {
            info!("=== {} ===", phase);
            for (spec, outcome) in ordered.iter_mut() {
                if cancel.is_cancelled() {
                    warn!("Cancellation requested, stopping before {}", spec.name);
                    cancelled = true;
                    break 'phases;
                }
                if outcome.as_ref().is_some_and(|o| !o.is_success()) {
                    continue;
                }
                let step = migrator.run(spec, &[*phase], &DataSource::Live).await;
                match outcome {
                    Some(existing) => existing.absorb(step),
                    None => *outcome = Some(step),
                }
            }
        }
        outcomes.extend(ordered.into_iter().filter_map(|(_, o)| o));

        let completed_at = Utc::now();
        let tables_failed = outcomes.iter().filter(|o| !o.is_success()).count();
        let status = if cancelled {
            "cancelled"
        } else if tables_failed > 0 {
            "failed"
        } else {
            "completed"
        };

        let result = MigrationResult {
            run_id,
            status: status.to_string(),
            duration_seconds: started.elapsed().as_secs_f64(),
            started_at,
            completed_at,
            config_hash: self.config.hash(),
            phases: phases.iter().map(|p| p.number()).collect(),
            tables_total: names.len(),
            tables_success: outcomes.iter().filter(|o| o.is_success()).count(),
            tables_failed,
            rows_transferred: outcomes.iter().map(|o| o.rows_copied()).sum(),
            rows_dropped: outcomes.iter().map(|o| o.rows_dropped()).sum(),
            failed_tables: outcomes
                .iter()
                .filter(|o| !o.is_success())
                .map(|o| o.table.clone())
                .collect(),
            tables: outcomes,
        };

        info!(
            "Migration {}: {}/{} tables, {} rows in {:.1}s",
            result.status,
            result.tables_success,
            result.tables_total,
            result.rows_transferred,
            result.duration_seconds
        );
        Ok(result)
    }

    /// Run `phases` for a single table by name.
    pub async fn migrate_table(
        &self,
        name: &str,
        phases: &[MigrationPhase],
        data: &DataSource,
    ) -> Result<TableOutcome> {
        let spec = self.source.describe_table(name).await?;
        if phases.contains(&MigrationPhase::TableAndData) {
            let sql = format!(
                "CREATE SCHEMA IF NOT EXISTS {}",
                quote_pg(self.target.schema())?
            );
            self.target.execute_ddl(&sql).await?;
        }
        let mut phases = phases.to_vec();
        phases.sort();
        phases.dedup();
        Ok(self.migrator().run(&spec, &phases, data).await)
    }

    /// One structure report per selected table.
    pub async fn verify(&self, only: Option<&[String]>) -> Result<Vec<StructureReport>> {
        let verifier = Verifier::new(
            self.source.as_ref(),
            self.target.as_ref(),
            &self.mapper,
            &self.config.migration,
        );
        let mut reports = Vec::new();
        for table in self.resolve_tables(only).await? {
            reports.push(verifier.verify_table(&table).await?);
        }
        Ok(reports)
    }

    /// Ping both ends and time the round trips.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let started = Instant::now();
        let source = self.source.ping().await;
        let source_latency_ms = started.elapsed().as_millis() as u64;

        let started = Instant::now();
        let target = self.target.ping().await;
        let target_latency_ms = started.elapsed().as_millis() as u64;

        let healthy = source.is_ok() && target.is_ok();
        Ok(HealthCheckResult {
            source_connected: source.is_ok(),
            source_latency_ms,
            source_error: source.err().map(|e| e.to_string()),
            target_connected: target.is_ok(),
            target_latency_ms,
            target_error: target.err().map(|e| e.to_string()),
            healthy,
        })
    }

    /// Close both pools.
    pub async fn close(&self) {
        self.source.close().await;
        self.target.close().await;
    }
}
