//! mysql-pg-migrate CLI - MySQL to PostgreSQL schema and data migration.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use mysql_pg_migrate::config::SAMPLE_CONFIG;
use mysql_pg_migrate::ddl::render_constraints;
use mysql_pg_migrate::{
    parse_create_table, read_table_list, render_create_table, BatchRunner, CaseMode, Config,
    ConvertOptions, DataSource, MigrateError, MigrationPhase, Orchestrator, StructureReport,
    TableOutcome, TableSpec, TypeMapper,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mysql-pg-migrate")]
#[command(about = "MySQL to PostgreSQL schema and data migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Seconds to wait for the current operation after a shutdown signal
    #[arg(long, default_value = "60")]
    shutdown_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

/// Phase selection shared by `run`, `table` and `batch`.
#[derive(Args, Clone, Copy)]
struct PhaseArgs {
    /// Run a single phase: 1 = table and data, 2 = indexes, 3 = foreign keys
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=3), conflicts_with = "full")]
    phase: Option<u8>,

    /// Run phases 1, 2 and 3 (default)
    #[arg(long)]
    full: bool,
}

impl PhaseArgs {
    fn phases(&self) -> Vec<MigrationPhase> {
        match self.phase.and_then(MigrationPhase::from_number) {
            Some(phase) => vec![phase],
            None => MigrationPhase::ALL.to_vec(),
        }
    }

    /// Arguments forwarding this selection to a child process.
    fn to_args(self) -> Vec<String> {
        match self.phase {
            Some(n) => vec!["--phase".to_string(), n.to_string()],
            None => vec!["--full".to_string()],
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate all tables in dependency order
    Run {
        #[command(flatten)]
        phases: PhaseArgs,

        /// Comma-separated list of tables (default: all selected by config)
        #[arg(long, value_delimiter = ',')]
        tables: Option<Vec<String>>,
    },

    /// Migrate a single table
    Table {
        /// Source table name
        name: String,

        #[command(flatten)]
        phases: PhaseArgs,

        /// Verify structure and row count afterwards
        #[arg(long)]
        verify: bool,

        /// Import rows from a tab-separated export instead of querying MySQL
        #[arg(long)]
        data_file: Option<PathBuf>,

        /// The data file starts with a header line
        #[arg(long, requires = "data_file")]
        header: bool,
    },

    /// Compare structure and row counts between source and target
    Verify {
        /// Comma-separated list of tables (default: all selected by config)
        #[arg(long, value_delimiter = ',')]
        tables: Option<Vec<String>>,
    },

    /// Convert MySQL CREATE TABLE text to PostgreSQL DDL
    Convert {
        /// File with SHOW CREATE TABLE output, or - for stdin
        #[arg(required_unless_present = "table")]
        file: Option<String>,

        /// Read the definition from the live source instead (needs config)
        #[arg(long, conflicts_with = "file")]
        table: Option<String>,

        /// Identifier case: preserve or lower
        #[arg(long)]
        case_mode: Option<String>,

        /// Qualify names with this schema
        #[arg(long)]
        schema: Option<String>,

        /// Also print primary key, index and foreign key statements
        #[arg(long)]
        constraints: bool,
    },

    /// Run `table` for each listed table in its own process
    Batch {
        /// Table list file (default: batch.list_file from config)
        #[arg(long)]
        list: Option<PathBuf>,

        /// Directory for per-table logs (default: batch.log_dir from config)
        #[arg(long)]
        log_dir: Option<PathBuf>,

        #[command(flatten)]
        phases: PhaseArgs,

        /// Verify each table after migrating it; a failed check fails the table
        #[arg(long)]
        verify: bool,
    },

    /// Test database connections
    HealthCheck,

    /// Write a commented starter configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    // init writes plain output only
    if !matches!(cli.command, Commands::Init { .. }) {
        setup_logging(&cli.verbosity, &cli.log_format);
    }

    match cli.command {
        Commands::Init { output, force } => write_sample_config(&output, force),

        Commands::Run { phases, tables } => {
            let config = load_config(&cli.config)?;
            let cancel = setup_signal_handler(cli.shutdown_timeout);
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator
                .run(&phases.phases(), tables.as_deref(), &cancel)
                .await?;
            orchestrator.close().await;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                for outcome in &result.tables {
                    print_outcome(outcome);
                }
                println!("\nMigration {}", result.status);
                println!("  Run ID: {}", result.run_id);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Tables: {}/{}", result.tables_success, result.tables_total);
                println!("  Rows: {}", result.rows_transferred);
                if result.rows_dropped > 0 {
                    println!("  Rows dropped: {}", result.rows_dropped);
                }
                if !result.failed_tables.is_empty() {
                    println!("  Failed tables: {}", result.failed_tables.join(", "));
                }
            }

            if result.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }
            if !result.is_success() {
                return Err(MigrateError::Validation(format!(
                    "{} of {} tables failed",
                    result.tables_failed, result.tables_total
                )));
            }
            Ok(())
        }

        Commands::Table {
            name,
            phases,
            verify,
            data_file,
            header,
        } => {
            let config = load_config(&cli.config)?;
            let cancel = setup_signal_handler(cli.shutdown_timeout);
            let data = match data_file {
                Some(path) => DataSource::TsvFile {
                    path,
                    has_header: header,
                },
                None => DataSource::Live,
            };
            let orchestrator = Orchestrator::new(config).await?;
            let outcome = orchestrator
                .migrate_table(&name, &phases.phases(), &data)
                .await?;
            let report = if verify && outcome.is_success() {
                let only = [name.clone()];
                orchestrator.verify(Some(&only)).await?.pop()
            } else {
                None
            };
            orchestrator.close().await;

            if cli.output_json {
                let json = serde_json::json!({ "table": outcome, "verify": report });
                println!("{}", serde_json::to_string_pretty(&json)?);
            } else {
                print_outcome(&outcome);
                if let Some(report) = &report {
                    print_report(report);
                }
            }

            if let Some(error) = &outcome.error {
                return Err(MigrateError::transfer(&name, error.clone()));
            }
            if cancel.is_cancelled() {
                return Err(MigrateError::Cancelled);
            }
            if report.is_some_and(|r| !r.is_ok()) {
                return Err(MigrateError::Validation(format!(
                    "{}: verification found discrepancies",
                    name
                )));
            }
            Ok(())
        }

        Commands::Verify { tables } => {
            let config = load_config(&cli.config)?;
            let orchestrator = Orchestrator::new(config).await?;
            let reports = orchestrator.verify(tables.as_deref()).await?;
            orchestrator.close().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                for report in &reports {
                    print_report(report);
                }
            }
            let bad = reports.iter().filter(|r| !r.is_ok()).count();
            if bad > 0 {
                return Err(MigrateError::Validation(format!(
                    "{} of {} tables differ",
                    bad,
                    reports.len()
                )));
            }
            Ok(())
        }

        Commands::Convert {
            file,
            table,
            case_mode,
            schema,
            constraints,
        } => {
            let case_mode = parse_case_mode(case_mode.as_deref())?;
            match (file, table) {
                (Some(file), _) => {
                    // offline: neither config nor database
                    let spec = parse_create_table(&read_input(&file)?)?;
                    let opts = ConvertOptions::new(case_mode.unwrap_or_default(), schema);
                    print_conversion(&spec, &TypeMapper::builtin(), &opts, constraints)
                }
                (None, Some(table)) => {
                    let config = load_config(&cli.config)?;
                    let mapper = TypeMapper::with_rules(&config.migration.type_mappings)?;
                    let opts = ConvertOptions::new(
                        case_mode.unwrap_or(config.migration.case_mode),
                        Some(schema.unwrap_or_else(|| config.target.schema.clone())),
                    );
                    let orchestrator = Orchestrator::new(config).await?;
                    let spec = orchestrator.table_definition(&table).await;
                    orchestrator.close().await;
                    print_conversion(&spec?, &mapper, &opts, constraints)
                }
                (None, None) => Err(MigrateError::Config(
                    "convert needs a file, - for stdin, or --table".to_string(),
                )),
            }
        }

        Commands::Batch {
            list,
            log_dir,
            phases,
            verify,
        } => {
            let config = load_config(&cli.config)?;
            let cancel = setup_signal_handler(cli.shutdown_timeout);
            let list = list.unwrap_or_else(|| config.batch.list_file.clone());
            let log_dir = log_dir.unwrap_or_else(|| config.batch.log_dir.clone());
            let tables = read_table_list(&list)?;
            info!("Batch of {} tables from {}", tables.len(), list.display());

            let program = std::env::current_exe()?;
            let base_args = vec![
                "--config".to_string(),
                cli.config.to_string_lossy().into_owned(),
                "--log-format".to_string(),
                cli.log_format.clone(),
                "--verbosity".to_string(),
                cli.verbosity.clone(),
            ];
            let runner = BatchRunner::new(program, log_dir, config.migration.bulk_timeout())
                .with_base_args(base_args)
                .with_verify(verify);
            let summary = runner.run(&tables, &phases.to_args(), &cancel).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                for run in &summary.runs {
                    let mark = if run.success { "✓" } else { "✗" };
                    println!(
                        "{} {} ({:.1}s, log {})",
                        mark,
                        run.table,
                        run.duration_seconds,
                        run.log_file.display()
                    );
                }
                println!(
                    "\nBatch: {} succeeded, {} failed",
                    summary.succeeded.len(),
                    summary.failed.len()
                );
            }

            if summary.cancelled {
                return Err(MigrateError::Cancelled);
            }
            if !summary.failed.is_empty() {
                return Err(MigrateError::Validation(format!(
                    "batch tables failed: {}",
                    summary.failed.join(", ")
                )));
            }
            Ok(())
        }

        Commands::HealthCheck => {
            let config = load_config(&cli.config)?;
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.health_check().await?;
            orchestrator.close().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  {} Source (MySQL): {} ({}ms)",
                    if result.source_connected { "✓" } else { "✗" },
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  {} Target (PostgreSQL): {} ({}ms)",
                    if result.target_connected { "✓" } else { "✗" },
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
            }

            if !result.healthy {
                return Err(MigrateError::Validation("Health check failed".to_string()));
            }
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<Config, MigrateError> {
    let config = Config::load(path)?;
    info!("Loaded configuration from {:?}", path);
    Ok(config)
}

fn write_sample_config(output: &Path, force: bool) -> Result<(), MigrateError> {
    if output.exists() && !force {
        return Err(MigrateError::Config(format!(
            "{} already exists (use --force to overwrite)",
            output.display()
        )));
    }
    std::fs::write(output, SAMPLE_CONFIG)?;
    println!("✓ Wrote {}", output.display());
    Ok(())
}

fn read_input(file: &str) -> Result<String, MigrateError> {
    if file == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        Ok(std::fs::read_to_string(file)?)
    }
}

fn parse_case_mode(value: Option<&str>) -> Result<Option<CaseMode>, MigrateError> {
    value
        .map(|v| {
            CaseMode::parse(v).ok_or_else(|| {
                MigrateError::Config(format!(
                    "invalid case mode '{}' (expected preserve or lower)",
                    v
                ))
            })
        })
        .transpose()
}

fn print_conversion(
    spec: &TableSpec,
    mapper: &TypeMapper,
    opts: &ConvertOptions,
    constraints: bool,
) -> Result<(), MigrateError> {
    println!("{}", render_create_table(spec, mapper, opts)?);
    if constraints {
        for statement in render_constraints(spec, opts)? {
            println!("{};", statement);
        }
    }
    Ok(())
}

fn print_outcome(outcome: &TableOutcome) {
    let phases = outcome
        .phases
        .iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(",");
    match &outcome.error {
        None => {
            let mut line = format!("✓ {} (phases {}", outcome.table, phases);
            if let Some(load) = &outcome.load {
                line.push_str(&format!(", {} rows", load.rows_copied));
                if load.rows_dropped > 0 {
                    line.push_str(&format!(", {} dropped", load.rows_dropped));
                }
            }
            if let Some(idx) = &outcome.indexes {
                line.push_str(&format!(
                    ", indexes {} created/{} skipped",
                    idx.created, idx.skipped
                ));
            }
            if let Some(fk) = &outcome.foreign_keys {
                line.push_str(&format!(
                    ", foreign keys {} created/{} skipped",
                    fk.created, fk.skipped
                ));
            }
            println!("{})", line);
        }
        Some(error) => println!("✗ {}: {}", outcome.table, error),
    }
}

fn print_report(report: &StructureReport) {
    if report.is_ok() {
        println!(
            "✓ {} ({} rows, structure matches)",
            report.table, report.source_rows
        );
        return;
    }
    println!("✗ {}", report.table);
    if !report.target_exists {
        println!("  - target table {} does not exist", report.target_table);
        return;
    }
    let columns = &report.columns;
    for name in &columns.only_in_source {
        println!("  - column {} missing in target", name);
    }
    for name in &columns.only_in_target {
        println!("  - column {} only in target", name);
    }
    for diff in &columns.case_differences {
        println!("  - case differs: {}", diff.suggested_sql);
    }
    for m in &columns.mismatches {
        println!(
            "  - {}: expected {}{}, found {}{}",
            m.column,
            m.expected_type,
            if m.expected_nullable { "" } else { " NOT NULL" },
            m.actual_type,
            if m.actual_nullable { "" } else { " NOT NULL" }
        );
    }
    if !report.rows_match() {
        println!(
            "  - rows: source {}, target {}",
            report.source_rows,
            report.target_rows.unwrap_or(0)
        );
    }
    if let Some(seq) = report.sequence.as_ref().filter(|s| !s.ok) {
        println!(
            "  - sequence on {} not ahead of data (next {:?}, max {:?})",
            seq.column, seq.next_value, seq.max_value
        );
    }
    if let Some(ids) = report.ids.as_ref().filter(|c| !c.is_ok()) {
        println!(
            "  - ids on {}: source {} [{:?}..{:?}], target {} [{:?}..{:?}]",
            ids.column,
            ids.source.count,
            ids.source.min,
            ids.source.max,
            ids.target.count,
            ids.target.min,
            ids.target.max
        );
        if ids.missing_in_target > 0 {
            println!(
                "    {} missing in target, first {:?}",
                ids.missing_in_target, ids.missing_sample
            );
        }
        if ids.extra_in_target > 0 {
            println!(
                "    {} extra in target, first {:?}",
                ids.extra_in_target, ids.extra_sample
            );
        }
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries command output (DDL, JSON results)
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel the returned token on SIGINT or SIGTERM. The current table
/// operation gets `shutdown_timeout` seconds to finish before the process
/// exits with the cancellation code.
fn setup_signal_handler(shutdown_timeout: u64) -> CancellationToken {
    let cancel_token = CancellationToken::new();

    let token = cancel_token.clone();
    tokio::spawn(async move {
        let name = wait_for_shutdown_signal().await;
        eprintln!(
            "\nReceived {}. Finishing the current operation (timeout: {}s)...",
            name, shutdown_timeout
        );
        token.cancel();
        tokio::time::sleep(Duration::from_secs(shutdown_timeout)).await;
        eprintln!("Shutdown timeout reached, exiting");
        std::process::exit(i32::from(MigrateError::Cancelled.exit_code()));
    });

    cancel_token
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> &'static str {
    let (mut sigint, mut sigterm) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(i), Ok(t)) => (i, t),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Cannot install signal handlers: {}", e);
            return std::future::pending().await;
        }
    };
    tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
    "Ctrl-C"
}
