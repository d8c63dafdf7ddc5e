//! Subprocess-per-table batch runner.
//!
//! Each table listed in the batch file is migrated by a separate invocation
//! of the CLI (`table <name> ...`), so one table crashing or hanging cannot
//! take the others down. Output of every invocation goes to its own log file.
//! A table whose process cannot be started, or whose log cannot be written,
//! is recorded as failed and the batch moves on.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::command::{run_command, CommandOptions, CommandOutput};
use crate::error::{MigrateError, Result};

/// Read a table list: one name per line, blank lines and `#` comments skipped.
pub fn read_table_list(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        MigrateError::Config(format!("cannot read table list {}: {}", path.display(), e))
    })?;
    Ok(parse_table_list(&text))
}

fn parse_table_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Result of one table's subprocess.
#[derive(Debug, Clone, Serialize)]
pub struct BatchTableRun {
    pub table: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub duration_seconds: f64,
    pub log_file: PathBuf,
    /// Set when the process could not be run or its log not written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub cancelled: bool,
    pub runs: Vec<BatchTableRun>,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }
}

/// Runs `program [config args] table <name> [phase args] [--verify]` once
/// per table.
pub struct BatchRunner {
    program: PathBuf,
    base_args: Vec<String>,
    log_dir: PathBuf,
    timeout: Duration,
    verify: bool,
}

impl BatchRunner {
    pub fn new(program: impl Into<PathBuf>, log_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            log_dir: log_dir.into(),
            timeout,
            verify: false,
        }
    }

    /// Arguments placed before the `table` subcommand (e.g. `--config x`).
    pub fn with_base_args(mut self, args: Vec<String>) -> Self {
        self.base_args = args;
        self
    }

    /// Pass `--verify` to every `table` invocation, so a table only counts
    /// as migrated when its verification passes.
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub async fn run(
        &self,
        tables: &[String],
        phase_args: &[String],
        cancel: &CancellationToken,
    ) -> Result<BatchSummary> {
        tokio::fs::create_dir_all(&self.log_dir).await?;
        let program = self.program.to_string_lossy().into_owned();
        let opts = CommandOptions::with_timeout(self.timeout);
        let mut summary = BatchSummary::default();

        for (i, table) in tables.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!("Batch cancelled before {}", table);
                summary.cancelled = true;
                break;
            }
            info!("[{}/{}] {}", i + 1, tables.len(), table);

            let mut args = self.base_args.clone();
            args.push("table".to_string());
            args.push(table.clone());
            args.extend(phase_args.iter().cloned());
            if self.verify {
                args.push("--verify".to_string());
            }

            let run = self.run_table(table, &program, &args, &opts).await;
            if run.success {
                info!("{}: ok ({:.1}s)", table, run.duration_seconds);
                summary.succeeded.push(table.clone());
            } else {
                summary.failed.push(table.clone());
            }
            summary.runs.push(run);
        }

        info!(
            "Batch finished: {} succeeded, {} failed",
            summary.succeeded.len(),
            summary.failed.len()
        );
        Ok(summary)
    }

    async fn run_table(
        &self,
        table: &str,
        program: &str,
        args: &[String],
        opts: &CommandOptions,
    ) -> BatchTableRun {
        let log_file = self.log_dir.join(format!("{}.log", log_name(table)));
        let header = format!("$ {} {}\n", program, args.join(" "));
        let mut run = BatchTableRun {
            table: table.to_string(),
            success: false,
            exit_code: None,
            timed_out: false,
            duration_seconds: 0.0,
            log_file,
            error: None,
        };

        let log = match run_command(program, args, opts).await {
            Ok(output) => {
                run.success = output.success;
                run.exit_code = output.code;
                run.timed_out = output.timed_out;
                run.duration_seconds = output.duration.as_secs_f64();
                format!("{}{}", header, render_output(&output))
            }
            Err(e) => {
                error!("{}: could not run {}: {}", table, program, e);
                run.error = Some(e.to_string());
                format!("{}--- error ---\n{}\n", header, e)
            }
        };

        if let Err(e) = tokio::fs::write(&run.log_file, log).await {
            error!("{}: cannot write {}: {}", table, run.log_file.display(), e);
            run.success = false;
            run.error.get_or_insert_with(|| format!("writing log: {}", e));
        }
        if !run.success && run.error.is_none() {
            error!(
                "{}: failed (exit {:?}{}), see {}",
                table,
                run.exit_code,
                if run.timed_out { ", timed out" } else { "" },
                run.log_file.display()
            );
        }
        run
    }
}

fn render_output(output: &CommandOutput) -> String {
    format!(
        "--- stdout ---\n{}\n--- stderr ---\n{}\n",
        output.stdout, output.stderr
    )
}

fn log_name(table: &str) -> String {
    table
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}
