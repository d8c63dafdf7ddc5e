//! External process execution with a time budget.
//!
//! Output is captured and decoded as UTF-8 with lossy replacement. A
//! non-zero exit or an expired timeout is reported in [`CommandOutput`];
//! only a failure to start or wait for the process is an error. Output
//! produced before a timeout is kept.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{MigrateError, Result};

/// Default budget for short metadata commands.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Default budget for bulk operations.
pub const BULK_TIMEOUT: Duration = Duration::from_secs(3600);

/// How long to keep reading pipes after the process is gone. A grandchild
/// can hold them open past its parent.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Options for [`run_command`].
#[derive(Debug, Clone)]
pub struct CommandOptions {
    pub timeout: Duration,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            timeout: QUERY_TIMEOUT,
            env: Vec::new(),
            cwd: None,
        }
    }
}

impl CommandOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

/// Captured result of a finished (or killed) process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    /// Exit code; `None` when killed by a signal or on timeout.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration: Duration,
}

/// Bytes read from one pipe so far.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn push(&self, bytes: &[u8]) {
        if let Ok(mut buf) = self.0.lock() {
            buf.extend_from_slice(bytes);
        }
    }

    fn text(&self) -> String {
        match self.0.lock() {
            Ok(buf) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => String::new(),
        }
    }
}

fn capture<R>(pipe: Option<R>) -> (Captured, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let captured = Captured::default();
    let sink = captured.clone();
    let reader = tokio::spawn(async move {
        let Some(mut pipe) = pipe else {
            return;
        };
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink.push(&chunk[..n]),
            }
        }
    });
    (captured, reader)
}

/// Run `program` with `args` and wait for it under `opts.timeout`.
///
/// On timeout the child is killed, `timed_out` is set and whatever it wrote
/// up to then is returned.
pub async fn run_command(
    program: &str,
    args: &[String],
    opts: &CommandOptions,
) -> Result<CommandOutput> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in &opts.env {
        cmd.env(key, value);
    }
    if let Some(dir) = &opts.cwd {
        cmd.current_dir(dir);
    }

    debug!("Running {} {}", program, args.join(" "));
    let started = Instant::now();
    let command_error = |e: std::io::Error| MigrateError::Command {
        program: program.to_string(),
        message: e.to_string(),
    };
    let mut child = cmd.spawn().map_err(command_error)?;
    let (stdout, mut stdout_reader) = capture(child.stdout.take());
    let (stderr, mut stderr_reader) = capture(child.stderr.take());

    let status = match tokio::time::timeout(opts.timeout, child.wait()).await {
        Ok(status) => Some(status.map_err(command_error)?),
        Err(_) => {
            warn!(
                "{} timed out after {}s and was killed",
                program,
                opts.timeout.as_secs()
            );
            if let Err(e) = child.kill().await {
                warn!("{}: kill failed: {}", program, e);
            }
            None
        }
    };
    let duration = started.elapsed();

    let drained = tokio::time::timeout(OUTPUT_DRAIN_GRACE, async {
        let _ = (&mut stdout_reader).await;
        let _ = (&mut stderr_reader).await;
    })
    .await;
    if drained.is_err() {
        debug!("{}: output pipes still open, keeping what was read", program);
        stdout_reader.abort();
        stderr_reader.abort();
    }

    let mut stderr = stderr.text();
    let timed_out = status.is_none();
    if timed_out {
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        stderr.push_str(&format!("timed out after {}s", opts.timeout.as_secs()));
    }
    Ok(CommandOutput {
        success: status.is_some_and(|s| s.success()),
        code: status.and_then(|s| s.code()),
        stdout: stdout.text(),
        stderr,
        timed_out,
        duration,
    })
}
