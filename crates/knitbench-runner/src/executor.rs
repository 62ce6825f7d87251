//! Running a prepared candidate under time and memory limits.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use knitbench_core::traits::{ExecOutcome, ExecStatus};

use crate::sandbox::Sandbox;

/// Limits applied to one program run.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub timeout: Duration,
    /// Address-space cap in KiB; `None` leaves it unbounded.
    pub memory_kb: Option<u64>,
    /// Captured stdout and stderr are each cut to this many bytes.
    pub max_output_bytes: usize,
}

/// Build the command that runs `program args..`, wrapped in a shell that
/// applies the memory cap where the platform supports it.
fn command(program: &Path, args: &[&str], memory_kb: Option<u64>) -> Command {
    match memory_kb.filter(|_| cfg!(unix)) {
        Some(kb) => {
            let mut cmd = Command::new("/bin/sh");
            cmd.arg("-c")
                .arg(format!("ulimit -v {kb} && exec \"$0\" \"$@\""))
                .arg(program)
                .args(args);
            cmd
        }
        None => {
            let mut cmd = Command::new(program);
            cmd.args(args);
            cmd
        }
    }
}

/// Read at most `max + 1` bytes, so the caller can tell the stream was cut.
/// The pipe is closed on return; a child still writing gets `EPIPE`.
async fn read_capped<R: AsyncRead + Unpin>(pipe: R, max: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(max.min(64 * 1024) + 1);
    pipe.take(max as u64 + 1).read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Run `program` inside the sandbox, feeding `stdin` and enforcing `limits`.
///
/// The child is killed when the wall-clock limit expires, or as soon as it
/// writes more than `max_output_bytes` to either stream. At most that many
/// bytes per stream are ever held in memory.
pub async fn run_program(
    sandbox: &Sandbox,
    program: &Path,
    args: &[&str],
    stdin: &str,
    limits: Limits,
) -> Result<ExecOutcome> {
    let start = Instant::now();

    let mut cmd = command(program, args, limits.memory_kb);
    cmd.current_dir(sandbox.work_dir())
        .env_clear()
        .envs(sandbox.build_env())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to start {}", program.display()))?;

    // Feed stdin from a separate task so a child that never reads cannot
    // block us before the timeout starts counting.
    if let Some(mut pipe) = child.stdin.take() {
        let input = stdin.as_bytes().to_vec();
        tokio::spawn(async move {
            // A child that exits early closes the pipe; that is not an error.
            let _ = pipe.write_all(&input).await;
        });
    }

    let stdout = child.stdout.take().context("candidate stdout was not captured")?;
    let stderr = child.stderr.take().context("candidate stderr was not captured")?;
    let max = limits.max_output_bytes;

    let run = async {
        let (out, err) = tokio::try_join!(read_capped(stdout, max), read_capped(stderr, max))?;
        if out.len() > max || err.len() > max {
            tracing::debug!(max_output_bytes = max, "candidate exceeded output cap");
            // Already gone if it died of EPIPE.
            let _ = child.start_kill();
        }
        let status = child.wait().await?;
        Ok::<_, std::io::Error>((status, out, err))
    };

    let (status, out, err) = match tokio::time::timeout(limits.timeout, run).await {
        Ok(result) => result.context("failed to wait for candidate process")?,
        Err(_) => {
            tracing::debug!(timeout_ms = limits.timeout.as_millis() as u64, "candidate timed out");
            return Ok(ExecOutcome {
                status: ExecStatus::TimedOut,
                stdout: String::new(),
                stderr: String::new(),
                duration_ms: start.elapsed().as_millis() as u64,
            });
        }
    };

    Ok(ExecOutcome {
        status: ExecStatus::Completed {
            exit_code: status.code(),
        },
        stdout: truncate(&out, max),
        stderr: truncate(&err, max),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Decode at most `max` bytes, marking the cut.
pub fn truncate(bytes: &[u8], max: usize) -> String {
    if bytes.len() <= max {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let mut text = String::from_utf8_lossy(&bytes[..max]).into_owned();
    text.push_str("\n[output truncated]");
    text
}
