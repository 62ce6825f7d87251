//! Compilation of Rust candidates with `rustc`.

use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::process::Command;

use crate::sandbox::Sandbox;

/// Outcome of compiling a candidate.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub success: bool,
    /// Rendered compiler errors, most relevant first.
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl CompileOutput {
    /// Errors joined for display; empty when compilation succeeded.
    pub fn stderr(&self) -> String {
        self.errors.join("\n")
    }
}

/// Compile the sandbox's `main.rs` into its binary path.
///
/// A compile that exceeds `timeout` is reported as a failed compile, not as
/// a runner error.
pub async fn compile_rust(sandbox: &Sandbox, rustc: &str, timeout: Duration) -> Result<CompileOutput> {
    let start = Instant::now();

    let mut cmd = Command::new(rustc);
    cmd.arg("--edition=2021")
        .arg("-O")
        .arg("--error-format=json")
        .arg("-o")
        .arg(sandbox.binary_path())
        .arg(sandbox.source_path())
        .current_dir(sandbox.work_dir())
        .env_clear()
        .envs(sandbox.compiler_env())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(result) => result.with_context(|| format!("failed to run {rustc}"))?,
        Err(_) => {
            return Ok(CompileOutput {
                success: false,
                errors: vec![format!("compilation timed out after {}s", timeout.as_secs())],
                duration_ms: start.elapsed().as_millis() as u64,
            });
        }
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    let stderr = String::from_utf8_lossy(&output.stderr);
    let mut errors = parse_rustc_json_output(&stderr);
    if !output.status.success() && errors.is_empty() {
        errors.push(stderr.trim().to_string());
    }

    tracing::debug!(success = output.status.success(), duration_ms, "compiled candidate");

    Ok(CompileOutput {
        success: output.status.success(),
        errors,
        duration_ms,
    })
}

/// Pull the rendered error diagnostics out of rustc's JSON output.
fn parse_rustc_json_output(output: &str) -> Vec<String> {
    let mut errors = Vec::new();

    for line in output.lines() {
        let Ok(msg) = serde_json::from_str::<serde_json::Value>(line) else {
            continue;
        };

        let level = msg.get("level").and_then(|l| l.as_str()).unwrap_or("note");
        if level != "error" {
            continue;
        }

        let text = msg
            .get("rendered")
            .and_then(|r| r.as_str())
            .or_else(|| msg.get("message").and_then(|m| m.as_str()))
            .unwrap_or("")
            .trim_end()
            .to_string();

        // The trailing "aborting due to" summary carries no location.
        if text.starts_with("error: aborting due to") {
            continue;
        }
        if !text.is_empty() {
            errors.push(text);
        }
    }

    errors
}
