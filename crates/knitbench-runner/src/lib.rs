//! knitbench-runner: Sandboxed execution of candidate programs.
//!
//! Each request gets a fresh temporary directory, a scrubbed environment,
//! a wall-clock limit and (on Unix) an address-space cap. Rust candidates
//! are compiled with `rustc` first, once per batch; Python candidates run
//! under `python3`.

pub mod compiler;
pub mod executor;
pub mod sandbox;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;

use knitbench_core::model::Language;
use knitbench_core::traits::{CodeRunner, ExecBatch, ExecOutcome, ExecRequest, ExecStatus};

use crate::executor::Limits;
use crate::sandbox::Sandbox;

/// A candidate ready to run, or the reason it cannot.
enum Prepared {
    Ready { program: PathBuf, args: Vec<String> },
    Rejected(ExecOutcome),
}

/// Local code runner backed by throwaway sandbox directories.
pub struct LocalRunner {
    python: String,
    rustc: String,
    /// Address-space cap for candidate processes, in MiB.
    memory_limit_mb: Option<u64>,
    compile_timeout: Duration,
    max_output_bytes: usize,
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalRunner {
    pub fn new() -> Self {
        Self {
            python: "python3".to_string(),
            rustc: "rustc".to_string(),
            memory_limit_mb: Some(512),
            compile_timeout: Duration::from_secs(60),
            max_output_bytes: 64 * 1024,
        }
    }

    pub fn with_python(mut self, interpreter: impl Into<String>) -> Self {
        self.python = interpreter.into();
        self
    }

    pub fn with_rustc(mut self, compiler: impl Into<String>) -> Self {
        self.rustc = compiler.into();
        self
    }

    /// `None` disables the memory cap.
    pub fn with_memory_limit_mb(mut self, limit: Option<u64>) -> Self {
        self.memory_limit_mb = limit;
        self
    }

    pub fn with_compile_timeout(mut self, timeout: Duration) -> Self {
        self.compile_timeout = timeout;
        self
    }

    pub fn with_max_output_bytes(mut self, max: usize) -> Self {
        self.max_output_bytes = max;
        self
    }

    fn limits(&self, timeout_ms: u64) -> Limits {
        Limits {
            timeout: Duration::from_millis(timeout_ms.max(1)),
            memory_kb: self.memory_limit_mb.map(|mb| mb * 1024),
            max_output_bytes: self.max_output_bytes,
        }
    }

    /// Write the source and, for Rust, compile it.
    async fn prepare(&self, sandbox: &Sandbox, code: &str) -> Result<Prepared> {
        let source = sandbox.write_source(code)?;
        match sandbox.language() {
            Language::Python => Ok(Prepared::Ready {
                program: PathBuf::from(&self.python),
                args: vec![source.to_string_lossy().to_string()],
            }),
            Language::Rust => {
                let start = Instant::now();
                let compiled =
                    compiler::compile_rust(sandbox, &self.rustc, self.compile_timeout).await?;
                if !compiled.success {
                    return Ok(Prepared::Rejected(ExecOutcome {
                        status: ExecStatus::CompileFailed,
                        stdout: String::new(),
                        stderr: executor::truncate(
                            compiled.stderr().as_bytes(),
                            self.max_output_bytes,
                        ),
                        duration_ms: start.elapsed().as_millis() as u64,
                    }));
                }
                Ok(Prepared::Ready {
                    program: sandbox.binary_path(),
                    args: Vec::new(),
                })
            }
        }
    }
}

#[async_trait]
impl CodeRunner for LocalRunner {
    async fn execute(&self, request: &ExecRequest) -> Result<ExecOutcome> {
        let batch = ExecBatch {
            code: request.code.clone(),
            language: request.language,
            stdins: vec![request.stdin.clone()],
            timeout_ms: request.timeout_ms,
        };
        self.execute_batch(&batch)
            .await?
            .pop()
            .context("runner produced no outcome")
    }

    /// All inputs run in one sandbox against one build.
    #[tracing::instrument(skip_all, fields(language = %batch.language, runs = batch.stdins.len()))]
    async fn execute_batch(&self, batch: &ExecBatch) -> Result<Vec<ExecOutcome>> {
        let sandbox = Sandbox::new(batch.language)?;
        let (program, args) = match self.prepare(&sandbox, &batch.code).await? {
            Prepared::Ready { program, args } => (program, args),
            Prepared::Rejected(outcome) => return Ok(vec![outcome]),
        };
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let limits = self.limits(batch.timeout_ms);

        let mut outcomes = Vec::with_capacity(batch.stdins.len());
        for stdin in &batch.stdins {
            let start = Instant::now();
            let mut outcome = executor::run_program(&sandbox, &program, &args, stdin, limits).await?;
            outcome.duration_ms = start.elapsed().as_millis() as u64;
            tracing::debug!(status = ?outcome.status, duration_ms = outcome.duration_ms, "executed candidate");
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}
