//! Core trait definitions for inference providers and code runners.
//!
//! These async traits are implemented by the `knitbench-providers` and
//! `knitbench-runner` crates respectively.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::Language;
use crate::results::TokenUsage;

// ---------------------------------------------------------------------------
// Inference provider trait
// ---------------------------------------------------------------------------

/// Trait for model backends that answer prompts with text.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g. "gemini").
    fn name(&self) -> &str;

    /// Generate a completion. Implementations must return an error rather
    /// than an empty completion.
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse>;

    /// List models known to this provider.
    fn available_models(&self) -> Vec<ModelInfo>;
}

/// A single inference request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Model identifier (e.g. "models/gemini-2.0-flash").
    pub model: String,
    /// The question text.
    pub prompt: String,
    /// Optional system instruction.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

/// Response from an inference request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// The generated text.
    pub content: String,
    /// Model that actually generated the response.
    pub model: String,
    /// Token usage.
    pub token_usage: TokenUsage,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

/// Information about an available model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier.
    pub id: String,
    /// Human-readable model name.
    pub name: String,
    /// Provider name.
    pub provider: String,
    /// Maximum context window size in tokens.
    pub max_context: u32,
}

// ---------------------------------------------------------------------------
// Code runner trait
// ---------------------------------------------------------------------------

/// Trait for isolated execution of candidate programs.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    /// Run `request.code` once with `request.stdin` as standard input.
    ///
    /// `Err` is reserved for failures of the runner itself (cannot create a
    /// sandbox, interpreter missing); misbehaving candidate code is reported
    /// through [`ExecStatus`].
    async fn execute(&self, request: &ExecRequest) -> anyhow::Result<ExecOutcome>;

    /// Run one program against several standard inputs.
    ///
    /// Returns one outcome per input, in order, except that a program that
    /// does not compile yields a single [`ExecStatus::CompileFailed`]
    /// outcome. Runners that build an artifact should build it once; the
    /// default simply calls [`execute`](Self::execute) per input.
    async fn execute_batch(&self, batch: &ExecBatch) -> anyhow::Result<Vec<ExecOutcome>> {
        let mut outcomes = Vec::with_capacity(batch.stdins.len());
        for i in 0..batch.stdins.len() {
            let outcome = self.execute(&batch.request(i)).await?;
            let compile_failed = outcome.status == ExecStatus::CompileFailed;
            outcomes.push(outcome);
            if compile_failed {
                break;
            }
        }
        Ok(outcomes)
    }
}

/// Request to execute a program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecRequest {
    /// Source code.
    pub code: String,
    pub language: Language,
    /// Data piped to standard input.
    pub stdin: String,
    /// Hard wall-clock limit in milliseconds.
    pub timeout_ms: u64,
}

/// One program to run against several inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecBatch {
    pub code: String,
    pub language: Language,
    /// Standard input for each run.
    pub stdins: Vec<String>,
    /// Wall-clock limit per run, in milliseconds.
    pub timeout_ms: u64,
}

impl ExecBatch {
    /// The single-run request for input `i`.
    pub fn request(&self, i: usize) -> ExecRequest {
        ExecRequest {
            code: self.code.clone(),
            language: self.language,
            stdin: self.stdins[i].clone(),
            timeout_ms: self.timeout_ms,
        }
    }
}

/// How a program run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecStatus {
    /// The process exited on its own; `None` when killed by a signal.
    Completed { exit_code: Option<i32> },
    /// The wall-clock limit was hit and the process was killed.
    TimedOut,
    /// The source did not compile.
    CompileFailed,
}

/// Result of executing a program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecOutcome {
    pub status: ExecStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ExecOutcome {
    /// Exited normally with status 0.
    pub fn succeeded(&self) -> bool {
        self.status == ExecStatus::Completed { exit_code: Some(0) }
    }
}

/// Runner used when code execution is not configured; every request fails.
pub struct UnavailableRunner;

#[async_trait]
impl CodeRunner for UnavailableRunner {
    async fn execute(&self, _request: &ExecRequest) -> anyhow::Result<ExecOutcome> {
        anyhow::bail!("no code runner configured")
    }
}
