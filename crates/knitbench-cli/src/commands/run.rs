//! The `knitbench run` command.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use knitbench_core::bank::{load_bank_directory, parse_bank, QuestionBank};
use knitbench_core::cases::SuiteContext;
use knitbench_core::engine::{BenchEngine, ModelSpec, ProgressReporter};
use knitbench_core::marker::Marker;
use knitbench_core::model::{CaseKind, Language};
use knitbench_core::report::RunReport;
use knitbench_core::results::OutcomeRecord;
use knitbench_core::suite::build_suite;
use knitbench_core::traits::LlmProvider;
use knitbench_providers::config::{load_config_from, KnitbenchConfig, ProviderConfig};
use knitbench_providers::create_provider;
use knitbench_report::write_html_report;
use knitbench_runner::LocalRunner;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Model to evaluate, as "provider/model" or just "model"
    #[arg(long)]
    pub model: Option<String>,

    /// Kinds to include (comma-separated); all kinds when omitted
    #[arg(long)]
    pub kinds: Option<String>,

    /// Suite seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Questions generated per kind
    #[arg(long)]
    pub cases_per_kind: Option<usize>,

    /// Max in-flight requests
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Pause between requests in milliseconds
    #[arg(long)]
    pub request_delay_ms: Option<u64>,

    /// Language requested for coding answers: python, rust
    #[arg(long)]
    pub code_language: Option<String>,

    /// Extra question bank file or directory
    #[arg(long)]
    pub bank: Option<PathBuf>,

    /// Output directory
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Output format: json, html, all
    #[arg(long, default_value = "json")]
    pub format: String,

    /// Config file path
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_query_start(&self, case_id: &str, index: usize, total: usize) {
        eprintln!("  [{}/{total}] {case_id}", index + 1);
    }

    fn on_query_complete(&self, record: &OutcomeRecord) {
        let verdict = if record.result.correct {
            "PASS".to_string()
        } else {
            format!("FAIL {:.2}", record.result.score)
        };
        eprintln!(
            "  Done: {} [{verdict}] difficulty {:.1}",
            record.case_id, record.difficulty
        );
    }

    fn on_query_error(&self, case_id: &str, error: &str) {
        eprintln!("  ERROR: {case_id}: {error}");
    }

    fn on_run_complete(&self, total: usize, graded: usize, failed: usize, elapsed: Duration) {
        eprintln!(
            "\nComplete: {graded}/{total} graded, {failed} failed ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

/// Split "provider/model"; a bare model uses the default provider.
fn parse_model_spec(spec: Option<&str>, config: &KnitbenchConfig) -> ModelSpec {
    match spec.map(str::trim) {
        Some(s) => match s.split_once('/') {
            // Gemini ids look like "models/gemini-2.0-flash"; that prefix
            // is part of the model, not a provider.
            Some((provider, model)) if provider != "models" => ModelSpec {
                provider: provider.to_string(),
                model: model.to_string(),
            },
            _ => ModelSpec {
                provider: config.default_provider.clone(),
                model: s.to_string(),
            },
        },
        None => ModelSpec {
            provider: config.default_provider.clone(),
            model: config.default_model.clone(),
        },
    }
}

pub fn parse_kinds(list: Option<&str>) -> Result<Vec<CaseKind>> {
    let Some(list) = list else {
        return Ok(CaseKind::ALL.to_vec());
    };
    let kinds = list
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.parse::<CaseKind>().map_err(|e| anyhow::anyhow!(e)))
        .collect::<Result<Vec<_>>>()?;
    anyhow::ensure!(!kinds.is_empty(), "--kinds must name at least one kind");
    Ok(kinds)
}

fn load_bank(extra: Option<&Path>) -> Result<QuestionBank> {
    let mut bank = QuestionBank::builtin()?;
    if let Some(path) = extra {
        let more = if path.is_dir() {
            load_bank_directory(path)?
        } else {
            parse_bank(path)?
        };
        bank.merge(more);
    }
    Ok(bank)
}

fn apply_overrides(config: &mut KnitbenchConfig, args: &RunArgs) -> Result<()> {
    if let Some(seed) = args.seed {
        config.suite.seed = seed;
    }
    if let Some(n) = args.cases_per_kind {
        config.suite.cases_per_kind = n;
    }
    if let Some(p) = args.parallelism {
        config.parallelism = p;
    }
    if let Some(t) = args.temperature {
        config.temperature = t;
    }
    if let Some(d) = args.request_delay_ms {
        config.request_delay_ms = d;
    }
    if let Some(lang) = &args.code_language {
        config.suite.code_language = lang.parse::<Language>().map_err(|e| anyhow::anyhow!(e))?;
    }
    if let Some(bank) = &args.bank {
        config.suite.bank = Some(bank.clone());
    }
    if let Some(output) = &args.output {
        config.output_dir = output.clone();
    }

    anyhow::ensure!(config.parallelism >= 1, "parallelism must be at least 1");
    anyhow::ensure!(
        config.suite.cases_per_kind >= 1,
        "cases-per-kind must be at least 1"
    );
    anyhow::ensure!(
        (0.0..=2.0).contains(&config.temperature),
        "temperature must be between 0.0 and 2.0"
    );
    Ok(())
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let mut config = load_config_from(args.config.as_deref())?;
    apply_overrides(&mut config, &args)?;

    let kinds = parse_kinds(args.kinds.as_deref())?;
    let spec = parse_model_spec(args.model.as_deref(), &config);

    let provider_config = match config.providers.get(&spec.provider) {
        Some(p) => p.clone(),
        None if spec.provider == "mock" => ProviderConfig::Mock {
            response: "The answer is 42.".to_string(),
        },
        None => anyhow::bail!(
            "provider '{}' not found in config. Available: {:?}",
            spec.provider,
            config.providers.keys().collect::<Vec<_>>()
        ),
    };
    let provider: Arc<dyn LlmProvider> = Arc::from(create_provider(&provider_config)?);

    let bank = load_bank(config.suite.bank.as_deref())?;
    let runner = LocalRunner::new().with_memory_limit_mb(match config.suite.code_memory_mb {
        0 => None,
        mb => Some(mb),
    });
    let mut ctx = SuiteContext::new(bank)
        .with_seed(config.suite.seed)
        .with_cases_per_kind(config.suite.cases_per_kind)
        .with_runner(Arc::new(runner))
        .with_code_language(config.suite.code_language)
        .with_long_context_chars(config.suite.long_context_chars);
    ctx.code_timeout_ms = config.suite.code_timeout_ms;

    let suite = build_suite(&kinds, &ctx)?;
    let mut marker = Marker::new(config.marker.clone())?;

    eprintln!(
        "knitbench v{}: {} questions across {} kinds, model {}/{} (seed {})",
        env!("CARGO_PKG_VERSION"),
        suite.len(),
        kinds.len(),
        spec.provider,
        spec.model,
        config.suite.seed
    );
    eprintln!();

    let engine = BenchEngine::new(provider, config.engine_config());
    let report = engine
        .run(&suite, &spec.model, &mut marker, &ConsoleReporter)
        .await?;

    print_summary(&report);
    save_outputs(&report, &config.output_dir, &args.format)?;

    Ok(())
}

fn save_outputs(report: &RunReport, output: &Path, format: &str) -> Result<()> {
    std::fs::create_dir_all(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    let timestamp = report.created_at.format("%Y-%m-%dT%H%M%S");

    let formats: Vec<&str> = if format == "all" {
        vec!["json", "html"]
    } else {
        format.split(',').map(str::trim).collect()
    };

    for fmt in formats {
        match fmt {
            "json" => {
                let path = output.join(format!("report-{timestamp}.json"));
                report.save_json(&path)?;
                eprintln!("Results saved to: {}", path.display());
            }
            "html" => {
                let path = output.join(format!("report-{timestamp}.html"));
                write_html_report(report, &path)?;
                eprintln!("Review page: {}", path.display());
            }
            other => eprintln!("Unknown format: {other}"),
        }
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["Kind", "Attempted", "Passed", "Mean score", "Est. FLOPs"]);

    for s in &report.summary {
        table.add_row(vec![
            Cell::new(s.kind.name()),
            Cell::new(s.attempted),
            Cell::new(s.passed),
            Cell::new(format!("{:.1}%", s.mean_score * 100.0)),
            Cell::new(format!("{:.3e}", s.total_flops)),
        ]);
    }

    eprintln!("\n{table}");
    println!("Final Elo Score: {:.6}", report.elo_score);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_spec_parsing() {
        let config = KnitbenchConfig::default();

        let spec = parse_model_spec(Some("openai/gpt-4.1"), &config);
        assert_eq!(spec.provider, "openai");
        assert_eq!(spec.model, "gpt-4.1");

        let spec = parse_model_spec(Some("models/gemini-2.0-flash"), &config);
        assert_eq!(spec.provider, "gemini");
        assert_eq!(spec.model, "models/gemini-2.0-flash");

        let spec = parse_model_spec(None, &config);
        assert_eq!(spec.model, config.default_model);
    }

    #[test]
    fn kind_list_parsing() {
        assert_eq!(parse_kinds(None).unwrap().len(), CaseKind::ALL.len());
        assert_eq!(
            parse_kinds(Some("math-qa, chess_memory")).unwrap(),
            vec![CaseKind::MathQa, CaseKind::ChessMemory]
        );
        assert!(parse_kinds(Some("poetry")).is_err());
        assert!(parse_kinds(Some(",")).is_err());
    }
}
