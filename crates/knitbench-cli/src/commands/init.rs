//! The `knitbench init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("knitbench.toml").exists() {
        println!("knitbench.toml already exists, skipping.");
    } else {
        std::fs::write("knitbench.toml", SAMPLE_CONFIG)?;
        println!("Created knitbench.toml");
    }

    println!("\nNext steps:");
    println!("  1. Export KNITBENCH_GEMINI_KEY or edit knitbench.toml");
    println!("  2. Run: knitbench list-cases");
    println!("  3. Run: knitbench run --kinds math-qa,sudoku-validation --format all");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# knitbench configuration

default_provider = "gemini"
default_model = "models/gemini-2.0-flash"
temperature = 0.7
max_tokens = 12000
# Pause between requests; keeps free-tier quotas happy.
request_delay_ms = 10000
max_retries = 3
parallelism = 1
output_dir = "./knitbench-results"

[providers.gemini]
type = "gemini"
api_key = "${GEMINI_API_KEY}"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

# Any OpenAI-compatible server, e.g. a local Ollama.
[providers.local]
type = "openai"
base_url = "http://localhost:11434"

[marker]
base_flops = 1.5e9
flops_growth = 0.30e9
alpha = 0.8
reference_model = "gpt2"
anchor_rating = 1200.0
k_factor = 32.0
difficulty_scale = 100.0

[suite]
seed = 0
cases_per_kind = 1
code_language = "python"
code_timeout_ms = 5000
code_memory_mb = 512
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_config_parses() {
        let config = knitbench_providers::config::parse_config(SAMPLE_CONFIG).unwrap();
        assert_eq!(config.providers.len(), 3);
        assert_eq!(config.request_delay_ms, 10_000);
    }
}
