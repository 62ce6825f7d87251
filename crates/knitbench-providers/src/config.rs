//! Configuration loading and provider factory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use knitbench_core::engine::EngineConfig;
use knitbench_core::marker::MarkerConfig;
use knitbench_core::model::Language;
use knitbench_core::traits::LlmProvider;

use crate::gemini::GeminiProvider;
use crate::mock::MockProvider;
use crate::openai::OpenAiProvider;

/// Configuration for a single inference provider.
///
/// Debug output masks API keys.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    Gemini {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    OpenAI {
        #[serde(default)]
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    /// Offline provider that replies with a fixed string.
    Mock {
        #[serde(default = "default_mock_response")]
        response: String,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::Gemini {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Gemini")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            ProviderConfig::Mock { response } => {
                f.debug_struct("Mock").field("response", response).finish()
            }
        }
    }
}

fn default_mock_response() -> String {
    "The answer is 42.".to_string()
}

/// Top-level knitbench configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnitbenchConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(default = "default_provider")]
    pub default_provider: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Maximum output tokens per answer.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Pause between consecutive requests, in milliseconds.
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,
    /// Max retries on transient provider errors.
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Base delay between retries in milliseconds; doubles each attempt.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// Max in-flight requests.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Rating constants.
    #[serde(default)]
    pub marker: MarkerConfig,
    #[serde(default)]
    pub suite: SuiteConfig,
    /// Output directory for reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

/// How the test suite is generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    pub seed: u64,
    pub cases_per_kind: usize,
    /// Language requested for coding answers.
    pub code_language: Language,
    /// Wall-clock limit per held-out coding test, in milliseconds.
    pub code_timeout_ms: u64,
    /// Memory cap for candidate programs, in MiB; 0 disables it.
    pub code_memory_mb: u64,
    /// Approximate size of long-context prompts, in characters.
    pub long_context_chars: usize,
    /// Extra question bank merged into the built-in one.
    pub bank: Option<PathBuf>,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            cases_per_kind: 1,
            code_language: Language::Python,
            code_timeout_ms: 5_000,
            code_memory_mb: 512,
            long_context_chars: 20_000,
            bank: None,
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_model() -> String {
    "models/gemini-2.0-flash".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    12_000
}
fn default_request_delay() -> u64 {
    10_000
}
fn default_retries() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    1000
}
fn default_parallelism() -> usize {
    1
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./knitbench-results")
}

impl Default for KnitbenchConfig {
    fn default() -> Self {
        Self {
            providers: BTreeMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_delay_ms: default_request_delay(),
            max_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
            parallelism: default_parallelism(),
            system_prompt: None,
            marker: MarkerConfig::default(),
            suite: SuiteConfig::default(),
            output_dir: default_output_dir(),
        }
    }
}

impl KnitbenchConfig {
    /// Engine settings derived from this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            parallelism: self.parallelism.max(1),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            request_delay: Duration::from_millis(self.request_delay_ms),
            system_prompt: self.system_prompt.clone(),
        }
    }
}

/// Expand `${VAR_NAME}` references from the environment. Unset variables
/// expand to the empty string; an unterminated `${` is left as is.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        let var_name = &rest[start + 2..start + end];
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + end + 1..];
    }
    result.push_str(rest);
    result
}

fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    match config {
        ProviderConfig::Gemini { api_key, base_url } => ProviderConfig::Gemini {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_deref().map(resolve_env_vars),
        },
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_deref().map(resolve_env_vars),
            org_id: org_id.as_deref().map(resolve_env_vars),
        },
        ProviderConfig::Mock { response } => ProviderConfig::Mock {
            response: response.clone(),
        },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `knitbench.toml` in the current directory
/// 2. `~/.config/knitbench/config.toml`
///
/// Environment variable overrides: `KNITBENCH_GEMINI_KEY`, `KNITBENCH_OPENAI_KEY`.
pub fn load_config() -> Result<KnitbenchConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<KnitbenchConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("knitbench.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|dir| dir.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded config");
            parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => KnitbenchConfig::default(),
    };

    Ok(apply_env_overrides(config))
}

/// Parse a config document and validate its marker constants.
pub fn parse_config(content: &str) -> Result<KnitbenchConfig> {
    let config: KnitbenchConfig = toml::from_str(content)?;
    config.marker.validate()?;
    Ok(config)
}

fn apply_env_overrides(mut config: KnitbenchConfig) -> KnitbenchConfig {
    if let Ok(key) = std::env::var("KNITBENCH_GEMINI_KEY") {
        match config.providers.get_mut("gemini") {
            Some(ProviderConfig::Gemini { api_key, .. }) => *api_key = key,
            _ => {
                config.providers.insert(
                    "gemini".into(),
                    ProviderConfig::Gemini {
                        api_key: key,
                        base_url: None,
                    },
                );
            }
        }
    }

    if let Ok(key) = std::env::var("KNITBENCH_OPENAI_KEY") {
        match config.providers.get_mut("openai") {
            Some(ProviderConfig::OpenAI { api_key, .. }) => *api_key = key,
            _ => {
                config.providers.insert(
                    "openai".into(),
                    ProviderConfig::OpenAI {
                        api_key: key,
                        base_url: None,
                        org_id: None,
                    },
                );
            }
        }
    }

    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();
    config
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("knitbench"))
}

/// Create a provider instance from its configuration.
pub fn create_provider(config: &ProviderConfig) -> Result<Box<dyn LlmProvider>> {
    match config {
        ProviderConfig::Gemini { api_key, base_url } => {
            Ok(Box::new(GeminiProvider::new(api_key, base_url.clone())?))
        }
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => Ok(Box::new(OpenAiProvider::new(
            api_key,
            base_url.clone(),
            org_id.clone(),
        )?)),
        ProviderConfig::Mock { response } => Ok(Box::new(MockProvider::with_fixed_response(response))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_KNITBENCH_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_KNITBENCH_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_KNITBENCH_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env_vars("${_KNITBENCH_UNSET_VAR}"), "");
        assert_eq!(resolve_env_vars("open ${brace"), "open ${brace");
        std::env::remove_var("_KNITBENCH_TEST_VAR");
    }

    #[test]
    fn expanded_values_are_not_rescanned() {
        std::env::set_var("_KNITBENCH_NESTED_VAR", "${_KNITBENCH_NESTED_VAR}");
        assert_eq!(
            resolve_env_vars("${_KNITBENCH_NESTED_VAR}"),
            "${_KNITBENCH_NESTED_VAR}"
        );
        std::env::remove_var("_KNITBENCH_NESTED_VAR");
    }

    #[test]
    fn default_config() {
        let config = KnitbenchConfig::default();
        assert_eq!(config.default_provider, "gemini");
        assert_eq!(config.request_delay_ms, 10_000);
        assert_eq!(config.max_tokens, 12_000);
        assert_eq!(config.parallelism, 1);
        assert_eq!(config.marker.base_flops, 1.5e9);
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
default_provider = "local"
default_model = "llama3"
request_delay_ms = 0

[providers.gemini]
type = "gemini"
api_key = "g-test"

[providers.local]
type = "openai"
base_url = "http://localhost:11434"

[providers.offline]
type = "mock"

[marker]
reference_model = "llama-7b"

[suite]
seed = 42
cases_per_kind = 3
code_language = "rust"
"#;
        let config = parse_config(toml_str).unwrap();
        assert_eq!(config.providers.len(), 3);
        assert!(matches!(
            config.providers.get("local"),
            Some(ProviderConfig::OpenAI { api_key, .. }) if api_key.is_empty()
        ));
        assert!(matches!(
            config.providers.get("offline"),
            Some(ProviderConfig::Mock { response }) if response == "The answer is 42."
        ));
        assert_eq!(config.marker.reference_model, "llama-7b");
        assert_eq!(config.marker.alpha, 0.8);
        assert_eq!(config.suite.seed, 42);
        assert_eq!(config.suite.code_language, Language::Rust);
        assert_eq!(config.suite.code_timeout_ms, 5_000);
        assert_eq!(config.engine_config().request_delay, Duration::ZERO);
    }

    #[test]
    fn invalid_marker_constants_are_rejected() {
        let err = parse_config("[marker]\nalpha = -1.0\n").unwrap_err();
        assert!(format!("{err:#}").contains("marker"));
    }

    #[test]
    fn debug_masks_api_keys() {
        let config = ProviderConfig::Gemini {
            api_key: "super-secret".into(),
            base_url: None,
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knitbench.toml");
        std::fs::write(&path, "default_model = \"gpt-4.1\"\n").unwrap();
        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.default_model, "gpt-4.1");

        let missing = dir.path().join("nope.toml");
        assert!(load_config_from(Some(&missing)).is_err());
    }

    #[test]
    fn create_mock_provider() {
        let provider = create_provider(&ProviderConfig::Mock {
            response: "7".into(),
        })
        .unwrap();
        assert_eq!(provider.name(), "mock");
    }
}
