//! Scripted provider for offline runs and tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use knitbench_core::model::Query;
use knitbench_core::results::TokenUsage;
use knitbench_core::traits::{GenerateRequest, GenerateResponse, LlmProvider, ModelInfo};

use crate::error::ProviderError;

/// A mock provider that answers from a script instead of a model.
///
/// Each rule maps a prompt substring to a response; the first matching
/// rule wins, otherwise the default response is returned.
pub struct MockProvider {
    rules: Vec<(String, String)>,
    default_response: String,
    call_count: AtomicU32,
    last_request: Mutex<Option<GenerateRequest>>,
}

impl MockProvider {
    pub fn new(rules: Vec<(String, String)>) -> Self {
        Self {
            rules,
            default_response: "I don't know.".to_string(),
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn with_fixed_response(response: &str) -> Self {
        Self {
            default_response: response.to_string(),
            ..Self::new(Vec::new())
        }
    }

    /// Create a mock that replies to each query with its canonical answer.
    pub fn oracle<'a>(queries: impl IntoIterator<Item = &'a Query>) -> Self {
        let rules = queries
            .into_iter()
            .map(|q| (q.question.clone(), format!("The answer is {}", q.expected)))
            .collect();
        Self::new(rules)
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_request(&self) -> Option<GenerateRequest> {
        self.last_request
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }

        let content = self
            .rules
            .iter()
            .find(|(key, _)| request.prompt.contains(key.as_str()))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| self.default_response.clone());

        if content.trim().is_empty() {
            return Err(ProviderError::EmptyCompletion(request.model.clone()).into());
        }

        let prompt_tokens = (request.prompt.len() / 4) as u32;
        let completion_tokens = (content.len() / 4) as u32;

        Ok(GenerateResponse {
            content,
            model: request.model.clone(),
            token_usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            latency_ms: 1,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: "mock-model".into(),
            name: "Mock Model".into(),
            provider: "mock".into(),
            max_context: 100_000,
        }]
    }
}
