//! Driver engine: asks the model every question of a suite, grades the
//! answers and folds them into a [`Marker`].
//!
//! Requests run one at a time by default. With `parallelism > 1` several
//! questions are in flight at once, but outcomes are still folded into the
//! marker in suite order so the rating does not depend on timing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;

use crate::error::ProviderError;
use crate::marker::Marker;
use crate::model::Query;
use crate::report::RunReport;
use crate::results::{OutcomeRecord, VerificationResult};
use crate::suite::Suite;
use crate::traits::{GenerateRequest, GenerateResponse, LlmProvider};

/// Configuration for the bench engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum questions in flight.
    pub parallelism: usize,
    /// Sampling temperature for every request.
    pub temperature: f64,
    /// Max output tokens for every request.
    pub max_tokens: u32,
    /// Retries on transient provider errors.
    pub max_retries: u32,
    /// Initial backoff between retries; doubles each time.
    pub retry_delay: Duration,
    /// Minimum spacing between the start of consecutive requests.
    pub request_delay: Duration,
    /// Optional system instruction sent with every question.
    pub system_prompt: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallelism: 1,
            temperature: 0.7,
            max_tokens: 12_000,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            request_delay: Duration::ZERO,
            system_prompt: None,
        }
    }
}

/// Which model to evaluate.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    /// Provider name (e.g. "gemini").
    pub provider: String,
    /// Model identifier (e.g. "models/gemini-2.0-flash").
    pub model: String,
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_query_start(&self, case_id: &str, index: usize, total: usize);
    fn on_query_complete(&self, record: &OutcomeRecord);
    fn on_query_error(&self, case_id: &str, error: &str);
    fn on_run_complete(&self, total: usize, graded: usize, failed: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_query_start(&self, _: &str, _: usize, _: usize) {}
    fn on_query_complete(&self, _: &OutcomeRecord) {}
    fn on_query_error(&self, _: &str, _: &str) {}
    fn on_run_complete(&self, _: usize, _: usize, _: usize, _: Duration) {}
}

/// Spaces out request starts by at least `delay`.
struct Pacer {
    delay: Duration,
    last: Mutex<Option<tokio::time::Instant>>,
}

impl Pacer {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            last: Mutex::new(None),
        }
    }

    async fn wait(&self) {
        if self.delay.is_zero() {
            return;
        }
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            tokio::time::sleep_until(prev + self.delay).await;
        }
        *last = Some(tokio::time::Instant::now());
    }
}

/// The bench engine.
pub struct BenchEngine {
    provider: Arc<dyn LlmProvider>,
    config: EngineConfig,
}

impl BenchEngine {
    pub fn new(provider: Arc<dyn LlmProvider>, config: EngineConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run every question of `suite` against `model`, folding graded
    /// outcomes into `marker`.
    ///
    /// Inference failures are reported, counted and left out of the
    /// rating. A permanent provider error (bad credentials, unknown model)
    /// aborts the run.
    pub async fn run(
        &self,
        suite: &Suite,
        model: &str,
        marker: &mut Marker,
        progress: &dyn ProgressReporter,
    ) -> Result<RunReport> {
        let start = Instant::now();
        let total = suite.questions.len();
        let pacer = Pacer::new(self.config.request_delay);
        let pacer = &pacer;

        let mut outcomes = stream::iter(suite.questions.iter().enumerate())
            .map(move |(index, query)| async move {
                pacer.wait().await;
                progress.on_query_start(&query.id, index, total);
                let answer = self.ask(query, model).await;
                match answer {
                    Ok(response) => {
                        let result = query.verify(&response.content).await;
                        (query, Ok((response, result)))
                    }
                    Err(e) => (query, Err(e)),
                }
            })
            .buffered(self.config.parallelism.max(1));

        let mut graded = 0usize;
        let mut failed = 0usize;

        while let Some((query, outcome)) = outcomes.next().await {
            let (response, result) = match outcome {
                Ok(pair) => pair,
                Err(e) => {
                    if is_permanent(&e) {
                        return Err(e.context(format!("aborting run at {}", query.id)));
                    }
                    tracing::error!("inference failed for {}: {e:#}", query.id);
                    progress.on_query_error(&query.id, &format!("{e:#}"));
                    failed += 1;
                    continue;
                }
            };
            self.record(marker, query, &response, result, progress, &mut graded);
        }

        let elapsed = start.elapsed();
        progress.on_run_complete(total, graded, failed, elapsed);
        tracing::info!(
            model,
            graded,
            failed,
            rejected = marker.rejected(),
            elo = marker.calculate_elo_score(),
            "run complete"
        );

        Ok(RunReport::from_marker(
            marker,
            model,
            self.provider.name(),
            failed,
            elapsed.as_millis() as u64,
        ))
    }

    fn record(
        &self,
        marker: &mut Marker,
        query: &Query,
        response: &GenerateResponse,
        result: VerificationResult,
        progress: &dyn ProgressReporter,
        graded: &mut usize,
    ) {
        tracing::debug!(
            case_id = %query.id,
            correct = result.correct,
            score = result.score,
            latency_ms = response.latency_ms,
            "graded answer"
        );
        match marker.add_result(query, &response.content, result) {
            Ok(record) => {
                progress.on_query_complete(record);
                *graded += 1;
            }
            Err(e) => progress.on_query_error(&query.id, &e.to_string()),
        }
    }

    /// One inference with retries on transient errors.
    async fn ask(&self, query: &Query, model: &str) -> Result<GenerateResponse> {
        let request = GenerateRequest {
            model: model.to_string(),
            prompt: query.question.clone(),
            system_prompt: self.config.system_prompt.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let mut last_error: Option<anyhow::Error> = None;
        let mut retry_delay = self.config.retry_delay;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(retry_delay).await;
                retry_delay = (retry_delay * 2).min(Duration::from_secs(60));
            }
            match self.provider.generate(&request).await {
                Ok(response) if response.content.trim().is_empty() => {
                    last_error = Some(ProviderError::EmptyCompletion(model.to_string()).into());
                }
                Ok(response) => return Ok(response),
                Err(e) => {
                    if let Some(provider_error) = e.downcast_ref::<ProviderError>() {
                        if provider_error.is_permanent() {
                            return Err(e);
                        }
                        // Use provider's retry-after hint if available
                        if let Some(ms) = provider_error.retry_after_ms() {
                            retry_delay = Duration::from_millis(ms);
                        }
                    }
                    tracing::warn!(case_id = %query.id, attempt, "inference failed: {e:#}");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("unknown error")))
    }
}

fn is_permanent(e: &anyhow::Error) -> bool {
    e.downcast_ref::<ProviderError>()
        .is_some_and(ProviderError::is_permanent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use crate::bank::QuestionBank;
    use crate::cases::SuiteContext;
    use crate::marker::MarkerConfig;
    use crate::model::CaseKind;
    use crate::results::TokenUsage;
    use crate::suite::build_suite;
    use crate::traits::ModelInfo;

    enum Reply {
        Text(String),
        Fail(ProviderError),
    }

    /// Answers from a queue, then with a non-answer once the queue is empty.
    struct QueueProvider {
        replies: StdMutex<VecDeque<Reply>>,
        calls: StdMutex<usize>,
    }

    impl QueueProvider {
        fn new(replies: Vec<Reply>) -> Self {
            Self {
                replies: StdMutex::new(replies.into()),
                calls: StdMutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl LlmProvider for QueueProvider {
        fn name(&self) -> &str {
            "queue"
        }

        async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
            *self.calls.lock().unwrap() += 1;
            let reply = self.replies.lock().unwrap().pop_front();
            match reply {
                Some(Reply::Text(content)) => Ok(GenerateResponse {
                    content,
                    model: request.model.clone(),
                    token_usage: TokenUsage::default(),
                    latency_ms: 1,
                }),
                Some(Reply::Fail(e)) => Err(e.into()),
                None => Ok(GenerateResponse {
                    content: "I do not know.".into(),
                    model: request.model.clone(),
                    token_usage: TokenUsage::default(),
                    latency_ms: 1,
                }),
            }
        }

        fn available_models(&self) -> Vec<ModelInfo> {
            vec![]
        }
    }

    fn suite(kinds: &[CaseKind], n: usize) -> Suite {
        let ctx = SuiteContext::new(QuestionBank::builtin().unwrap())
            .with_seed(4)
            .with_cases_per_kind(n);
        build_suite(kinds, &ctx).unwrap()
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            retry_delay: Duration::from_millis(1),
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn expected_answers_score_and_fold_in_order() {
        let suite = suite(&[CaseKind::MathQa, CaseKind::NthDecimalDigit], 2);
        let replies = suite
            .answers
            .iter()
            .map(|a| Reply::Text(format!("The answer is {a}")))
            .collect();
        let engine = BenchEngine::new(Arc::new(QueueProvider::new(replies)), fast_config());
        let mut marker = Marker::new(MarkerConfig::default()).unwrap();

        let report = engine.run(&suite, "test-model", &mut marker, &NoopReporter).await.unwrap();

        assert_eq!(report.records.len(), 4);
        assert!(report.records.iter().all(|r| r.result.correct));
        let ids: Vec<&str> = report.records.iter().map(|r| r.case_id.as_str()).collect();
        let expected: Vec<&str> = suite.questions.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, expected);
        assert!(report.elo_score > 1200.0);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let suite = suite(&[CaseKind::NthDecimalDigit], 1);
        let provider = Arc::new(QueueProvider::new(vec![
            Reply::Fail(ProviderError::Timeout(30)),
            Reply::Fail(ProviderError::RateLimited { retry_after_ms: 1 }),
            Reply::Text(suite.answers[0].to_string()),
        ]));
        let engine = BenchEngine::new(provider.clone(), fast_config());
        let mut marker = Marker::new(MarkerConfig::default()).unwrap();

        let report = engine.run(&suite, "m", &mut marker, &NoopReporter).await.unwrap();
        assert_eq!(provider.calls(), 3);
        assert!(report.records[0].result.correct);
    }

    #[tokio::test]
    async fn exhausted_retries_count_as_failed_not_loss() {
        let suite = suite(&[CaseKind::NthDecimalDigit], 2);
        let provider = Arc::new(QueueProvider::new(vec![
            Reply::Fail(ProviderError::NetworkError("reset".into())),
            Reply::Fail(ProviderError::NetworkError("reset".into())),
        ]));
        let config = EngineConfig {
            max_retries: 1,
            ..fast_config()
        };
        let engine = BenchEngine::new(provider, config);
        let mut marker = Marker::new(MarkerConfig::default()).unwrap();

        let report = engine.run(&suite, "m", &mut marker, &NoopReporter).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].case_id, suite.questions[1].id);
    }

    #[tokio::test]
    async fn permanent_errors_abort_the_run() {
        let suite = suite(&[CaseKind::MathQa], 2);
        let provider = Arc::new(QueueProvider::new(vec![Reply::Fail(
            ProviderError::AuthenticationFailed("bad key".into()),
        )]));
        let engine = BenchEngine::new(provider.clone(), fast_config());
        let mut marker = Marker::new(MarkerConfig::default()).unwrap();

        let err = engine.run(&suite, "m", &mut marker, &NoopReporter).await.unwrap_err();
        assert!(format!("{err:#}").contains("authentication failed"));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn empty_completions_are_retried() {
        let suite = suite(&[CaseKind::NthDecimalDigit], 1);
        let provider = Arc::new(QueueProvider::new(vec![
            Reply::Text("   ".into()),
            Reply::Text(suite.answers[0].to_string()),
        ]));
        let engine = BenchEngine::new(provider.clone(), fast_config());
        let mut marker = Marker::new(MarkerConfig::default()).unwrap();

        engine.run(&suite, "m", &mut marker, &NoopReporter).await.unwrap();
        assert_eq!(provider.calls(), 2);
        assert!(marker.records()[0].result.correct);
    }

    #[tokio::test]
    async fn parallel_runs_fold_in_suite_order() {
        let suite = suite(&[CaseKind::FindUniqueNumberIndex, CaseKind::MathQa], 3);
        let engine = BenchEngine::new(
            Arc::new(QueueProvider::new(vec![])),
            EngineConfig {
                parallelism: 4,
                ..fast_config()
            },
        );
        let mut marker = Marker::new(MarkerConfig::default()).unwrap();
        engine.run(&suite, "m", &mut marker, &NoopReporter).await.unwrap();

        let seqs: Vec<u64> = marker.records().iter().map(|r| r.seq).collect();
        assert_eq!(seqs, (0..6).collect::<Vec<u64>>());
        let ids: Vec<&str> = marker.records().iter().map(|r| r.case_id.as_str()).collect();
        let expected: Vec<&str> = suite.questions.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn request_delay_spaces_requests() {
        let suite = suite(&[CaseKind::MathQa], 3);
        let engine = BenchEngine::new(
            Arc::new(QueueProvider::new(vec![])),
            EngineConfig {
                request_delay: Duration::from_secs(10),
                ..fast_config()
            },
        );
        let mut marker = Marker::new(MarkerConfig::default()).unwrap();
        let before = tokio::time::Instant::now();
        engine.run(&suite, "m", &mut marker, &NoopReporter).await.unwrap();
        assert!(before.elapsed() >= Duration::from_secs(20));
    }
}
