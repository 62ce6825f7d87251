//! Error types shared across knitbench.
//!
//! Provider errors live here so the engine can downcast them when deciding
//! whether to retry. Generation and marker errors are fatal configuration
//! problems surfaced to the operator; grading never produces an error.

use thiserror::Error;

use crate::model::CaseKind;

/// Errors that can occur when interacting with an inference provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The API answered successfully but produced no text.
    #[error("empty completion from {0}")]
    EmptyCompletion(String),

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ProviderError::AuthenticationFailed(_) | ProviderError::ModelNotFound(_)
        )
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

/// A test-case variant could not produce its questions.
#[derive(Debug, Error)]
#[error("failed to generate {kind} cases: {message}")]
pub struct GenerationError {
    pub kind: CaseKind,
    pub message: String,
}

impl GenerationError {
    pub fn new(kind: CaseKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Input rejected by the rating engine.
#[derive(Debug, Error, PartialEq)]
pub enum MarkerError {
    /// The verification result is not a usable score.
    #[error("invalid verification result for {case_id}: {reason}")]
    InvalidResult { case_id: String, reason: String },

    /// The marker was configured with unusable constants.
    #[error("invalid marker configuration: {0}")]
    InvalidConfig(String),
}
