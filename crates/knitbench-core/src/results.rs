//! Grading outcomes and the records the rating engine retains.

use serde::{Deserialize, Serialize};

use crate::model::CaseKind;

/// Outcome of grading one candidate answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Full credit.
    pub correct: bool,
    /// Credit in `[0, 1]`; exactly 1.0 iff `correct`.
    pub score: f64,
    /// What went wrong (or right), for review.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl VerificationResult {
    pub fn pass() -> Self {
        Self {
            correct: true,
            score: 1.0,
            diagnostic: None,
        }
    }

    pub fn fail(diagnostic: impl Into<String>) -> Self {
        Self {
            correct: false,
            score: 0.0,
            diagnostic: Some(diagnostic.into()),
        }
    }

    /// Partial credit. A score of 1.0 or more is full credit; negative or
    /// NaN scores clamp to zero.
    pub fn partial(score: f64, diagnostic: impl Into<String>) -> Self {
        let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
        if score >= 1.0 {
            return Self::pass();
        }
        Self {
            correct: false,
            score,
            diagnostic: Some(diagnostic.into()),
        }
    }

    /// Attach a diagnostic to an otherwise unchanged result.
    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }

    /// Whether the score is finite, within `[0, 1]`, and agrees with `correct`.
    pub fn is_well_formed(&self) -> bool {
        self.score.is_finite()
            && (0.0..=1.0).contains(&self.score)
            && self.correct == (self.score >= 1.0)
    }
}

/// One evaluated question as retained by the rating engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// Position in the fold; records are always replayed in `seq` order.
    pub seq: u64,
    pub case_id: String,
    pub kind: CaseKind,
    pub question: String,
    /// Rendered canonical answer.
    pub expected: String,
    pub generated_answer: String,
    pub result: VerificationResult,
    /// Estimated FLOPs spent answering this query.
    pub estimated_flops: f64,
    /// Implicit opponent rating used in the Elo update.
    pub difficulty: f64,
}

/// Token accounting reported by an inference provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_are_well_formed() {
        assert!(VerificationResult::pass().is_well_formed());
        assert!(VerificationResult::fail("nope").is_well_formed());
        assert!(VerificationResult::partial(0.25, "some").is_well_formed());
    }

    #[test]
    fn partial_clamps_and_promotes() {
        assert_eq!(VerificationResult::partial(1.5, "x"), VerificationResult::pass());
        assert_eq!(VerificationResult::partial(f64::NAN, "x").score, 0.0);
        assert_eq!(VerificationResult::partial(-1.0, "x").score, 0.0);
    }

    #[test]
    fn malformed_results_detected() {
        let mut r = VerificationResult::pass();
        r.score = 0.5;
        assert!(!r.is_well_formed());

        let r = VerificationResult {
            correct: false,
            score: f64::INFINITY,
            diagnostic: None,
        };
        assert!(!r.is_well_formed());
    }
}
