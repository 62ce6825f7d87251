//! The Marker: a compute-normalized Elo rating over graded outcomes.
//!
//! Every accepted outcome is charged an estimated compute cost (see
//! [`crate::cost`]), which sets the implicit opponent rating the model
//! "played" on that query:
//!
//! ```text
//! D = anchor + kind offset + difficulty_scale * log10(flops / base)
//! E = 1 / (1 + 10^((D - R) / 400))
//! R <- R + K * (S - E)
//! ```
//!
//! The rating is a sequential fold from `anchor` over records in `seq`
//! order, so it is order-sensitive by construction. Reading it never
//! changes state.

use serde::{Deserialize, Serialize};

use crate::cost::CostModel;
use crate::error::MarkerError;
use crate::model::{CaseKind, Query};
use crate::results::{OutcomeRecord, VerificationResult};

/// Rating constants, fixed when the marker is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    /// FLOPs charged for an empty exchange.
    pub base_flops: f64,
    /// Multiplier on the size term.
    pub flops_growth: f64,
    /// Exponent on the size term.
    pub alpha: f64,
    /// Model whose parameter count scales the size term.
    pub reference_model: String,
    /// Starting rating, and the difficulty of the cheapest query.
    pub anchor_rating: f64,
    pub k_factor: f64,
    /// Rating points per decade of estimated FLOPs.
    pub difficulty_scale: f64,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            base_flops: 1.5e9,
            flops_growth: 0.30e9,
            alpha: 0.8,
            reference_model: "gpt2".to_string(),
            anchor_rating: 1200.0,
            k_factor: 32.0,
            difficulty_scale: 100.0,
        }
    }
}

impl MarkerConfig {
    pub fn validate(&self) -> Result<(), MarkerError> {
        let check = |ok: bool, what: &str| {
            if ok {
                Ok(())
            } else {
                Err(MarkerError::InvalidConfig(what.to_string()))
            }
        };
        check(
            self.base_flops.is_finite() && self.base_flops > 0.0,
            "base_flops must be positive",
        )?;
        check(
            self.flops_growth.is_finite() && self.flops_growth >= 0.0,
            "flops_growth must be non-negative",
        )?;
        check(self.alpha.is_finite() && self.alpha > 0.0, "alpha must be positive")?;
        check(self.anchor_rating.is_finite(), "anchor_rating must be finite")?;
        check(
            self.k_factor.is_finite() && self.k_factor > 0.0,
            "k_factor must be positive",
        )?;
        check(
            self.difficulty_scale.is_finite() && self.difficulty_scale >= 0.0,
            "difficulty_scale must be non-negative",
        )
    }
}

/// Per-kind totals over the accepted records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindSummary {
    pub kind: CaseKind,
    pub attempted: usize,
    pub passed: usize,
    pub mean_score: f64,
    pub total_flops: f64,
}

/// Logistic expectation of scoring against an opponent rated `difficulty`.
pub fn expected_score(rating: f64, difficulty: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((difficulty - rating) / 400.0))
}

fn rejection_reason(result: &VerificationResult) -> Option<String> {
    if !result.score.is_finite() {
        return Some(format!("score {} is not finite", result.score));
    }
    if !(0.0..=1.0).contains(&result.score) {
        return Some(format!("score {} is outside [0, 1]", result.score));
    }
    if result.correct != (result.score >= 1.0) {
        return Some(format!(
            "correct = {} disagrees with score {}",
            result.correct, result.score
        ));
    }
    None
}

/// Accumulates outcome records and rates them.
///
/// `add_result` is the only mutator; one writer folds records in order.
#[derive(Debug, Clone)]
pub struct Marker {
    config: MarkerConfig,
    cost: CostModel,
    records: Vec<OutcomeRecord>,
    rejected: u64,
    next_seq: u64,
}

impl Marker {
    pub fn new(config: MarkerConfig) -> Result<Self, MarkerError> {
        config.validate()?;
        Ok(Self {
            cost: CostModel::new(&config),
            config,
            records: Vec::new(),
            rejected: 0,
            next_seq: 0,
        })
    }

    pub fn config(&self) -> &MarkerConfig {
        &self.config
    }

    /// Implicit opponent rating for a query of `kind` costing `flops`.
    pub fn difficulty(&self, kind: CaseKind, flops: f64) -> f64 {
        self.config.anchor_rating
            + kind.difficulty_offset()
            + self.config.difficulty_scale * (flops / self.cost.base()).log10()
    }

    /// Record one graded outcome.
    ///
    /// A malformed result is rejected and counted; the accumulator is left
    /// untouched.
    pub fn add_result(
        &mut self,
        query: &Query,
        generated_answer: &str,
        result: VerificationResult,
    ) -> Result<&OutcomeRecord, MarkerError> {
        if let Some(reason) = rejection_reason(&result) {
            self.rejected += 1;
            tracing::warn!(case_id = %query.id, %reason, "rejected verification result");
            return Err(MarkerError::InvalidResult {
                case_id: query.id.clone(),
                reason,
            });
        }

        let estimated_flops = self.cost.estimate(&query.question, generated_answer);
        let record = OutcomeRecord {
            seq: self.next_seq,
            case_id: query.id.clone(),
            kind: query.kind,
            question: query.question.clone(),
            expected: query.expected.to_string(),
            generated_answer: generated_answer.to_string(),
            result,
            estimated_flops,
            difficulty: self.difficulty(query.kind, estimated_flops),
        };
        self.next_seq += 1;
        self.records.push(record);
        Ok(&self.records[self.records.len() - 1])
    }

    /// Rebuild a marker from saved records, in `seq` order.
    ///
    /// Cost and difficulty are recomputed under `config`, so saved runs can
    /// be re-scored with different constants. Malformed records count as
    /// rejected.
    pub fn replay(
        config: MarkerConfig,
        records: impl IntoIterator<Item = OutcomeRecord>,
    ) -> Result<Self, MarkerError> {
        let mut marker = Self::new(config)?;
        let mut records: Vec<OutcomeRecord> = records.into_iter().collect();
        records.sort_by_key(|r| r.seq);

        for mut record in records {
            if let Some(reason) = rejection_reason(&record.result) {
                marker.rejected += 1;
                tracing::warn!(case_id = %record.case_id, %reason, "skipping malformed record");
                continue;
            }
            record.estimated_flops = marker
                .cost
                .estimate(&record.question, &record.generated_answer);
            record.difficulty = marker.difficulty(record.kind, record.estimated_flops);
            marker.next_seq = marker.next_seq.max(record.seq + 1);
            marker.records.push(record);
        }
        Ok(marker)
    }

    /// Rating after each record, starting from the first.
    pub fn rating_trajectory(&self) -> Vec<f64> {
        let mut rating = self.config.anchor_rating;
        self.records
            .iter()
            .map(|r| {
                let expected = expected_score(rating, r.difficulty);
                rating += self.config.k_factor * (r.result.score - expected);
                rating
            })
            .collect()
    }

    /// The rating after folding every record; the anchor when empty.
    pub fn calculate_elo_score(&self) -> f64 {
        self.rating_trajectory()
            .last()
            .copied()
            .unwrap_or(self.config.anchor_rating)
    }

    pub fn records(&self) -> &[OutcomeRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<OutcomeRecord> {
        self.records
    }

    /// Results refused by `add_result` or `replay`.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Per-kind totals, in order of first appearance.
    pub fn summary(&self) -> Vec<KindSummary> {
        let mut out: Vec<KindSummary> = Vec::new();
        for r in &self.records {
            let idx = match out.iter().position(|s| s.kind == r.kind) {
                Some(idx) => idx,
                None => {
                    out.push(KindSummary {
                        kind: r.kind,
                        attempted: 0,
                        passed: 0,
                        mean_score: 0.0,
                        total_flops: 0.0,
                    });
                    out.len() - 1
                }
            };
            let s = &mut out[idx];
            s.attempted += 1;
            if r.result.correct {
                s.passed += 1;
            }
            // Running sum; divided below.
            s.mean_score += r.result.score;
            s.total_flops += r.estimated_flops;
        }
        for s in &mut out {
            s.mean_score /= s.attempted as f64;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases::numeric::NumericGrader;
    use crate::cases::Grader;
    use crate::model::Answer;

    fn query(kind: CaseKind, index: usize) -> Query {
        Query::new(
            kind,
            index,
            "What is 6 * 7?".into(),
            Answer::Integer(42),
            Grader::Numeric(NumericGrader::integer(42)),
        )
    }

    fn marker() -> Marker {
        Marker::new(MarkerConfig::default()).unwrap()
    }

    #[test]
    fn empty_marker_scores_anchor() {
        assert_eq!(marker().calculate_elo_score(), 1200.0);
    }

    #[test]
    fn elo_score_is_idempotent() {
        let mut m = marker();
        m.add_result(&query(CaseKind::MathQa, 0), "42", VerificationResult::pass())
            .unwrap();
        m.add_result(&query(CaseKind::MathQa, 1), "41", VerificationResult::fail("off by one"))
            .unwrap();
        let first = m.calculate_elo_score();
        assert_eq!(m.calculate_elo_score(), first);
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn elo_score_is_order_sensitive() {
        let q = query(CaseKind::MathQa, 0);
        let mut a = marker();
        a.add_result(&q, "42", VerificationResult::pass()).unwrap();
        a.add_result(&q, "42", VerificationResult::fail("x")).unwrap();

        let mut b = marker();
        b.add_result(&q, "42", VerificationResult::fail("x")).unwrap();
        b.add_result(&q, "42", VerificationResult::pass()).unwrap();

        assert_ne!(a.calculate_elo_score(), b.calculate_elo_score());
    }

    #[test]
    fn passes_raise_and_failures_lower() {
        let mut up = marker();
        let mut down = marker();
        for i in 0..5 {
            up.add_result(&query(CaseKind::MathQa, i), "42", VerificationResult::pass())
                .unwrap();
            down.add_result(&query(CaseKind::MathQa, i), "7", VerificationResult::fail("no"))
                .unwrap();
        }
        assert!(up.calculate_elo_score() > 1200.0);
        assert!(down.calculate_elo_score() < 1200.0);
        let trajectory = up.rating_trajectory();
        assert!(trajectory.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn single_update_matches_formula() {
        let mut m = marker();
        let record = m
            .add_result(&query(CaseKind::MathQa, 0), "42", VerificationResult::pass())
            .unwrap()
            .clone();
        let e = expected_score(1200.0, record.difficulty);
        assert!((m.calculate_elo_score() - (1200.0 + 32.0 * (1.0 - e))).abs() < 1e-9);
    }

    #[test]
    fn harder_kinds_have_higher_difficulty() {
        let m = marker();
        assert!(m.difficulty(CaseKind::CodingQa, 2e9) > m.difficulty(CaseKind::MathQa, 2e9));
        assert!(m.difficulty(CaseKind::MathQa, 4e9) > m.difficulty(CaseKind::MathQa, 2e9));
        assert_eq!(m.difficulty(CaseKind::MathQa, 1.5e9), 1200.0);
    }

    #[test]
    fn malformed_results_are_rejected_and_counted() {
        let mut m = marker();
        let q = query(CaseKind::MathQa, 0);
        for bad in [
            VerificationResult { correct: true, score: 0.5, diagnostic: None },
            VerificationResult { correct: false, score: f64::NAN, diagnostic: None },
            VerificationResult { correct: false, score: -0.1, diagnostic: None },
        ] {
            let err = m.add_result(&q, "42", bad).unwrap_err();
            assert!(matches!(err, MarkerError::InvalidResult { .. }));
        }
        assert_eq!(m.rejected(), 3);
        assert!(m.is_empty());
        assert_eq!(m.calculate_elo_score(), 1200.0);
    }

    #[test]
    fn invalid_config_is_refused() {
        let err = Marker::new(MarkerConfig {
            k_factor: 0.0,
            ..MarkerConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, MarkerError::InvalidConfig(_)));
    }

    #[test]
    fn replay_sorts_by_seq_and_rescores() {
        let mut m = marker();
        for i in 0..4 {
            let result = if i % 2 == 0 {
                VerificationResult::pass()
            } else {
                VerificationResult::partial(0.25, "partial")
            };
            m.add_result(&query(CaseKind::NRulesVector, i), "[1, 2]", result)
                .unwrap();
        }
        let score = m.calculate_elo_score();

        let mut shuffled = m.records().to_vec();
        shuffled.reverse();
        let replayed = Marker::replay(MarkerConfig::default(), shuffled).unwrap();
        assert_eq!(replayed.calculate_elo_score(), score);
        assert_eq!(replayed.records(), m.records());

        let harsher = Marker::replay(
            MarkerConfig {
                reference_model: "llama-70b".into(),
                ..MarkerConfig::default()
            },
            m.records().to_vec(),
        )
        .unwrap();
        assert!(harsher.records()[0].estimated_flops > m.records()[0].estimated_flops);
    }

    #[test]
    fn summary_groups_by_kind() {
        let mut m = marker();
        m.add_result(&query(CaseKind::MathQa, 0), "42", VerificationResult::pass())
            .unwrap();
        m.add_result(&query(CaseKind::ChessMemory, 0), "empty", VerificationResult::fail("no"))
            .unwrap();
        m.add_result(
            &query(CaseKind::MathQa, 1),
            "41",
            VerificationResult::partial(0.5, "half"),
        )
        .unwrap();
        let summary = m.summary();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].kind, CaseKind::MathQa);
        assert_eq!(summary[0].attempted, 2);
        assert_eq!(summary[0].passed, 1);
        assert!((summary[0].mean_score - 0.75).abs() < 1e-12);
        assert_eq!(summary[1].passed, 0);
        assert!(summary[1].total_flops > 0.0);
    }
}
