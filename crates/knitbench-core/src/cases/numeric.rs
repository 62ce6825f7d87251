//! Exact-number questions and the shared numeric grader.

use rand::seq::SliceRandom;
use rand::Rng;

use super::{ordinal, Grader, SuiteContext};
use crate::error::GenerationError;
use crate::extract::{approx_eq, final_number};
use crate::model::{Answer, CaseKind, Query};
use crate::results::VerificationResult;

/// Relative tolerance for non-integer answers.
const REL_TOLERANCE: f64 = 1e-6;

/// A rounded decimal needs at least this many places to count.
const MIN_ROUNDED_PLACES: usize = 2;

/// True when `written` is `expected` rounded to the places written, e.g.
/// `0.583` or `0.5833` for 7/12.
fn is_rounding_of(written: f64, places: usize, expected: f64) -> bool {
    if places < MIN_ROUNDED_PLACES || places > 12 {
        return false;
    }
    let half_ulp = 0.5 * 10f64.powi(-(places as i32));
    (written - expected).abs() <= half_ulp * (1.0 + 1e-9)
}

/// Grades the final number of a candidate against an expected value.
#[derive(Debug, Clone)]
pub struct NumericGrader {
    expected: f64,
    integer_only: bool,
    /// A plausible wrong answer worth calling out in the diagnostic.
    decoy: Option<(f64, &'static str)>,
}

impl NumericGrader {
    /// Whole-number answers compared exactly.
    pub fn integer(expected: i64) -> Self {
        Self {
            expected: expected as f64,
            integer_only: true,
            decoy: None,
        }
    }

    /// Real-valued answers compared with a relative tolerance, so `0.5`
    /// and `1/2` are the same answer. A decimal with at least two places
    /// also passes when it is the expected value correctly rounded.
    pub fn real(expected: f64) -> Self {
        Self {
            expected,
            integer_only: false,
            decoy: None,
        }
    }

    pub fn with_decoy(mut self, value: f64, note: &'static str) -> Self {
        self.decoy = Some((value, note));
        self
    }

    pub fn grade(&self, candidate: &str) -> VerificationResult {
        let Some(token) = final_number(candidate) else {
            return VerificationResult::fail("no number found in answer");
        };

        let matches = if self.integer_only {
            token.value.fract() == 0.0 && token.value == self.expected
        } else {
            approx_eq(token.value, self.expected, REL_TOLERANCE)
                || token
                    .decimals
                    .is_some_and(|places| is_rounding_of(token.value, places, self.expected))
        };
        if matches {
            return VerificationResult::pass();
        }

        if let Some((decoy, note)) = self.decoy {
            if approx_eq(token.value, decoy, REL_TOLERANCE) {
                return VerificationResult::fail(format!("answered {decoy}: {note}"));
            }
        }
        if self.integer_only && !token.integral {
            return VerificationResult::fail(format!(
                "expected the whole number {}, got {}",
                self.expected, token.value
            ));
        }
        VerificationResult::fail(format!("expected {}, got {}", self.expected, token.value))
    }
}

/// Digit `n` (1-based) after the decimal point of `p / q`, by long division.
pub fn nth_decimal_digit(p: u64, q: u64, n: usize) -> u8 {
    let mut rem = p % q;
    let mut digit = 0;
    for _ in 0..n {
        rem *= 10;
        digit = (rem / q) as u8;
        rem %= q;
    }
    digit
}

pub(crate) fn generate_nth_digit(ctx: &SuiteContext) -> Result<Vec<Query>, GenerationError> {
    let kind = CaseKind::NthDecimalDigit;
    let mut rng = ctx.rng_for(kind);
    let mut out = Vec::with_capacity(ctx.cases_per_kind);

    for i in 0..ctx.cases_per_kind {
        let q: u64 = rng.gen_range(7..=97);
        let p: u64 = rng.gen_range(1..q);
        let n: usize = rng.gen_range(5..=40);
        let digit = nth_decimal_digit(p, q, n);

        let question = format!(
            "What is the {} digit after the decimal point in the decimal expansion of {p}/{q}? \
             Reply with the single digit.",
            ordinal(n)
        );
        out.push(
            Query::new(
                kind,
                i,
                question,
                Answer::Integer(digit as i64),
                Grader::Numeric(NumericGrader::integer(digit as i64)),
            )
            .with_param("numerator", p)
            .with_param("denominator", q)
            .with_param("position", n),
        );
    }
    Ok(out)
}

pub(crate) fn generate_unique_index(ctx: &SuiteContext) -> Result<Vec<Query>, GenerationError> {
    let kind = CaseKind::FindUniqueNumberIndex;
    let mut rng = ctx.rng_for(kind);
    let mut out = Vec::with_capacity(ctx.cases_per_kind);

    for i in 0..ctx.cases_per_kind {
        let pairs: usize = rng.gen_range(8..=20);
        let mut pool: Vec<i64> = (10..1000).collect();
        pool.shuffle(&mut rng);
        let unique = pool[pairs];

        let mut values = Vec::with_capacity(pairs * 2 + 1);
        for &v in &pool[..pairs] {
            values.push(v);
            values.push(v);
        }
        values.push(unique);
        values.shuffle(&mut rng);

        let index = values
            .iter()
            .position(|&v| v == unique)
            .ok_or_else(|| GenerationError::new(kind, "unique value missing after shuffle"))?;

        let listing: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        let question = format!(
            "Every number in the list below appears exactly twice, except one number that \
             appears only once. What is the zero-based index (the first element has index 0) \
             of the number that appears only once? Reply with the index.\n\n[{}]",
            listing.join(", ")
        );
        out.push(
            Query::new(
                kind,
                i,
                question,
                Answer::Integer(index as i64),
                Grader::Numeric(NumericGrader::integer(index as i64)),
            )
            .with_param("length", values.len()),
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_division_digits() {
        // 1/7 = 0.142857142857...
        assert_eq!(nth_decimal_digit(1, 7, 1), 1);
        assert_eq!(nth_decimal_digit(1, 7, 6), 7);
        assert_eq!(nth_decimal_digit(1, 7, 7), 1);
        // 3/8 = 0.375000
        assert_eq!(nth_decimal_digit(3, 8, 3), 5);
        assert_eq!(nth_decimal_digit(3, 8, 10), 0);
    }

    #[test]
    fn integer_grader_rejects_off_by_one() {
        let g = NumericGrader::integer(42);
        assert!(g.grade("The answer is 42.").correct);
        assert!(g.grade("42.0").correct);
        assert!(!g.grade("43").correct);
        assert!(!g.grade("41").correct);
        assert!(!g.grade("42.5").correct);
    }

    #[test]
    fn real_grader_accepts_equivalent_forms() {
        let g = NumericGrader::real(0.5);
        assert!(g.grade("0.5").correct);
        assert!(g.grade("The answer is 1/2").correct);
        assert!(g.grade("answer: 0.50").correct);
        assert!(!g.grade("0.51").correct);
        assert!(!g.grade("1/3").correct);
    }

    #[test]
    fn real_grader_accepts_rounded_repeating_decimals() {
        let seven_twelfths = NumericGrader::real(7.0 / 12.0);
        let two_thirds = NumericGrader::real(2.0 / 3.0);
        let cases: &[(&NumericGrader, &str, bool)] = &[
            (&seven_twelfths, "The answer is 0.583.", true),
            (&seven_twelfths, "The answer is 0.5833", true),
            (&seven_twelfths, "about 0.58", true),
            (&seven_twelfths, "The answer is 7/12.", true),
            (&seven_twelfths, "0.584", false),
            (&seven_twelfths, "0.6", false),
            (&two_thirds, "The answer is 0.67", true),
            (&two_thirds, "The answer is 0.667", true),
            (&two_thirds, "The answer is 0.66", false),
            (&two_thirds, "The answer is 0.6", false),
        ];
        for (grader, answer, expected) in cases {
            assert_eq!(grader.grade(answer).correct, *expected, "{answer}");
        }
    }

    #[test]
    fn inline_arithmetic_reads_the_result() {
        let g = NumericGrader::integer(42);
        let cases = [
            ("The answer is 6*7 = 42.", true),
            ("**The answer is 42.**", true),
            ("6 * 7 = 42", true),
            ("The answer is 6*7 = 43.", false),
        ];
        for (answer, expected) in cases {
            assert_eq!(g.grade(answer).correct, expected, "{answer}");
        }
    }

    #[test]
    fn no_number_is_incorrect_not_error() {
        let r = NumericGrader::integer(3).grade("I cannot determine this.");
        assert!(!r.correct);
        assert_eq!(r.score, 0.0);
        assert!(r.diagnostic.unwrap().contains("no number"));
    }

    #[test]
    fn decoy_is_reported() {
        let g = NumericGrader::real(120.0).with_decoy(100.0, "ignored the correction");
        let r = g.grade("Total: 100");
        assert!(!r.correct);
        assert!(r.diagnostic.unwrap().contains("ignored the correction"));
    }

    #[test]
    fn unique_index_points_at_unpaired_value() {
        let ctx = SuiteContext::new(crate::bank::QuestionBank::default())
            .with_seed(3)
            .with_cases_per_kind(4);
        for q in generate_unique_index(&ctx).unwrap() {
            let Answer::Integer(index) = q.expected else {
                panic!("unexpected answer shape")
            };
            let list = q.question.rsplit('[').next().unwrap().trim_end_matches(']');
            let values: Vec<i64> = list.split(", ").map(|v| v.parse().unwrap()).collect();
            let target = values[index as usize];
            assert_eq!(values.iter().filter(|&&v| v == target).count(), 1);
        }
    }
}
