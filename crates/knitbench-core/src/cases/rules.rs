//! Apply a sequence of vector rules, optionally next to a misleading hint.

use std::fmt;

use rand::rngs::StdRng;
use rand::Rng;

use super::{Grader, SuiteContext};
use crate::error::GenerationError;
use crate::extract::int_vector;
use crate::model::{Answer, CaseKind, Query};
use crate::results::VerificationResult;

/// One transformation of an integer vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    AddAll(i64),
    MultiplyAll(i64),
    AddAtEven(i64),
    Reverse,
    RotateLeft(usize),
    SwapFirstLast,
    NegateGreaterThan(i64),
    SubtractFromOdd(i64),
}

impl Rule {
    pub fn apply(self, v: &mut Vec<i64>) {
        match self {
            Rule::AddAll(k) => v.iter_mut().for_each(|x| *x += k),
            Rule::MultiplyAll(k) => v.iter_mut().for_each(|x| *x *= k),
            Rule::AddAtEven(k) => v.iter_mut().step_by(2).for_each(|x| *x += k),
            Rule::Reverse => v.reverse(),
            Rule::RotateLeft(k) => {
                if !v.is_empty() {
                    let k = k % v.len();
                    v.rotate_left(k);
                }
            }
            Rule::SwapFirstLast => {
                if let Some(last) = v.len().checked_sub(1) {
                    v.swap(0, last);
                }
            }
            Rule::NegateGreaterThan(t) => v.iter_mut().filter(|x| **x > t).for_each(|x| *x = -*x),
            Rule::SubtractFromOdd(k) => v
                .iter_mut()
                .filter(|x| **x % 2 != 0)
                .for_each(|x| *x -= k),
        }
    }

    fn random(rng: &mut StdRng) -> Rule {
        match rng.gen_range(0..8) {
            0 => Rule::AddAll(rng.gen_range(1..=9)),
            1 => Rule::MultiplyAll(rng.gen_range(2..=3)),
            2 => Rule::AddAtEven(rng.gen_range(1..=9)),
            3 => Rule::Reverse,
            4 => Rule::RotateLeft(rng.gen_range(1..=3)),
            5 => Rule::SwapFirstLast,
            6 => Rule::NegateGreaterThan(rng.gen_range(0..=15)),
            _ => Rule::SubtractFromOdd(rng.gen_range(1..=5)),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::AddAll(k) => write!(f, "Add {k} to every element."),
            Rule::MultiplyAll(k) => write!(f, "Multiply every element by {k}."),
            Rule::AddAtEven(k) => write!(
                f,
                "Add {k} to the elements at even positions (positions 0, 2, 4, and so on)."
            ),
            Rule::Reverse => write!(f, "Reverse the order of the elements."),
            Rule::RotateLeft(k) => write!(
                f,
                "Rotate the vector left by {k} (the first {k} element(s) move to the end)."
            ),
            Rule::SwapFirstLast => write!(f, "Swap the first and last elements."),
            Rule::NegateGreaterThan(t) => write!(f, "Negate every element greater than {t}."),
            Rule::SubtractFromOdd(k) => {
                write!(f, "Subtract {k} from every element that is odd.")
            }
        }
    }
}

/// Apply `rules` in order to a copy of `input`.
pub fn apply_rules(input: &[i64], rules: &[Rule]) -> Vec<i64> {
    let mut v = input.to_vec();
    for rule in rules {
        rule.apply(&mut v);
    }
    v
}

/// Grades a vector answer with partial credit for matching positions.
#[derive(Debug, Clone)]
pub struct VectorGrader {
    expected: Vec<i64>,
    /// The misleading hint, when one was shown.
    decoy: Option<Vec<i64>>,
}

impl VectorGrader {
    pub fn new(expected: Vec<i64>) -> Self {
        Self {
            expected,
            decoy: None,
        }
    }

    pub fn with_decoy(mut self, decoy: Vec<i64>) -> Self {
        self.decoy = Some(decoy);
        self
    }

    pub fn grade(&self, candidate: &str) -> VerificationResult {
        let Some(actual) = int_vector(candidate) else {
            return VerificationResult::fail("no integer vector found in answer");
        };
        if actual == self.expected {
            return VerificationResult::pass();
        }
        if self.decoy.as_ref() == Some(&actual) {
            return VerificationResult::fail("copied the misleading hint");
        }
        if actual.len() != self.expected.len() {
            return VerificationResult::fail(format!(
                "expected {} elements, got {}",
                self.expected.len(),
                actual.len()
            ));
        }
        let matched = actual
            .iter()
            .zip(&self.expected)
            .filter(|(a, e)| a == e)
            .count();
        let n = self.expected.len();
        VerificationResult::partial(
            matched as f64 / n as f64,
            format!("{matched}/{n} positions correct"),
        )
    }
}

fn render(v: &[i64]) -> String {
    Answer::Vector(v.to_vec()).to_string()
}

pub(crate) fn generate(
    ctx: &SuiteContext,
    fake_guidance: bool,
) -> Result<Vec<Query>, GenerationError> {
    let kind = if fake_guidance {
        CaseKind::NRulesVectorFakeGuidance
    } else {
        CaseKind::NRulesVector
    };
    let mut rng = ctx.rng_for(kind);
    let mut out = Vec::with_capacity(ctx.cases_per_kind);

    for i in 0..ctx.cases_per_kind {
        let len = rng.gen_range(5..=8);
        let input: Vec<i64> = (0..len).map(|_| rng.gen_range(-9..=20)).collect();
        let n_rules = rng.gen_range(3..=6);

        // Redraw until the skipped-rule hint actually differs from the answer.
        let mut attempt = 0;
        let (rules, expected, hint) = loop {
            attempt += 1;
            let rules: Vec<Rule> = (0..n_rules).map(|_| Rule::random(&mut rng)).collect();
            let expected = apply_rules(&input, &rules);
            if !fake_guidance {
                break (rules, expected, None);
            }
            let skipped = rng.gen_range(0..rules.len());
            let mut partial = rules.clone();
            partial.remove(skipped);
            let hint = apply_rules(&input, &partial);
            if hint != expected {
                break (rules, expected, Some(hint));
            }
            if attempt >= 64 {
                return Err(GenerationError::new(kind, "could not build a misleading hint"));
            }
        };

        let listing: Vec<String> = rules
            .iter()
            .enumerate()
            .map(|(n, r)| format!("{}. {r}", n + 1))
            .collect();
        let mut question = format!(
            "Start with the vector {}. Apply the following {} rules in order, each to the \
             result of the previous one. Positions are counted from 0.\n\n{}\n",
            render(&input),
            rules.len(),
            listing.join("\n")
        );
        if let Some(hint) = &hint {
            question.push_str(&format!(
                "\nA helper already worked this out and got {}. Check the work carefully.\n",
                render(hint)
            ));
        }
        question.push_str("\nReply with the final vector in square brackets, e.g. [1, 2, 3].");

        let mut grader = VectorGrader::new(expected.clone());
        if let Some(hint) = hint.clone() {
            grader = grader.with_decoy(hint);
        }
        let mut query = Query::new(
            kind,
            i,
            question,
            Answer::Vector(expected),
            Grader::Vector(grader),
        )
        .with_param("rules", rules.len())
        .with_param("length", len);
        if let Some(hint) = hint {
            query = query.with_param("hint", render(&hint));
        }
        out.push(query);
    }
    Ok(out)
}
