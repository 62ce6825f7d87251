//! Test-case variants: question generation and grading policies.
//!
//! Each submodule owns one family of questions. Generation is
//! deterministic for a given [`SuiteContext`] seed; grading is a pure
//! function of the query and the candidate text (the coding variant
//! additionally runs the candidate in the configured sandbox).

pub mod chess;
pub mod choice;
pub mod coding;
pub mod math;
pub mod numeric;
pub mod rules;
pub mod sudoku;
pub mod text;

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::bank::QuestionBank;
use crate::error::GenerationError;
use crate::model::{CaseKind, Language, Query};
use crate::results::VerificationResult;
use crate::traits::{CodeRunner, UnavailableRunner};

/// Everything a generator may read.
#[derive(Clone)]
pub struct SuiteContext {
    /// Base seed; each kind derives its own stream from it.
    pub seed: u64,
    /// Questions generated per kind.
    pub cases_per_kind: usize,
    /// Reference corpus.
    pub bank: Arc<QuestionBank>,
    /// Sandbox used to grade coding answers.
    pub runner: Arc<dyn CodeRunner>,
    /// Language requested from the model for coding questions.
    pub code_language: Language,
    /// Wall-clock limit for each held-out coding test.
    pub code_timeout_ms: u64,
    /// Approximate size of long-context prompts, in characters.
    pub long_context_chars: usize,
}

impl SuiteContext {
    pub fn new(bank: QuestionBank) -> Self {
        Self {
            seed: 0,
            cases_per_kind: 1,
            bank: Arc::new(bank),
            runner: Arc::new(UnavailableRunner),
            code_language: Language::Python,
            code_timeout_ms: 5_000,
            long_context_chars: 20_000,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_cases_per_kind(mut self, n: usize) -> Self {
        self.cases_per_kind = n;
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn CodeRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_code_language(mut self, language: Language) -> Self {
        self.code_language = language;
        self
    }

    pub fn with_long_context_chars(mut self, chars: usize) -> Self {
        self.long_context_chars = chars;
        self
    }

    pub(crate) fn rng_for(&self, kind: CaseKind) -> StdRng {
        StdRng::seed_from_u64(self.seed ^ kind.seed_salt())
    }
}

impl std::fmt::Debug for SuiteContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiteContext")
            .field("seed", &self.seed)
            .field("cases_per_kind", &self.cases_per_kind)
            .field("bank", &self.bank.id)
            .field("code_language", &self.code_language)
            .field("code_timeout_ms", &self.code_timeout_ms)
            .field("long_context_chars", &self.long_context_chars)
            .finish()
    }
}

impl CaseKind {
    /// Generate this kind's questions.
    ///
    /// Never returns an empty list: a kind that cannot produce questions
    /// fails with a [`GenerationError`].
    pub fn generate(self, ctx: &SuiteContext) -> Result<Vec<Query>, GenerationError> {
        if ctx.cases_per_kind == 0 {
            return Err(GenerationError::new(self, "cases_per_kind must be at least 1"));
        }
        let queries = match self {
            CaseKind::MathQa => math::generate_math(ctx)?,
            CaseKind::ImplicitCorrectionMath => math::generate_implicit_correction(ctx)?,
            CaseKind::NthDecimalDigit => numeric::generate_nth_digit(ctx)?,
            CaseKind::FindUniqueNumberIndex => numeric::generate_unique_index(ctx)?,
            CaseKind::WikiCharCount => text::generate_char_count(ctx)?,
            CaseKind::RandomSentenceObfuscation => text::generate_sentence_obfuscation(ctx)?,
            CaseKind::LongContextWikiBook => text::generate_long_context(ctx)?,
            CaseKind::SudokuValidation => sudoku::generate(ctx)?,
            CaseKind::ChessMemory => chess::generate(ctx)?,
            CaseKind::NRulesVector => rules::generate(ctx, false)?,
            CaseKind::NRulesVectorFakeGuidance => rules::generate(ctx, true)?,
            CaseKind::MmluObfuscated => choice::generate_mmlu_obfuscated(ctx)?,
            CaseKind::MmluObfuscatedChoice => choice::generate_mmlu_choice(ctx)?,
            CaseKind::MedMcqaObfuscatedChoice => choice::generate_medmcqa_choice(ctx)?,
            CaseKind::CodingQa => coding::generate(ctx)?,
        };
        if queries.is_empty() {
            return Err(GenerationError::new(self, "generator produced no questions"));
        }
        Ok(queries)
    }
}

/// Grading policy attached to a query.
#[derive(Debug, Clone)]
pub(crate) enum Grader {
    Numeric(numeric::NumericGrader),
    Choice(choice::ChoiceGrader),
    OptionText(choice::OptionTextGrader),
    Sudoku(sudoku::SudokuGrader),
    Board(chess::BoardGrader),
    Vector(rules::VectorGrader),
    Sentence(text::SentenceGrader),
    Needle(text::NeedleGrader),
    Program(coding::ProgramGrader),
}

impl Grader {
    pub(crate) async fn grade(&self, candidate: &str) -> VerificationResult {
        match self {
            Grader::Numeric(g) => g.grade(candidate),
            Grader::Choice(g) => g.grade(candidate),
            Grader::OptionText(g) => g.grade(candidate),
            Grader::Sudoku(g) => g.grade(candidate),
            Grader::Board(g) => g.grade(candidate),
            Grader::Vector(g) => g.grade(candidate),
            Grader::Sentence(g) => g.grade(candidate),
            Grader::Needle(g) => g.grade(candidate),
            Grader::Program(g) => g.grade(candidate).await,
        }
    }
}

/// English ordinal suffix: 1st, 2nd, 3rd, 11th, 22nd.
pub(crate) fn ordinal(n: usize) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> SuiteContext {
        SuiteContext::new(QuestionBank::builtin().unwrap())
            .with_seed(7)
            .with_cases_per_kind(3)
            .with_long_context_chars(4_000)
    }

    #[test]
    fn every_kind_generates_requested_count() {
        let ctx = ctx();
        for kind in CaseKind::ALL {
            let queries = kind.generate(&ctx).unwrap();
            assert_eq!(queries.len(), 3, "{kind}");
            assert!(queries.iter().all(|q| q.kind == kind));
            assert!(queries.iter().all(|q| !q.question.trim().is_empty()));
        }
    }

    #[test]
    fn generation_is_deterministic_by_seed() {
        let ctx = ctx();
        for kind in CaseKind::ALL {
            let a: Vec<String> = kind.generate(&ctx).unwrap().into_iter().map(|q| q.question).collect();
            let b: Vec<String> = kind.generate(&ctx).unwrap().into_iter().map(|q| q.question).collect();
            assert_eq!(a, b, "{kind}");
        }
    }

    #[test]
    fn different_seeds_differ() {
        let a = CaseKind::MathQa.generate(&ctx()).unwrap();
        let b = CaseKind::MathQa.generate(&ctx().with_seed(8)).unwrap();
        let qa: Vec<&str> = a.iter().map(|q| q.question.as_str()).collect();
        let qb: Vec<&str> = b.iter().map(|q| q.question.as_str()).collect();
        assert_ne!(qa, qb);
    }

    #[test]
    fn zero_cases_is_a_generation_error() {
        let err = CaseKind::MathQa
            .generate(&ctx().with_cases_per_kind(0))
            .unwrap_err();
        assert_eq!(err.kind, CaseKind::MathQa);
    }

    #[test]
    fn ordinals() {
        assert_eq!(ordinal(1), "1st");
        assert_eq!(ordinal(2), "2nd");
        assert_eq!(ordinal(3), "3rd");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(22), "22nd");
        assert_eq!(ordinal(113), "113th");
    }

    #[tokio::test]
    async fn expected_answers_grade_correct() {
        // Rendering the canonical answer and grading it must give full credit
        // for every non-program kind.
        let ctx = ctx();
        for kind in CaseKind::ALL {
            if kind == CaseKind::CodingQa {
                continue;
            }
            for q in kind.generate(&ctx).unwrap() {
                let result = q.verify(&q.expected.to_string()).await;
                assert!(result.correct, "{} rejected its own answer: {:?}", q.id, result);
            }
        }
    }

    #[tokio::test]
    async fn verification_is_pure() {
        let ctx = ctx();
        for kind in CaseKind::ALL {
            for q in kind.generate(&ctx).unwrap() {
                for candidate in ["", "42", "The answer is (B).", "[1, 2, 3]", "white knight"] {
                    let a = q.verify(candidate).await;
                    let b = q.verify(candidate).await;
                    assert_eq!(a, b, "{} not deterministic on {candidate:?}", q.id);
                    assert!(a.is_well_formed());
                }
            }
        }
    }
}
