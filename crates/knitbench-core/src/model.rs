//! Core data model types for knitbench.
//!
//! These are the types the whole harness passes around: the closed set of
//! test-case kinds, the canonical answers they expect, and the generated
//! queries that carry a grading policy.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cases::Grader;
use crate::results::VerificationResult;

/// Every question family the harness knows how to generate and grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaseKind {
    MathQa,
    CodingQa,
    SudokuValidation,
    ChessMemory,
    NRulesVector,
    NRulesVectorFakeGuidance,
    NthDecimalDigit,
    FindUniqueNumberIndex,
    WikiCharCount,
    MmluObfuscated,
    MmluObfuscatedChoice,
    MedMcqaObfuscatedChoice,
    ImplicitCorrectionMath,
    RandomSentenceObfuscation,
    LongContextWikiBook,
}

impl CaseKind {
    /// All kinds in canonical suite order.
    pub const ALL: [CaseKind; 15] = [
        CaseKind::MathQa,
        CaseKind::RandomSentenceObfuscation,
        CaseKind::CodingQa,
        CaseKind::LongContextWikiBook,
        CaseKind::SudokuValidation,
        CaseKind::ChessMemory,
        CaseKind::NRulesVector,
        CaseKind::NRulesVectorFakeGuidance,
        CaseKind::NthDecimalDigit,
        CaseKind::FindUniqueNumberIndex,
        CaseKind::WikiCharCount,
        CaseKind::MmluObfuscated,
        CaseKind::MmluObfuscatedChoice,
        CaseKind::MedMcqaObfuscatedChoice,
        CaseKind::ImplicitCorrectionMath,
    ];

    /// Stable kebab-case name used on the command line and in reports.
    pub fn name(self) -> &'static str {
        match self {
            CaseKind::MathQa => "math-qa",
            CaseKind::CodingQa => "coding-qa",
            CaseKind::SudokuValidation => "sudoku-validation",
            CaseKind::ChessMemory => "chess-memory",
            CaseKind::NRulesVector => "n-rules-vector",
            CaseKind::NRulesVectorFakeGuidance => "n-rules-vector-fake-guidance",
            CaseKind::NthDecimalDigit => "nth-decimal-digit",
            CaseKind::FindUniqueNumberIndex => "find-unique-number-index",
            CaseKind::WikiCharCount => "wiki-char-count",
            CaseKind::MmluObfuscated => "mmlu-obfuscated",
            CaseKind::MmluObfuscatedChoice => "mmlu-obfuscated-choice",
            CaseKind::MedMcqaObfuscatedChoice => "med-mcqa-obfuscated-choice",
            CaseKind::ImplicitCorrectionMath => "implicit-correction-math",
            CaseKind::RandomSentenceObfuscation => "random-sentence-obfuscation",
            CaseKind::LongContextWikiBook => "long-context-wiki-book",
        }
    }

    /// One-line description for `knitbench list-cases`.
    pub fn description(self) -> &'static str {
        match self {
            CaseKind::MathQa => "templated arithmetic word problems",
            CaseKind::CodingQa => "stdin/stdout programs checked against held-out tests",
            CaseKind::SudokuValidation => "complete a sudoku; graded by grid validity",
            CaseKind::ChessMemory => "track pieces through a move list",
            CaseKind::NRulesVector => "apply N ordered rules to an integer vector",
            CaseKind::NRulesVectorFakeGuidance => "rule following with a misleading hint",
            CaseKind::NthDecimalDigit => "n-th decimal digit of a fraction",
            CaseKind::FindUniqueNumberIndex => "index of the only unpaired number",
            CaseKind::WikiCharCount => "count a letter in a reference passage",
            CaseKind::MmluObfuscated => "scrambled multiple-choice stem, answer by text",
            CaseKind::MmluObfuscatedChoice => "multiple choice with permuted options",
            CaseKind::MedMcqaObfuscatedChoice => "medical multiple choice with scrambled labels",
            CaseKind::ImplicitCorrectionMath => "word problem that corrects itself midway",
            CaseKind::RandomSentenceObfuscation => "decode a Caesar-shifted sentence",
            CaseKind::LongContextWikiBook => "retrieve a code buried in a long context",
        }
    }

    /// Category offset added to the implicit opponent rating.
    pub fn difficulty_offset(self) -> f64 {
        match self {
            CaseKind::MathQa | CaseKind::WikiCharCount => 0.0,
            CaseKind::NthDecimalDigit | CaseKind::FindUniqueNumberIndex => 25.0,
            CaseKind::MmluObfuscatedChoice | CaseKind::RandomSentenceObfuscation => 50.0,
            CaseKind::MmluObfuscated | CaseKind::ImplicitCorrectionMath => 75.0,
            CaseKind::MedMcqaObfuscatedChoice | CaseKind::ChessMemory => 100.0,
            CaseKind::LongContextWikiBook | CaseKind::NRulesVector => 125.0,
            CaseKind::NRulesVectorFakeGuidance | CaseKind::SudokuValidation => 175.0,
            CaseKind::CodingQa => 200.0,
        }
    }

    /// Stable per-kind salt for deriving generation seeds.
    pub(crate) fn seed_salt(self) -> u64 {
        CaseKind::ALL
            .iter()
            .position(|k| *k == self)
            .map(|i| (i as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15))
            .unwrap_or(0)
    }
}

impl fmt::Display for CaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CaseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        CaseKind::ALL
            .into_iter()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| format!("unknown case kind: {s}"))
    }
}

/// Languages accepted by the coding variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Rust,
}

impl Language {
    /// Markdown fence tags that identify this language.
    pub fn fence_tags(self) -> &'static [&'static str] {
        match self {
            Language::Python => &["python", "py", "python3"],
            Language::Rust => &["rust", "rs"],
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Python => write!(f, "python"),
            Language::Rust => write!(f, "rust"),
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "python" | "py" | "python3" => Ok(Language::Python),
            "rust" | "rs" => Ok(Language::Rust),
            other => Err(format!("unknown language: {other}")),
        }
    }
}

/// One held-out input/output pair for a coding question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoPair {
    pub input: String,
    pub output: String,
}

/// The canonical expected answer of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Answer {
    Integer(i64),
    Number(f64),
    Text(String),
    Choice { label: char, text: String },
    Vector(Vec<i64>),
    /// Row-major 9x9 grid, digits 1-9.
    Grid(Vec<u8>),
    Program { tests: Vec<IoPair> },
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Integer(n) => write!(f, "{n}"),
            Answer::Number(x) => write!(f, "{x}"),
            Answer::Text(s) => f.write_str(s),
            Answer::Choice { label, text } => write!(f, "({label}) {text}"),
            Answer::Vector(v) => {
                let items: Vec<String> = v.iter().map(|x| x.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Answer::Grid(cells) => {
                for (i, row) in cells.chunks(9).enumerate() {
                    if i > 0 {
                        f.write_str("\n")?;
                    }
                    let row: Vec<String> = row.iter().map(|d| d.to_string()).collect();
                    f.write_str(&row.join(" "))?;
                }
                Ok(())
            }
            Answer::Program { tests } => write!(f, "<program passing {} held-out tests>", tests.len()),
        }
    }
}

/// A generated question with its expected answer and grading policy.
///
/// Queries are immutable once generated; grading takes `&self`.
#[derive(Debug, Clone)]
pub struct Query {
    /// Unique identifier, `<kind>-<index>`.
    pub id: String,
    pub kind: CaseKind,
    /// Rendered prompt sent to the model.
    pub question: String,
    /// Canonical expected answer.
    pub expected: Answer,
    /// Generation parameters (seed, sizes, obfuscation keys).
    pub params: BTreeMap<String, String>,
    pub(crate) grader: Grader,
}

impl Query {
    pub(crate) fn new(
        kind: CaseKind,
        index: usize,
        question: String,
        expected: Answer,
        grader: Grader,
    ) -> Self {
        Self {
            id: format!("{kind}-{index}"),
            kind,
            question,
            expected,
            params: BTreeMap::new(),
            grader,
        }
    }

    pub(crate) fn with_param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    /// Grade a candidate answer.
    ///
    /// Never fails: malformed candidates, crashes and timeouts of submitted
    /// code all become incorrect results.
    pub async fn verify(&self, candidate: &str) -> VerificationResult {
        self.grader.grade(candidate).await
    }
}
