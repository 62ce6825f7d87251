//! Passage-based questions: letter counting, Caesar decoding, and
//! needle retrieval from a long context.

use std::sync::OnceLock;

use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;

use super::numeric::NumericGrader;
use super::{Grader, SuiteContext};
use crate::bank::Passage;
use crate::error::GenerationError;
use crate::extract::normalize_words;
use crate::model::{Answer, CaseKind, Query};
use crate::results::VerificationResult;

fn passages(ctx: &SuiteContext, kind: CaseKind) -> Result<&[Passage], GenerationError> {
    if ctx.bank.passages.is_empty() {
        return Err(GenerationError::new(kind, "question bank has no passages"));
    }
    Ok(&ctx.bank.passages)
}

/// Case-insensitive occurrences of `letter` in `text`.
pub fn count_letter(text: &str, letter: char) -> usize {
    let letter = letter.to_ascii_lowercase();
    text.chars()
        .filter(|c| c.to_ascii_lowercase() == letter)
        .count()
}

pub(crate) fn generate_char_count(ctx: &SuiteContext) -> Result<Vec<Query>, GenerationError> {
    let kind = CaseKind::WikiCharCount;
    let pool = passages(ctx, kind)?;
    let mut rng = ctx.rng_for(kind);
    let mut out = Vec::with_capacity(ctx.cases_per_kind);

    for i in 0..ctx.cases_per_kind {
        let passage = &pool[rng.gen_range(0..pool.len())];
        let present: Vec<char> = ('a'..='z')
            .filter(|&c| count_letter(&passage.text, c) > 0)
            .collect();
        let Some(&letter) = present.choose(&mut rng) else {
            return Err(GenerationError::new(
                kind,
                format!("passage {} has no letters", passage.id),
            ));
        };
        let count = count_letter(&passage.text, letter) as i64;

        let question = format!(
            "How many times does the letter '{letter}' appear in the passage below? Count \
             uppercase and lowercase occurrences. Reply with the number.\n\n\"\"\"\n{}\n\"\"\"",
            passage.text
        );
        out.push(
            Query::new(
                kind,
                i,
                question,
                Answer::Integer(count),
                Grader::Numeric(NumericGrader::integer(count)),
            )
            .with_param("passage", &passage.id)
            .with_param("letter", letter),
        );
    }
    Ok(out)
}

/// Shift every ASCII letter forward by `shift` places, preserving case.
pub fn caesar_shift(text: &str, shift: u8) -> String {
    let shift = shift % 26;
    text.chars()
        .map(|c| {
            if c.is_ascii_lowercase() {
                (b'a' + (c as u8 - b'a' + shift) % 26) as char
            } else if c.is_ascii_uppercase() {
                (b'A' + (c as u8 - b'A' + shift) % 26) as char
            } else {
                c
            }
        })
        .collect()
}

/// Inverse of [`caesar_shift`].
pub fn caesar_unshift(text: &str, shift: u8) -> String {
    caesar_shift(text, 26 - shift % 26)
}

/// Grades a decoded sentence word by word.
#[derive(Debug, Clone)]
pub struct SentenceGrader {
    expected: Vec<String>,
}

impl SentenceGrader {
    pub fn new(sentence: &str) -> Self {
        Self {
            expected: normalize_words(sentence),
        }
    }

    pub fn grade(&self, candidate: &str) -> VerificationResult {
        let words = normalize_words(candidate);
        if words.is_empty() {
            return VerificationResult::fail("no words in answer");
        }
        let n = self.expected.len();
        if n == 0 {
            return VerificationResult::fail("expected sentence has no words");
        }
        if words.windows(n).any(|w| w == self.expected.as_slice()) {
            return VerificationResult::pass();
        }

        // Best positional overlap over every alignment of the candidate.
        let mut best = 0;
        let offsets = words.len().saturating_sub(1).max(n.saturating_sub(1));
        for offset in 0..=offsets {
            let matched = self
                .expected
                .iter()
                .enumerate()
                .filter(|(i, w)| words.get(offset + i) == Some(*w))
                .count();
            best = best.max(matched);
        }
        let score = best as f64 / n as f64;
        if best == 0 {
            return VerificationResult::fail("decoded text shares no words with the sentence");
        }
        VerificationResult::partial(score, format!("{best}/{n} words decoded correctly"))
    }
}

pub(crate) fn generate_sentence_obfuscation(
    ctx: &SuiteContext,
) -> Result<Vec<Query>, GenerationError> {
    let kind = CaseKind::RandomSentenceObfuscation;
    let sentences: Vec<&str> = passages(ctx, kind)?
        .iter()
        .flat_map(|p| p.sentences())
        .filter(|s| s.split_whitespace().count() >= 6)
        .collect();
    if sentences.is_empty() {
        return Err(GenerationError::new(kind, "no sentence has at least six words"));
    }
    let mut rng = ctx.rng_for(kind);
    let mut out = Vec::with_capacity(ctx.cases_per_kind);

    for i in 0..ctx.cases_per_kind {
        let sentence = sentences[rng.gen_range(0..sentences.len())];
        let shift: u8 = rng.gen_range(1..=25);
        let encoded = caesar_shift(sentence, shift);

        let question = format!(
            "The sentence below was encoded with a Caesar cipher: every letter was shifted \
             {shift} places forward in the alphabet, wrapping from z back to a. Punctuation \
             and spaces are unchanged. Decode it and reply with the original sentence.\n\n{encoded}"
        );
        out.push(
            Query::new(
                kind,
                i,
                question,
                Answer::Text(sentence.to_string()),
                Grader::Sentence(SentenceGrader::new(sentence)),
            )
            .with_param("shift", shift),
        );
    }
    Ok(out)
}

fn six_digit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{6}\b").expect("code pattern is valid"))
}

/// Grades retrieval of a six-digit code.
#[derive(Debug, Clone)]
pub struct NeedleGrader {
    code: String,
}

impl NeedleGrader {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }

    pub fn grade(&self, candidate: &str) -> VerificationResult {
        let codes: Vec<&str> = six_digit_re()
            .find_iter(candidate)
            .map(|m| m.as_str())
            .collect();
        if codes.is_empty() {
            return VerificationResult::fail("no six-digit code in answer");
        }
        if codes.iter().all(|c| *c == self.code) {
            VerificationResult::pass()
        } else {
            VerificationResult::fail(format!(
                "expected {}, answer mentions {}",
                self.code,
                codes.join(", ")
            ))
        }
    }
}

pub(crate) fn generate_long_context(ctx: &SuiteContext) -> Result<Vec<Query>, GenerationError> {
    let kind = CaseKind::LongContextWikiBook;
    let pool = passages(ctx, kind)?;
    let mut rng = ctx.rng_for(kind);
    let mut out = Vec::with_capacity(ctx.cases_per_kind);

    for i in 0..ctx.cases_per_kind {
        let mut order: Vec<&Passage> = pool.iter().collect();
        let mut paragraphs: Vec<String> = Vec::new();
        let mut size = 0;
        while size < ctx.long_context_chars || paragraphs.len() < 2 {
            order.shuffle(&mut rng);
            for p in &order {
                size += p.title.len() + p.text.len() + 4;
                paragraphs.push(format!("## {}\n{}", p.title, p.text));
                if size >= ctx.long_context_chars && paragraphs.len() >= 2 {
                    break;
                }
            }
        }

        let code = rng.gen_range(100_000..=999_999u32).to_string();
        let depth = rng.gen_range(1..paragraphs.len());
        paragraphs.insert(depth, format!("The archive access code is {code}."));

        let question = format!(
            "Read the following collection of articles carefully.\n\n{}\n\nSomewhere in the \
             articles above an archive access code is mentioned. What is the archive access \
             code? Reply with the six-digit code.",
            paragraphs.join("\n\n")
        );
        out.push(
            Query::new(
                kind,
                i,
                question,
                Answer::Text(code.clone()),
                Grader::Needle(NeedleGrader::new(code)),
            )
            .with_param("depth", depth)
            .with_param("paragraphs", paragraphs.len()),
        );
    }
    Ok(out)
}
