//! Multiple-choice questions with scrambled stems, permuted options or
//! unfamiliar labels.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::{Grader, SuiteContext};
use crate::bank::McqItem;
use crate::error::GenerationError;
use crate::extract::{choice_label, committed_answer_offsets};
use crate::model::{Answer, CaseKind, Query};
use crate::results::VerificationResult;

/// Labels used for the medical variant. `A` and `I` are excluded because
/// they double as English words.
const UNUSUAL_LABELS: &str = "EFGHJKLMNOPQRSTUVWXYZ";

/// Reversible interior-letter scrambler.
///
/// Every word of four or more letters keeps its first and last letter;
/// the interior is permuted by a permutation derived from the key and the
/// interior length, so the same key always inverts the same way.
#[derive(Debug, Clone, Copy)]
pub struct Scrambler {
    key: u64,
}

impl Scrambler {
    pub fn new(key: u64) -> Self {
        Self { key }
    }

    fn permutation(&self, n: usize) -> Vec<usize> {
        let mut p: Vec<usize> = (0..n).collect();
        p.shuffle(&mut StdRng::seed_from_u64(self.key ^ (n as u64).rotate_left(17)));
        p
    }

    fn map_words(&self, text: &str, inverse: bool) -> String {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len());
        let mut i = 0;
        while i < chars.len() {
            if !chars[i].is_alphabetic() {
                out.push(chars[i]);
                i += 1;
                continue;
            }
            let start = i;
            while i < chars.len() && chars[i].is_alphabetic() {
                i += 1;
            }
            let word = &chars[start..i];
            if word.len() < 4 {
                out.extend(word);
                continue;
            }
            let interior = &word[1..word.len() - 1];
            let perm = self.permutation(interior.len());
            let mut mapped = interior.to_vec();
            for (dst, &src) in perm.iter().enumerate() {
                if inverse {
                    mapped[src] = interior[dst];
                } else {
                    mapped[dst] = interior[src];
                }
            }
            out.push(word[0]);
            out.extend(mapped);
            out.push(word[word.len() - 1]);
        }
        out
    }

    pub fn apply(&self, text: &str) -> String {
        self.map_words(text, false)
    }

    pub fn invert(&self, text: &str) -> String {
        self.map_words(text, true)
    }
}

/// Grades a label answer against a fixed label set.
#[derive(Debug, Clone)]
pub struct ChoiceGrader {
    labels: Vec<char>,
    correct: char,
}

impl ChoiceGrader {
    pub fn new(labels: Vec<char>, correct: char) -> Self {
        Self { labels, correct }
    }

    pub fn grade(&self, candidate: &str) -> VerificationResult {
        match choice_label(candidate, &self.labels) {
            Some(label) if label == self.correct => VerificationResult::pass(),
            Some(label) => {
                VerificationResult::fail(format!("chose ({label}), expected ({})", self.correct))
            }
            None => {
                let allowed: String = self.labels.iter().collect();
                VerificationResult::fail(format!("no label from {allowed} found in answer"))
            }
        }
    }
}

/// Whole-word occurrences of `needle` in `haystack` as `(start, end)`
/// byte ranges.
fn word_matches<'a>(haystack: &'a str, needle: &'a str) -> impl Iterator<Item = (usize, usize)> + 'a {
    let boundary = |c: Option<char>| c.map_or(true, |c| !c.is_alphanumeric());
    haystack
        .match_indices(needle)
        .filter(move |_| !needle.is_empty())
        .map(|(start, m)| (start, start + m.len()))
        .filter(move |&(start, end)| {
            boundary(haystack[..start].chars().next_back()) && boundary(haystack[end..].chars().next())
        })
}

/// Grades an answer given as the text of one of the options.
#[derive(Debug, Clone)]
pub struct OptionTextGrader {
    options: Vec<String>,
    correct: usize,
}

impl OptionTextGrader {
    pub fn new(options: Vec<String>, correct: usize) -> Self {
        Self { options, correct }
    }

    /// The option named first after a committed answer marker ("the answer
    /// is ..."); a longer option beats one it contains.
    fn committed_option(&self, lowered: &str, needles: &[String]) -> Option<usize> {
        committed_answer_offsets(lowered).into_iter().find_map(|from| {
            needles
                .iter()
                .enumerate()
                .filter_map(|(i, needle)| {
                    word_matches(lowered, needle)
                        .find(|&(start, _)| start >= from)
                        .map(|(start, _)| (start, std::cmp::Reverse(needle.len()), i))
                })
                .min()
                .map(|(_, _, i)| i)
        })
    }

    /// The option mentioned last; a longer option beats one it contains.
    fn last_mentioned(&self, lowered: &str, needles: &[String]) -> Option<usize> {
        needles
            .iter()
            .enumerate()
            .filter_map(|(i, needle)| {
                word_matches(lowered, needle).last().map(|(_, end)| (end, needle.len(), i))
            })
            .max()
            .map(|(_, _, i)| i)
    }

    pub fn grade(&self, candidate: &str) -> VerificationResult {
        let lowered = candidate.to_lowercase();
        let needles: Vec<String> = self.options.iter().map(|o| o.to_lowercase()).collect();
        let chosen = self
            .committed_option(&lowered, &needles)
            .or_else(|| self.last_mentioned(&lowered, &needles));
        match chosen {
            Some(i) if i == self.correct => VerificationResult::pass(),
            Some(i) => VerificationResult::fail(format!(
                "chose \"{}\", expected \"{}\"",
                self.options[i], self.options[self.correct]
            )),
            None => VerificationResult::fail("answer names none of the options"),
        }
    }
}

fn items<'a>(
    pool: &'a [McqItem],
    kind: CaseKind,
    source: &str,
) -> Result<Vec<&'a McqItem>, GenerationError> {
    let usable: Vec<&McqItem> = pool
        .iter()
        .filter(|m| m.options.len() >= 2 && m.options.len() <= 26 && m.answer < m.options.len())
        .collect();
    if usable.is_empty() {
        return Err(GenerationError::new(
            kind,
            format!("question bank has no usable {source} items"),
        ));
    }
    Ok(usable)
}

/// Shuffle options, returning them with the new index of the answer.
fn permute(rng: &mut StdRng, item: &McqItem) -> (Vec<String>, usize) {
    let mut order: Vec<usize> = (0..item.options.len()).collect();
    order.shuffle(rng);
    let options = order.iter().map(|&i| item.options[i].clone()).collect();
    let correct = order.iter().position(|&i| i == item.answer).unwrap_or(0);
    (options, correct)
}

fn render_labelled(labels: &[char], options: &[String]) -> String {
    labels
        .iter()
        .zip(options)
        .map(|(l, o)| format!("({l}) {o}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn generate_mmlu_obfuscated(ctx: &SuiteContext) -> Result<Vec<Query>, GenerationError> {
    let kind = CaseKind::MmluObfuscated;
    let pool = items(&ctx.bank.mmlu, kind, "mmlu")?;
    let mut rng = ctx.rng_for(kind);
    let mut out = Vec::with_capacity(ctx.cases_per_kind);

    for i in 0..ctx.cases_per_kind {
        let item = pool[rng.gen_range(0..pool.len())];
        let key: u64 = rng.gen();
        let stem = Scrambler::new(key).apply(&item.question);
        let (options, correct) = permute(&mut rng, item);
        let bullets: Vec<String> = options.iter().map(|o| format!("- {o}")).collect();

        let question = format!(
            "The letters inside the longer words of this question have been shuffled; the \
             first and last letter of each word are in place. Work out the question and \
             answer it by repeating the text of the correct option exactly.\n\n{stem}\n\n{}",
            bullets.join("\n")
        );
        out.push(
            Query::new(
                kind,
                i,
                question,
                Answer::Text(options[correct].clone()),
                Grader::OptionText(OptionTextGrader::new(options, correct)),
            )
            .with_param("item", &item.id)
            .with_param("scramble_key", key),
        );
    }
    Ok(out)
}

pub(crate) fn generate_mmlu_choice(ctx: &SuiteContext) -> Result<Vec<Query>, GenerationError> {
    let kind = CaseKind::MmluObfuscatedChoice;
    let pool = items(&ctx.bank.mmlu, kind, "mmlu")?;
    let mut rng = ctx.rng_for(kind);
    let mut out = Vec::with_capacity(ctx.cases_per_kind);

    for i in 0..ctx.cases_per_kind {
        let item = pool[rng.gen_range(0..pool.len())];
        let (options, correct) = permute(&mut rng, item);
        let labels: Vec<char> = ('A'..='Z').take(options.len()).collect();

        let question = format!(
            "{}\n\n{}\n\nReply with the letter of the correct option in parentheses, e.g. (A).",
            item.question,
            render_labelled(&labels, &options)
        );
        out.push(
            Query::new(
                kind,
                i,
                question,
                Answer::Choice {
                    label: labels[correct],
                    text: options[correct].clone(),
                },
                Grader::Choice(ChoiceGrader::new(labels.clone(), labels[correct])),
            )
            .with_param("item", &item.id),
        );
    }
    Ok(out)
}

pub(crate) fn generate_medmcqa_choice(ctx: &SuiteContext) -> Result<Vec<Query>, GenerationError> {
    let kind = CaseKind::MedMcqaObfuscatedChoice;
    let pool: Vec<&McqItem> = items(&ctx.bank.medmcqa, kind, "medmcqa")?
        .into_iter()
        .filter(|m| m.options.len() <= UNUSUAL_LABELS.len())
        .collect();
    if pool.is_empty() {
        return Err(GenerationError::new(kind, "medmcqa items have too many options"));
    }
    let alphabet: Vec<char> = UNUSUAL_LABELS.chars().collect();
    let mut rng = ctx.rng_for(kind);
    let mut out = Vec::with_capacity(ctx.cases_per_kind);

    for i in 0..ctx.cases_per_kind {
        let item = pool[rng.gen_range(0..pool.len())];
        let (options, correct) = permute(&mut rng, item);
        let mut labels: Vec<char> = alphabet
            .choose_multiple(&mut rng, options.len())
            .copied()
            .collect();
        labels.sort_unstable();

        let question = format!(
            "{}\n\n{}\n\nThe options use unusual labels. Reply with the label of the correct \
             option in parentheses.",
            item.question,
            render_labelled(&labels, &options)
        );
        let label_set: String = labels.iter().collect();
        out.push(
            Query::new(
                kind,
                i,
                question,
                Answer::Choice {
                    label: labels[correct],
                    text: options[correct].clone(),
                },
                Grader::Choice(ChoiceGrader::new(labels.clone(), labels[correct])),
            )
            .with_param("item", &item.id)
            .with_param("labels", label_set),
        );
    }
    Ok(out)
}
