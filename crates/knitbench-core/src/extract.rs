//! Tolerant extraction of comparable values from free-form model output.
//!
//! Every grader funnels candidate text through one of these helpers. They
//! never fail: unparseable text yields `None`, which graders turn into an
//! incorrect result.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::Language;

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"-?(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?(?:\s*/\s*\d+(?:\.\d+)?)?")
            .expect("number pattern is valid")
    })
}

fn answer_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:final answer|answer|result)\s*(?:is|:|=)?").expect("marker pattern is valid")
    })
}

/// An answer marker with an explicit connective, such as "the answer is"
/// or "Answer:". Unlike a bare "answer", it commits to what follows.
fn committed_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:final answer|correct answer|correct option|correct choice|answer)\s*(?:is|:|=|would be|should be)",
        )
        .expect("committed marker pattern is valid")
    })
}

/// Byte ranges just after each committed answer marker, in order.
pub fn committed_answer_offsets(text: &str) -> Vec<usize> {
    committed_marker_re().find_iter(text).map(|m| m.end()).collect()
}

/// End of the clause starting at `from`: the next newline, semicolon, or
/// full stop followed by whitespace.
pub fn clause_end(text: &str, from: usize) -> usize {
    let rest = &text[from..];
    let mut chars = rest.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '\n' | ';' => return from + i,
            '.' if chars.peek().map_or(true, |(_, n)| n.is_whitespace()) => return from + i,
            _ => {}
        }
    }
    text.len()
}

/// Drop markdown emphasis and dollar signs without gluing operands such as
/// `6*7` together.
fn strip_markup(text: &str) -> String {
    text.replace("**", "").replace("__", "").replace('$', "")
}

fn boxed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\\boxed\{([^{}]*)\}").expect("boxed pattern is valid"))
}

/// A number found in candidate text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberToken {
    pub value: f64,
    /// True when the token was written without a decimal part or fraction.
    pub integral: bool,
    /// Digits written after the decimal point; `None` for integers and
    /// fractions.
    pub decimals: Option<usize>,
    /// Byte offset of the token in the (cleaned) text.
    pub start: usize,
}

impl NumberToken {
    /// The token as an integer, if it was written as one.
    pub fn as_integer(&self) -> Option<i64> {
        if self.integral && self.value.abs() < 9.0e15 {
            Some(self.value as i64)
        } else {
            None
        }
    }
}

/// Parse a single numeric literal: `1,234`, `-3.5`, `1/2`.
pub fn parse_number(token: &str) -> Option<f64> {
    let token = token.trim();
    if let Some((num, den)) = token.split_once('/') {
        let num = parse_number(num)?;
        let den = parse_number(den)?;
        if den == 0.0 {
            return None;
        }
        return Some(num / den);
    }
    token.replace(',', "").parse::<f64>().ok()
}

/// All numbers in `text`, in order of appearance.
pub fn numbers(text: &str) -> Vec<NumberToken> {
    let bytes = text.as_bytes();
    number_re()
        .find_iter(text)
        .filter_map(|m| {
            let mut raw = m.as_str();
            let mut start = m.start();
            // "x-4" is a subtraction, not a negative literal.
            if raw.starts_with('-') && start > 0 && bytes[start - 1].is_ascii_alphanumeric() {
                raw = &raw[1..];
                start += 1;
            }
            let value = parse_number(raw)?;
            let decimals = if raw.contains('/') {
                None
            } else {
                raw.split_once('.').map(|(_, frac)| frac.len())
            };
            Some(NumberToken {
                value,
                integral: !raw.contains('.') && !raw.contains('/'),
                decimals,
                start,
            })
        })
        .collect()
}

/// The number a candidate most plausibly commits to as its final answer.
///
/// Policy, in order: the content of the last `\boxed{}`; the number after
/// the last "answer"/"result" marker (the result of `a*b = c` when the
/// clause spells out the arithmetic); the last number in the text.
pub fn final_number(text: &str) -> Option<NumberToken> {
    let cleaned = strip_markup(text);

    if let Some(caps) = boxed_re().captures_iter(&cleaned).last() {
        if let Some(token) = numbers(&caps[1]).into_iter().last() {
            return Some(token);
        }
    }

    let all = numbers(&cleaned);
    if let Some(marker) = answer_marker_re().find_iter(&cleaned).last() {
        let from = marker.end();
        let end = clause_end(&cleaned, from);
        let from = cleaned[from..end].rfind('=').map_or(from, |eq| from + eq + 1);
        if let Some(token) = all.iter().find(|t| t.start >= from) {
            return Some(*token);
        }
    }
    all.last().copied()
}

/// Relative comparison used by numeric graders.
pub fn approx_eq(actual: f64, expected: f64, rel_tol: f64) -> bool {
    (actual - expected).abs() <= rel_tol * expected.abs().max(1.0)
}

fn marker_label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i:answer|option|choice)\s*(?i:is|:|=)?\s*(?i:option|choice)?\s*(?:\(([A-Za-z])\)|\[([A-Za-z])\]|\b([A-Z])\b)",
        )
        .expect("label pattern is valid")
    })
}

/// A label right after a committed answer marker, e.g. the `B` of
/// "Answer: (B)" or "the answer is option B".
fn label_after_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?i:option|choice)?\s*(?:\(([A-Za-z])\)|\[([A-Za-z])\]|\b([A-Z])\b)")
            .expect("committed label pattern is valid")
    })
}

/// "B is correct", "(C) is the right answer".
fn label_is_correct_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:\(([A-Za-z])\)|\b([A-Z])\b)\s+is\s+(?:the\s+)?(?i:correct|right)\b")
            .expect("is-correct pattern is valid")
    })
}

fn paren_label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(([A-Z])\)").expect("paren pattern is valid"))
}

fn bare_label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([A-Z])\b").expect("bare pattern is valid"))
}

/// Extract a multiple-choice label restricted to `labels`.
///
/// Policy, in order: the first committed answer ("Answer: B", "the answer
/// is (B)", "B is correct"), so that explanations of the other options
/// after it do not count; a label after a weaker "option"/"choice" mention
/// (last one wins); the last parenthesized label such as `(C)`; a reply
/// that is only a label; the last standalone capital letter in `labels`,
/// skipping the article "A" and pronoun "I" when a lowercase word follows.
pub fn choice_label(text: &str, labels: &[char]) -> Option<char> {
    let cleaned = text.replace(['*', '_', '`'], "");
    let accept = |c: char| {
        let c = c.to_ascii_uppercase();
        labels.contains(&c).then_some(c)
    };
    let letter_of = |caps: &regex::Captures<'_>| {
        let m = (1..caps.len()).find_map(|i| caps.get(i))?;
        m.as_str().chars().next().and_then(accept)
    };

    let after_marker = committed_answer_offsets(&cleaned).into_iter().find_map(|end| {
        let caps = label_after_marker_re().captures(&cleaned[end..])?;
        letter_of(&caps).map(|c| (end, c))
    });
    let is_correct = label_is_correct_re()
        .captures_iter(&cleaned)
        .find_map(|caps| letter_of(&caps).map(|c| (caps.get(0).map_or(0, |m| m.start()), c)));
    let committed = match (after_marker, is_correct) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a.1 } else { b.1 }),
        (a, b) => a.or(b).map(|(_, c)| c),
    };
    if committed.is_some() {
        return committed;
    }

    let marked = marker_label_re()
        .captures_iter(&cleaned)
        .filter_map(|caps| {
            let letter = caps.get(1).or(caps.get(2)).or(caps.get(3))?;
            letter.as_str().chars().next().and_then(accept)
        })
        .last();
    if marked.is_some() {
        return marked;
    }

    let paren = paren_label_re()
        .captures_iter(&cleaned)
        .filter_map(|caps| caps[1].chars().next().and_then(accept))
        .last();
    if paren.is_some() {
        return paren;
    }

    let trimmed = cleaned.trim().trim_matches(|c: char| !c.is_ascii_alphanumeric());
    if trimmed.chars().count() == 1 {
        return trimmed.chars().next().and_then(accept);
    }

    bare_label_re()
        .captures_iter(&cleaned)
        .filter_map(|caps| {
            let m = caps.get(1)?;
            let c = m.as_str().chars().next()?;
            if c == 'A' || c == 'I' {
                let next = cleaned[m.end()..].trim_start().chars().next();
                if next.is_some_and(|n| n.is_ascii_lowercase()) {
                    return None;
                }
            }
            accept(c)
        })
        .last()
}

fn bracket_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\[\]]*)\]").expect("bracket pattern is valid"))
}

fn parse_int_list(body: &str) -> Option<Vec<i64>> {
    let mut values = Vec::new();
    for part in body.split(|c: char| c == ',' || c == ';' || c.is_whitespace()) {
        if part.is_empty() {
            continue;
        }
        values.push(part.parse::<i64>().ok()?);
    }
    (!values.is_empty()).then_some(values)
}

/// Extract an integer vector: the last bracketed list, else the last line
/// consisting only of integers and separators.
pub fn int_vector(text: &str) -> Option<Vec<i64>> {
    let cleaned = text.replace(['*', '`'], "");
    if let Some(v) = bracket_re()
        .captures_iter(&cleaned)
        .filter_map(|caps| parse_int_list(&caps[1]))
        .last()
    {
        return Some(v);
    }
    cleaned
        .lines()
        .rev()
        .find_map(|line| parse_int_list(line.trim().trim_matches(|c| c == '(' || c == ')' || c == '.')))
}

/// Lowercased alphanumeric words, used for text comparisons.
pub fn normalize_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Extract source code from a markdown-formatted response.
///
/// Blocks tagged with the requested language win over untagged blocks;
/// with no fenced blocks at all the raw response is returned. An unclosed
/// trailing block (truncated output) still counts.
pub fn extract_code(response: &str, language: Language) -> String {
    let mut tagged = Vec::new();
    let mut generic = Vec::new();
    let mut in_block = false;
    let mut is_tagged = false;
    let mut is_generic = false;
    let mut current = String::new();

    for line in response.lines() {
        let trimmed = line.trim();

        if !in_block && trimmed.starts_with("```") {
            in_block = true;
            let tag = trimmed.trim_start_matches('`').trim().to_lowercase();
            is_tagged = language.fence_tags().contains(&tag.as_str());
            is_generic = tag.is_empty();
            current.clear();
            continue;
        }

        if in_block && trimmed == "```" {
            in_block = false;
            if is_tagged {
                tagged.push(std::mem::take(&mut current));
            } else if is_generic {
                generic.push(std::mem::take(&mut current));
            }
            current.clear();
            continue;
        }

        if in_block {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        }
    }

    if in_block && !current.is_empty() {
        if is_tagged {
            tagged.push(current);
        } else if is_generic {
            generic.push(current);
        }
    }

    if !tagged.is_empty() {
        return tagged.join("\n\n");
    }
    if !generic.is_empty() {
        return generic.join("\n\n");
    }
    response.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_number_prefers_answer_marker() {
        let t = final_number("Step 1: 3 + 4 = 7. Step 2: 7 * 6. The answer is 42, not 41.").unwrap();
        assert_eq!(t.value, 42.0);
        assert!(t.integral);
    }

    #[test]
    fn final_number_falls_back_to_last() {
        assert_eq!(final_number("so we get 12 then 15").unwrap().value, 15.0);
        assert!(final_number("no digits here").is_none());
    }

    #[test]
    fn final_number_reads_boxed() {
        assert_eq!(final_number(r"thus $\boxed{17}$ and 3 remain").unwrap().value, 17.0);
    }

    #[test]
    fn fractions_and_separators() {
        assert_eq!(final_number("answer: 1/2").unwrap().value, 0.5);
        assert_eq!(final_number("0.5").unwrap().value, 0.5);
        assert_eq!(final_number("It costs 1,234 dollars").unwrap().value, 1234.0);
        assert_eq!(final_number("It is -7.").unwrap().value, -7.0);
        assert!(!final_number("1/2").unwrap().integral);
    }

    #[test]
    fn subtraction_is_not_negative() {
        let all = numbers("x-4");
        assert_eq!(all[0].value, 4.0);
    }

    #[test]
    fn division_by_zero_is_skipped() {
        assert!(parse_number("3/0").is_none());
    }

    #[test]
    fn choice_label_policies() {
        let labels = ['A', 'B', 'C', 'D'];
        assert_eq!(choice_label("The answer is (B).", &labels), Some('B'));
        assert_eq!(choice_label("c", &labels), Some('C'));
        assert_eq!(
            choice_label("A careful reading shows option D fits best.", &labels),
            Some('D')
        );
        assert_eq!(choice_label("I think (A) is right", &labels), Some('A'));
        assert_eq!(choice_label("**Answer: C**", &labels), Some('C'));
        assert_eq!(choice_label("none of these", &labels), None);
    }

    #[test]
    fn committed_answer_beats_later_explanation() {
        let labels = ['A', 'B', 'C', 'D'];
        let cases = [
            ("**Answer: (B)**\n\nExplanation: Option (A) is incorrect because it ignores friction.", 'B'),
            ("The answer is B. Option C is a common misconception.", 'B'),
            ("B is correct. Choice A would only apply to gases.", 'B'),
            ("The correct option is D; option A describes solids.", 'D'),
            ("Option A looks tempting, but the answer is (C).", 'C'),
            ("Final answer: A\n\nOption B fails for negative inputs.", 'A'),
        ];
        for (text, expected) in cases {
            assert_eq!(choice_label(text, &labels), Some(expected), "{text}");
        }
    }

    #[test]
    fn weak_mentions_still_fall_back_to_last() {
        let labels = ['A', 'B', 'C', 'D'];
        assert_eq!(choice_label("Option A is wrong, option C fits.", &labels), Some('C'));
        assert_eq!(choice_label("Between (A) and (D), I pick (D)", &labels), Some('D'));
    }

    #[test]
    fn final_number_reads_result_of_inline_arithmetic() {
        let cases = [
            ("The answer is 6*7 = 42.", 42.0),
            ("The answer is **42**.", 42.0),
            ("answer: 3 x 4 = 12, so we are done", 12.0),
            ("The answer is 0.583. That is 7/12 rounded.", 0.583),
            ("6*7", 7.0),
        ];
        for (text, expected) in cases {
            assert_eq!(final_number(text).unwrap().value, expected, "{text}");
        }
    }

    #[test]
    fn decimal_places_are_recorded() {
        assert_eq!(final_number("0.583").unwrap().decimals, Some(3));
        assert_eq!(final_number("12").unwrap().decimals, None);
        assert_eq!(final_number("7/12").unwrap().decimals, None);
        assert_eq!(final_number("1,234.50").unwrap().decimals, Some(2));
    }

    #[test]
    fn choice_label_respects_label_set() {
        let labels = ['Q', 'M', 'X', 'K'];
        assert_eq!(choice_label("Answer: M", &labels), Some('M'));
        assert_eq!(choice_label("Answer: B", &labels), None);
    }

    #[test]
    fn int_vector_forms() {
        assert_eq!(int_vector("Final: [1, -2, 3]"), Some(vec![1, -2, 3]));
        assert_eq!(int_vector("steps [9]\nresult:\n4, 5, 6"), Some(vec![9]));
        assert_eq!(int_vector("the vector is\n4 5 6"), Some(vec![4, 5, 6]));
        assert_eq!(int_vector("no vector"), None);
    }

    #[test]
    fn normalize_words_strips_punctuation() {
        assert_eq!(normalize_words("Hello, World!"), vec!["hello", "world"]);
    }

    #[test]
    fn extract_code_prefers_language_block() {
        let input = "```\nprint('generic')\n```\n\n```python\nprint('tagged')\n```\n";
        assert_eq!(extract_code(input, Language::Python), "print('tagged')");
    }

    #[test]
    fn extract_code_generic_and_raw() {
        assert_eq!(extract_code("```\nx = 1\n```", Language::Python), "x = 1");
        assert_eq!(extract_code("x = 1", Language::Python), "x = 1");
    }

    #[test]
    fn extract_code_truncated_block() {
        let code = extract_code("Here:\n```rust\nfn main() {\n}", Language::Rust);
        assert!(code.contains("fn main"));
    }

    #[test]
    fn extract_code_ignores_other_languages() {
        let input = "```rust\nfn main() {}\n```\n```python\nprint(1)\n```";
        assert_eq!(extract_code(input, Language::Python), "print(1)");
    }
}
