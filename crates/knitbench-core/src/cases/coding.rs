//! Stdin/stdout programming problems graded by running held-out tests.

use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;

use super::{Grader, SuiteContext};
use crate::error::GenerationError;
use crate::extract::extract_code;
use crate::model::{Answer, CaseKind, IoPair, Language, Query};
use crate::results::VerificationResult;
use crate::traits::{CodeRunner, ExecBatch, ExecStatus};

/// Held-out tests per question.
const HELD_OUT_TESTS: usize = 5;

const WORDS: [&str; 16] = [
    "amber", "breeze", "canyon", "dune", "ember", "fjord", "grove", "harbor", "island", "jungle",
    "kelp", "lagoon", "meadow", "orchid", "quarry", "Umbra",
];

struct Problem {
    id: &'static str,
    statement: &'static str,
    solve: fn(&str) -> String,
    input: fn(&mut StdRng) -> String,
}

const PROBLEMS: [Problem; 6] = [
    Problem {
        id: "sum-of-list",
        statement: "The first line of input holds an integer n. The second line holds n \
                    space-separated integers. Print their sum.",
        solve: solve_sum,
        input: list_input,
    },
    Problem {
        id: "reverse-words",
        statement: "The input is a single line of words separated by single spaces. Print the \
                    words in reverse order, separated by single spaces.",
        solve: solve_reverse_words,
        input: words_input,
    },
    Problem {
        id: "count-vowels",
        statement: "The input is a single line of text. Print how many of its characters are \
                    vowels (a, e, i, o, u, in either case).",
        solve: solve_count_vowels,
        input: words_input,
    },
    Problem {
        id: "max-subarray",
        statement: "The first line of input holds an integer n. The second line holds n \
                    space-separated integers. Print the largest sum of a non-empty run of \
                    consecutive elements.",
        solve: solve_max_subarray,
        input: list_input,
    },
    Problem {
        id: "fizzbuzz-n",
        statement: "The input is a single integer n. For each i from 1 to n print one line: \
                    FizzBuzz if i is divisible by 15, Fizz if divisible by 3, Buzz if divisible \
                    by 5, otherwise i itself.",
        solve: solve_fizzbuzz,
        input: number_input,
    },
    Problem {
        id: "second-largest-distinct",
        statement: "The first line of input holds an integer n. The second line holds n \
                    space-separated integers. Print the second largest distinct value, or NONE \
                    if there are fewer than two distinct values.",
        solve: solve_second_largest,
        input: list_input,
    },
];

fn ints(line: &str) -> Vec<i64> {
    line.split_whitespace()
        .filter_map(|t| t.parse().ok())
        .collect()
}

fn list_values(input: &str) -> Vec<i64> {
    input.lines().nth(1).map(ints).unwrap_or_default()
}

fn solve_sum(input: &str) -> String {
    list_values(input).iter().sum::<i64>().to_string()
}

fn solve_reverse_words(input: &str) -> String {
    let mut words: Vec<&str> = input.split_whitespace().collect();
    words.reverse();
    words.join(" ")
}

fn solve_count_vowels(input: &str) -> String {
    input
        .chars()
        .filter(|c| matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u'))
        .count()
        .to_string()
}

fn solve_max_subarray(input: &str) -> String {
    let values = list_values(input);
    let mut best = i64::MIN;
    let mut current = 0i64;
    for v in values {
        current = v.max(current + v);
        best = best.max(current);
    }
    best.to_string()
}

fn solve_fizzbuzz(input: &str) -> String {
    let n = ints(input).first().copied().unwrap_or(0);
    (1..=n)
        .map(|i| match (i % 3, i % 5) {
            (0, 0) => "FizzBuzz".to_string(),
            (0, _) => "Fizz".to_string(),
            (_, 0) => "Buzz".to_string(),
            _ => i.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn solve_second_largest(input: &str) -> String {
    let mut values = list_values(input);
    values.sort_unstable_by(|a, b| b.cmp(a));
    values.dedup();
    values
        .get(1)
        .map(|v| v.to_string())
        .unwrap_or_else(|| "NONE".to_string())
}

fn list_input(rng: &mut StdRng) -> String {
    let n = rng.gen_range(1..=12);
    let values: Vec<String> = (0..n)
        .map(|_| rng.gen_range(-50i64..=50).to_string())
        .collect();
    format!("{n}\n{}", values.join(" "))
}

fn words_input(rng: &mut StdRng) -> String {
    let n = rng.gen_range(2..=8);
    (0..n)
        .map(|_| WORDS[rng.gen_range(0..WORDS.len())])
        .collect::<Vec<_>>()
        .join(" ")
}

fn number_input(rng: &mut StdRng) -> String {
    rng.gen_range(1..=30).to_string()
}

/// Trailing whitespace per line and trailing blank lines are not significant.
fn normalize_output(s: &str) -> String {
    s.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end()
        .to_string()
}

/// Runs a candidate program against held-out tests.
#[derive(Clone)]
pub struct ProgramGrader {
    tests: Vec<IoPair>,
    language: Language,
    timeout_ms: u64,
    runner: Arc<dyn CodeRunner>,
}

impl fmt::Debug for ProgramGrader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramGrader")
            .field("tests", &self.tests.len())
            .field("language", &self.language)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl ProgramGrader {
    pub fn new(
        tests: Vec<IoPair>,
        language: Language,
        timeout_ms: u64,
        runner: Arc<dyn CodeRunner>,
    ) -> Self {
        Self {
            tests,
            language,
            timeout_ms,
            runner,
        }
    }

    /// Score is the fraction of held-out tests passed. A compile failure
    /// fails every test.
    pub async fn grade(&self, candidate: &str) -> VerificationResult {
        let code = extract_code(candidate, self.language);
        if code.trim().is_empty() {
            return VerificationResult::fail("no code in answer");
        }

        let total = self.tests.len();
        let batch = ExecBatch {
            code,
            language: self.language,
            stdins: self.tests.iter().map(|t| t.input.clone()).collect(),
            timeout_ms: self.timeout_ms,
        };
        let outcomes = match self.runner.execute_batch(&batch).await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                tracing::warn!(error = %e, "code runner failed");
                return VerificationResult::fail(format!("code runner failed: {e:#}"));
            }
        };

        let mut passed = 0;
        let mut first_failure: Option<String> = None;
        for (i, (test, outcome)) in self.tests.iter().zip(&outcomes).enumerate() {
            let failure = match &outcome.status {
                ExecStatus::CompileFailed => {
                    let first = outcome.stderr.lines().next().unwrap_or("").trim();
                    return VerificationResult::fail(format!("compilation failed: {first}"));
                }
                ExecStatus::TimedOut => Some(format!("test {} timed out", i + 1)),
                ExecStatus::Completed { exit_code } if !outcome.succeeded() => Some(match exit_code {
                    Some(status) => format!("test {} exited with status {status}", i + 1),
                    None => format!("test {} was killed by a signal", i + 1),
                }),
                ExecStatus::Completed { .. } => {
                    if normalize_output(&outcome.stdout) == normalize_output(&test.output) {
                        None
                    } else {
                        Some(format!("test {} printed the wrong output", i + 1))
                    }
                }
            };
            match failure {
                None => passed += 1,
                Some(msg) => {
                    first_failure.get_or_insert(msg);
                }
            }
        }
        if outcomes.len() < total {
            first_failure.get_or_insert(format!(
                "runner returned {} outcomes for {total} tests",
                outcomes.len()
            ));
        }

        if total == 0 {
            return VerificationResult::fail("question has no held-out tests");
        }
        let summary = format!("{passed}/{total} held-out tests passed");
        let diagnostic = match first_failure {
            Some(msg) => format!("{summary}; first failure: {msg}"),
            None => summary,
        };
        VerificationResult::partial(passed as f64 / total as f64, diagnostic)
    }
}

pub(crate) fn generate(ctx: &SuiteContext) -> Result<Vec<Query>, GenerationError> {
    let kind = CaseKind::CodingQa;
    let mut rng = ctx.rng_for(kind);
    let mut out = Vec::with_capacity(ctx.cases_per_kind);

    for i in 0..ctx.cases_per_kind {
        let problem = &PROBLEMS[rng.gen_range(0..PROBLEMS.len())];
        let example_input = (problem.input)(&mut rng);
        let example_output = (problem.solve)(&example_input);
        let tests: Vec<IoPair> = (0..HELD_OUT_TESTS)
            .map(|_| {
                let input = (problem.input)(&mut rng);
                let output = (problem.solve)(&input);
                IoPair { input, output }
            })
            .collect();

        let question = format!(
            "Write a complete {lang} program that reads from standard input and writes to \
             standard output.\n\n{}\n\nExample input:\n```\n{example_input}\n```\nExample \
             output:\n```\n{example_output}\n```\n\nReply with the program in a single \
             ```{lang} code block.",
            problem.statement,
            lang = ctx.code_language,
        );
        let grader = ProgramGrader::new(
            tests.clone(),
            ctx.code_language,
            ctx.code_timeout_ms,
            Arc::clone(&ctx.runner),
        );
        out.push(
            Query::new(
                kind,
                i,
                question,
                Answer::Program { tests },
                Grader::Program(grader),
            )
            .with_param("problem", problem.id)
            .with_param("language", ctx.code_language),
        );
    }
    Ok(out)
}
