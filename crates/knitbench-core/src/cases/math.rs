//! Arithmetic word problems, including ones that correct themselves.

use rand::rngs::StdRng;
use rand::Rng;

use super::numeric::NumericGrader;
use super::{Grader, SuiteContext};
use crate::error::GenerationError;
use crate::model::{Answer, CaseKind, Query};

const NAMES: [&str; 8] = [
    "Amara", "Bruno", "Chen", "Dalia", "Emeka", "Farah", "Goran", "Hana",
];

const ANSWER_INSTRUCTION: &str =
    "Show your reasoning if you like, then finish with \"The answer is <number>.\"";

struct Problem {
    text: String,
    answer: f64,
    template: &'static str,
}

fn math_problem(rng: &mut StdRng) -> Problem {
    let name = NAMES[rng.gen_range(0..NAMES.len())];
    match rng.gen_range(0..5) {
        0 => {
            let trays: i64 = rng.gen_range(3..=12);
            let per_tray: i64 = rng.gen_range(6..=24);
            let sold: i64 = rng.gen_range(1..trays * per_tray);
            Problem {
                text: format!(
                    "{name} bakes {trays} trays of cookies with {per_tray} cookies on each tray \
                     and sells {sold} of them. How many cookies are left?"
                ),
                answer: (trays * per_tray - sold) as f64,
                template: "bakery",
            }
        }
        1 => {
            let v: i64 = rng.gen_range(40..=120);
            let h: i64 = rng.gen_range(1..=5);
            let w: i64 = rng.gen_range(40..=120);
            let k: i64 = rng.gen_range(1..=5);
            Problem {
                text: format!(
                    "A train travels at {v} km/h for {h} hours and then at {w} km/h for {k} hours. \
                     How many kilometres does it travel in total?"
                ),
                answer: (v * h + w * k) as f64,
                template: "train",
            }
        }
        2 => {
            let friends: i64 = rng.gen_range(2..=9);
            let pizzas: i64 = rng.gen_range(1..=6);
            Problem {
                text: format!(
                    "{name} and friends, {friends} people in total, share {pizzas} pizzas equally. \
                     Each pizza is cut into 8 slices. How many slices does each person get? \
                     Give an exact fraction or a decimal rounded to at least two places."
                ),
                answer: (pizzas * 8) as f64 / friends as f64,
                template: "pizza",
            }
        }
        3 => {
            let red: i64 = rng.gen_range(1..=20);
            let blue: i64 = rng.gen_range(1..=20);
            Problem {
                text: format!(
                    "A jar holds {red} red marbles and {blue} blue marbles. What fraction of the \
                     marbles are red? Give an exact fraction or a decimal rounded to at least two places."
                ),
                answer: red as f64 / (red + blue) as f64,
                template: "marbles",
            }
        }
        _ => {
            let price: i64 = rng.gen_range(1..=15) * 20;
            let discount: i64 = [10, 20, 25, 50][rng.gen_range(0..4)];
            let tax: i64 = [5, 10][rng.gen_range(0..2)];
            Problem {
                text: format!(
                    "A jacket costs ${price}. It is discounted by {discount}%, and then a {tax}% \
                     sales tax is added to the discounted price. What is the final price in dollars?"
                ),
                answer: price as f64 * (1.0 - discount as f64 / 100.0) * (1.0 + tax as f64 / 100.0),
                template: "discount",
            }
        }
    }
}

pub(crate) fn generate_math(ctx: &SuiteContext) -> Result<Vec<Query>, GenerationError> {
    let kind = CaseKind::MathQa;
    let mut rng = ctx.rng_for(kind);
    let mut out = Vec::with_capacity(ctx.cases_per_kind);

    for i in 0..ctx.cases_per_kind {
        let problem = math_problem(&mut rng);
        if !problem.answer.is_finite() {
            return Err(GenerationError::new(
                kind,
                format!("{} produced a non-finite answer", problem.template),
            ));
        }
        out.push(
            Query::new(
                kind,
                i,
                format!("{}\n\n{ANSWER_INSTRUCTION}", problem.text),
                Answer::Number(problem.answer),
                Grader::Numeric(NumericGrader::real(problem.answer)),
            )
            .with_param("template", problem.template),
        );
    }
    Ok(out)
}

struct Correction {
    text: String,
    answer: i64,
    uncorrected: i64,
    template: &'static str,
}

/// A value in `lo..=hi` different from `original`.
fn corrected_value(rng: &mut StdRng, original: i64, lo: i64, hi: i64) -> i64 {
    let v = rng.gen_range(lo..hi);
    if v >= original {
        v + 1
    } else {
        v
    }
}

fn correction_problem(rng: &mut StdRng) -> Correction {
    let name = NAMES[rng.gen_range(0..NAMES.len())];
    match rng.gen_range(0..3) {
        0 => {
            let monday: i64 = rng.gen_range(5..=30);
            let tuesday: i64 = rng.gen_range(5..=30);
            let per_box: i64 = rng.gen_range(4..=24);
            let actual = corrected_value(rng, monday, 5, 30);
            Correction {
                text: format!(
                    "A warehouse receives {monday} boxes on Monday and {tuesday} boxes on Tuesday. \
                     Each box holds {per_box} items. The Monday delivery was later recounted and \
                     it was actually {actual} boxes, not {monday}. How many items arrived in total?"
                ),
                answer: (actual + tuesday) * per_box,
                uncorrected: (monday + tuesday) * per_box,
                template: "warehouse",
            }
        }
        1 => {
            let pages: i64 = rng.gen_range(10..=60);
            let days: i64 = rng.gen_range(3..=14);
            let actual = corrected_value(rng, pages, 10, 60);
            Correction {
                text: format!(
                    "{name} reads {pages} pages every day for {days} days. Looking back at a \
                     reading log, {name} realises the daily amount was misremembered: it was \
                     really {actual} pages per day. How many pages did {name} read in total?"
                ),
                answer: actual * days,
                uncorrected: pages * days,
                template: "reading",
            }
        }
        _ => {
            let width: i64 = rng.gen_range(5..=40);
            let length: i64 = rng.gen_range(10..=80);
            let actual = corrected_value(rng, width, 5, 40);
            Correction {
                text: format!(
                    "A field is {width} m wide and {length} m long. The surveyor's note at the \
                     bottom of the report says the width was written down wrong and is really \
                     {actual} m. What is the area of the field in square metres?"
                ),
                answer: actual * length,
                uncorrected: width * length,
                template: "field",
            }
        }
    }
}

pub(crate) fn generate_implicit_correction(
    ctx: &SuiteContext,
) -> Result<Vec<Query>, GenerationError> {
    let kind = CaseKind::ImplicitCorrectionMath;
    let mut rng = ctx.rng_for(kind);
    let mut out = Vec::with_capacity(ctx.cases_per_kind);

    for i in 0..ctx.cases_per_kind {
        let problem = correction_problem(&mut rng);
        if problem.answer == problem.uncorrected {
            return Err(GenerationError::new(
                kind,
                format!("{} correction did not change the answer", problem.template),
            ));
        }
        let grader = NumericGrader::real(problem.answer as f64)
            .with_decoy(problem.uncorrected as f64, "used the figure before the correction");
        out.push(
            Query::new(
                kind,
                i,
                format!("{}\n\n{ANSWER_INSTRUCTION}", problem.text),
                Answer::Number(problem.answer as f64),
                Grader::Numeric(grader),
            )
            .with_param("template", problem.template)
            .with_param("uncorrected_answer", problem.uncorrected),
        );
    }
    Ok(out)
}
