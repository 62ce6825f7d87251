//! Sudoku completion graded by grid validity rather than a fixed solution.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use super::{Grader, SuiteContext};
use crate::error::GenerationError;
use crate::model::{Answer, CaseKind, Query};
use crate::results::VerificationResult;

/// A solved grid produced by permuting a base pattern.
fn solved_grid(rng: &mut StdRng) -> Vec<u8> {
    let mut digits: Vec<u8> = (1..=9).collect();
    digits.shuffle(rng);

    let mut rows = Vec::with_capacity(9);
    let mut bands = [0usize, 1, 2];
    bands.shuffle(rng);
    for band in bands {
        let mut within = [0usize, 1, 2];
        within.shuffle(rng);
        rows.extend(within.iter().map(|r| band * 3 + r));
    }
    let mut cols = Vec::with_capacity(9);
    let mut stacks = [0usize, 1, 2];
    stacks.shuffle(rng);
    for stack in stacks {
        let mut within = [0usize, 1, 2];
        within.shuffle(rng);
        cols.extend(within.iter().map(|c| stack * 3 + c));
    }

    let mut grid = Vec::with_capacity(81);
    for &r in &rows {
        for &c in &cols {
            let base = (r * 3 + r / 3 + c) % 9;
            grid.push(digits[base]);
        }
    }
    grid
}

/// Render a puzzle with `.` for blanks.
fn render_puzzle(cells: &[u8]) -> String {
    cells
        .chunks(9)
        .map(|row| {
            row.iter()
                .map(|&d| if d == 0 { ".".to_string() } else { d.to_string() })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pull a 9x9 grid out of free-form text.
///
/// Prefers the last nine lines that each hold exactly nine digits; falls
/// back to the last run of 81 digits.
pub fn parse_grid(text: &str) -> Option<Vec<u8>> {
    let rows: Vec<Vec<u8>> = text
        .lines()
        .filter_map(|line| {
            let line = match line.split_once(':') {
                Some((_, rest)) => rest,
                None => line,
            };
            if line.chars().any(|c| c.is_alphabetic()) {
                return None;
            }
            let digits: Vec<u8> = line
                .chars()
                .filter_map(|c| c.to_digit(10))
                .map(|d| d as u8)
                .collect();
            (digits.len() == 9).then_some(digits)
        })
        .collect();
    if rows.len() >= 9 {
        return Some(rows[rows.len() - 9..].concat());
    }

    let digits: Vec<u8> = text
        .chars()
        .filter_map(|c| c.to_digit(10))
        .map(|d| d as u8)
        .collect();
    (digits.len() >= 81).then(|| digits[digits.len() - 81..].to_vec())
}

fn check_unit(cells: &[u8], name: &str) -> Option<String> {
    let mut seen = [false; 10];
    for &d in cells {
        if d == 0 || d > 9 {
            return Some(format!("{name} contains an invalid digit {d}"));
        }
        if seen[d as usize] {
            return Some(format!("{name} repeats {d}"));
        }
        seen[d as usize] = true;
    }
    None
}

/// Accepts any valid completion that keeps the givens.
#[derive(Debug, Clone)]
pub struct SudokuGrader {
    givens: Vec<u8>,
}

impl SudokuGrader {
    pub fn new(givens: Vec<u8>) -> Self {
        Self { givens }
    }

    pub fn grade(&self, candidate: &str) -> VerificationResult {
        let Some(grid) = parse_grid(candidate) else {
            return VerificationResult::fail("no 9x9 grid found in answer");
        };

        for (i, (&given, &cell)) in self.givens.iter().zip(&grid).enumerate() {
            if given != 0 && given != cell {
                return VerificationResult::fail(format!(
                    "cell r{}c{} changes given {given} to {cell}",
                    i / 9 + 1,
                    i % 9 + 1
                ));
            }
        }

        for r in 0..9 {
            if let Some(err) = check_unit(&grid[r * 9..r * 9 + 9], &format!("row {}", r + 1)) {
                return VerificationResult::fail(err);
            }
        }
        for c in 0..9 {
            let col: Vec<u8> = (0..9).map(|r| grid[r * 9 + c]).collect();
            if let Some(err) = check_unit(&col, &format!("column {}", c + 1)) {
                return VerificationResult::fail(err);
            }
        }
        for b in 0..9 {
            let (br, bc) = (b / 3 * 3, b % 3 * 3);
            let cells: Vec<u8> = (0..9).map(|i| grid[(br + i / 3) * 9 + bc + i % 3]).collect();
            if let Some(err) = check_unit(&cells, &format!("box {}", b + 1)) {
                return VerificationResult::fail(err);
            }
        }
        VerificationResult::pass()
    }
}

pub(crate) fn generate(ctx: &SuiteContext) -> Result<Vec<Query>, GenerationError> {
    let kind = CaseKind::SudokuValidation;
    let mut rng = ctx.rng_for(kind);
    let mut out = Vec::with_capacity(ctx.cases_per_kind);

    for i in 0..ctx.cases_per_kind {
        let solution = solved_grid(&mut rng);
        let blanks = rng.gen_range(30..=45);
        let mut positions: Vec<usize> = (0..81).collect();
        positions.shuffle(&mut rng);
        let mut puzzle = solution.clone();
        for &p in &positions[..blanks] {
            puzzle[p] = 0;
        }

        let question = format!(
            "Complete this sudoku. Blank cells are shown as '.'. Every row, column and 3x3 box \
             must contain the digits 1-9 exactly once, and the given digits must not change. \
             Reply with the completed grid as nine lines of nine space-separated digits.\n\n{}",
            render_puzzle(&puzzle)
        );
        out.push(
            Query::new(
                kind,
                i,
                question,
                Answer::Grid(solution),
                Grader::Sudoku(SudokuGrader::new(puzzle)),
            )
            .with_param("blanks", blanks),
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::QuestionBank;
    use rand::SeedableRng;

    fn grid_text(cells: &[u8]) -> String {
        Answer::Grid(cells.to_vec()).to_string()
    }

    #[test]
    fn solved_grids_are_valid() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            let grid = solved_grid(&mut rng);
            let grader = SudokuGrader::new(vec![0; 81]);
            assert!(grader.grade(&grid_text(&grid)).correct);
        }
    }

    #[test]
    fn swapped_cells_fail() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut grid = solved_grid(&mut rng);
        // Swapping two cells of a column keeps the column valid but breaks both rows.
        grid.swap(0, 9);
        let result = SudokuGrader::new(vec![0; 81]).grade(&grid_text(&grid));
        assert!(!result.correct);
        assert!(result.diagnostic.unwrap().contains("row"));
    }

    #[test]
    fn changed_given_fails() {
        let mut rng = StdRng::seed_from_u64(3);
        let grid = solved_grid(&mut rng);
        let mut givens = vec![0; 81];
        givens[40] = if grid[40] == 9 { 1 } else { grid[40] + 1 };
        let result = SudokuGrader::new(givens).grade(&grid_text(&grid));
        assert!(result.diagnostic.unwrap().contains("r5c5"));
    }

    #[test]
    fn parse_grid_accepts_labelled_rows_and_runs() {
        let mut rng = StdRng::seed_from_u64(4);
        let grid = solved_grid(&mut rng);
        let labelled: String = grid
            .chunks(9)
            .enumerate()
            .map(|(i, row)| {
                let digits: Vec<String> = row.iter().map(|d| d.to_string()).collect();
                format!("Row {}: {}\n", i + 1, digits.join(" | "))
            })
            .collect();
        assert_eq!(parse_grid(&format!("Here is the grid:\n{labelled}")), Some(grid.clone()));

        let run: String = grid.iter().map(|d| d.to_string()).collect();
        assert_eq!(parse_grid(&run), Some(grid));
        assert_eq!(parse_grid("1 2 3"), None);
    }

    #[test]
    fn puzzles_keep_blanks_within_range() {
        let ctx = SuiteContext::new(QuestionBank::default())
            .with_seed(9)
            .with_cases_per_kind(5);
        for q in generate(&ctx).unwrap() {
            let blanks: usize = q.params["blanks"].parse().unwrap();
            assert!((30..=45).contains(&blanks));
            let (_, grid) = q.question.rsplit_once("\n\n").unwrap();
            assert_eq!(grid.matches('.').count(), blanks);
        }
    }
}
