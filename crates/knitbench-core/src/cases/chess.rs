//! Board-state memory: track pieces through a list of relocations.
//!
//! Moves are not checked for chess legality; the question only tests
//! whether the model can keep an accurate picture of the board.

use std::fmt;
use std::sync::OnceLock;

use rand::rngs::StdRng;
use rand::Rng;
use regex::Regex;

use super::{Grader, SuiteContext};
use crate::error::GenerationError;
use crate::model::{Answer, CaseKind, Query};
use crate::results::VerificationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    White,
    Black,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceKind {
    King,
    Queen,
    Rook,
    Bishop,
    Knight,
    Pawn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    pub color: Color,
    pub kind: PieceKind,
}

impl fmt::Display for Piece {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let color = match self.color {
            Color::White => "white",
            Color::Black => "black",
        };
        let kind = match self.kind {
            PieceKind::King => "king",
            PieceKind::Queen => "queen",
            PieceKind::Rook => "rook",
            PieceKind::Bishop => "bishop",
            PieceKind::Knight => "knight",
            PieceKind::Pawn => "pawn",
        };
        write!(f, "{color} {kind}")
    }
}

/// Algebraic name of square index `0..64` (a1 = 0, h8 = 63).
pub fn square_name(sq: usize) -> String {
    format!("{}{}", (b'a' + (sq % 8) as u8) as char, sq / 8 + 1)
}

fn back_rank(sq: usize) -> bool {
    sq < 8 || sq >= 56
}

type Board = [Option<Piece>; 64];

fn free_square(rng: &mut StdRng, board: &Board, pawn: bool) -> usize {
    loop {
        let sq = rng.gen_range(0..64);
        if board[sq].is_none() && !(pawn && back_rank(sq)) {
            return sq;
        }
    }
}

fn random_piece(rng: &mut StdRng) -> Piece {
    const KINDS: [PieceKind; 5] = [
        PieceKind::Queen,
        PieceKind::Rook,
        PieceKind::Bishop,
        PieceKind::Knight,
        PieceKind::Pawn,
    ];
    Piece {
        color: if rng.gen_bool(0.5) {
            Color::White
        } else {
            Color::Black
        },
        kind: KINDS[rng.gen_range(0..KINDS.len())],
    }
}

struct Relocation {
    piece: Piece,
    from: usize,
    to: usize,
    captured: Option<Piece>,
}

impl fmt::Display for Relocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "The {} on {} moves to {}",
            self.piece,
            square_name(self.from),
            square_name(self.to)
        )?;
        if let Some(captured) = self.captured {
            write!(f, ", capturing the {captured}")?;
        }
        f.write_str(".")
    }
}

fn relocate(rng: &mut StdRng, board: &mut Board) -> Option<Relocation> {
    let occupied: Vec<usize> = (0..64).filter(|&s| board[s].is_some()).collect();
    let from = occupied[rng.gen_range(0..occupied.len())];
    let piece = board[from]?;
    let targets: Vec<usize> = (0..64)
        .filter(|&s| s != from)
        .filter(|&s| !board[s].is_some_and(|p| p.kind == PieceKind::King))
        .filter(|&s| !(piece.kind == PieceKind::Pawn && back_rank(s)))
        .collect();
    if targets.is_empty() {
        return None;
    }
    let to = targets[rng.gen_range(0..targets.len())];
    let captured = board[to].take();
    board[to] = board[from].take();
    Some(Relocation {
        piece,
        from,
        to,
        captured,
    })
}

fn board_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:(white|black)\s+(king|queen|rook|bishop|knight|pawn)s?|(empty|nothing|no piece|unoccupied|vacant))\b",
        )
        .expect("board pattern is valid")
    })
}

/// Grades the occupant of one square. The last piece or emptiness
/// mention in the candidate is taken as its answer.
#[derive(Debug, Clone)]
pub struct BoardGrader {
    expected: Option<Piece>,
}

impl BoardGrader {
    pub fn new(expected: Option<Piece>) -> Self {
        Self { expected }
    }

    fn expected_text(&self) -> String {
        self.expected
            .map(|p| p.to_string())
            .unwrap_or_else(|| "empty".to_string())
    }

    pub fn grade(&self, candidate: &str) -> VerificationResult {
        let Some(caps) = board_re().captures_iter(candidate).last() else {
            return VerificationResult::fail("answer names no piece and does not say empty");
        };
        let answer = if caps.get(3).is_some() {
            "empty".to_string()
        } else {
            format!("{} {}", caps[1].to_lowercase(), caps[2].to_lowercase())
        };
        let expected = self.expected_text();
        if answer == expected {
            VerificationResult::pass()
        } else {
            VerificationResult::fail(format!("expected {expected}, answer says {answer}"))
        }
    }
}

pub(crate) fn generate(ctx: &SuiteContext) -> Result<Vec<Query>, GenerationError> {
    let kind = CaseKind::ChessMemory;
    let mut rng = ctx.rng_for(kind);
    let mut out = Vec::with_capacity(ctx.cases_per_kind);

    for i in 0..ctx.cases_per_kind {
        let mut board: Board = [None; 64];
        for color in [Color::White, Color::Black] {
            let sq = free_square(&mut rng, &board, false);
            board[sq] = Some(Piece {
                color,
                kind: PieceKind::King,
            });
        }
        for _ in 0..rng.gen_range(4..=8) {
            let piece = random_piece(&mut rng);
            let sq = free_square(&mut rng, &board, piece.kind == PieceKind::Pawn);
            board[sq] = Some(piece);
        }

        let setup: Vec<String> = (0..64)
            .filter_map(|s| board[s].map(|p| format!("{p} on {}", square_name(s))))
            .collect();

        let moves = rng.gen_range(4..=10);
        let mut lines = Vec::with_capacity(moves);
        for n in 1..=moves {
            let relocation = relocate(&mut rng, &mut board).ok_or_else(|| {
                GenerationError::new(kind, "no legal destination for a relocation")
            })?;
            lines.push(format!("{n}. {relocation}"));
        }

        let empty: Vec<usize> = (0..64).filter(|&s| board[s].is_none()).collect();
        let occupied: Vec<usize> = (0..64).filter(|&s| board[s].is_some()).collect();
        let target = if rng.gen_bool(0.3) {
            empty[rng.gen_range(0..empty.len())]
        } else {
            occupied[rng.gen_range(0..occupied.len())]
        };
        let occupant = board[target];
        let expected = occupant
            .map(|p| p.to_string())
            .unwrap_or_else(|| "empty".to_string());

        let question = format!(
            "Pieces are placed on a chessboard as follows: {}.\n\nThen these moves happen in \
             order (moves need not follow the rules of chess):\n{}\n\nAfter all of the moves, \
             what is on square {}? Answer with the colour and piece, for example \"black \
             rook\", or say \"empty\".",
            setup.join(", "),
            lines.join("\n"),
            square_name(target)
        );
        out.push(
            Query::new(
                kind,
                i,
                question,
                Answer::Text(expected),
                Grader::Board(BoardGrader::new(occupant)),
            )
            .with_param("square", square_name(target))
            .with_param("moves", moves),
        );
    }
    Ok(out)
}
