use std::fmt;

use serde::{Deserialize, Serialize};

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Represents the two players in a chess game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opponent(self) -> Self {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    /// Side to move in `fen`. Anything other than an explicit `w` reads as Black.
    pub fn to_move_in(fen: &str) -> Self {
        match fen.split_whitespace().nth(1) {
            Some("w") => Side::White,
            _ => Side::Black,
        }
    }

    pub fn is_white(self) -> bool {
        matches!(self, Side::White)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::White => f.write_str("white"),
            Side::Black => f.write_str("black"),
        }
    }
}

/// Fullmove counter of `fen`; missing, unparseable or zero counters read as 1.
pub fn fullmove_number(fen: &str) -> u32 {
    fen.split_whitespace()
        .last()
        .and_then(|field| field.parse::<u32>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(1)
}

/// Zero-based index of the half-move about to be played from `fen`.
///
/// This is the only ply source on the live path, so the FEN must be the
/// exact position the engine was given.
pub fn ply_from_fen(fen: &str) -> u32 {
    let white_offset = if Side::to_move_in(fen).is_white() { 1 } else { 0 };
    2 * fullmove_number(fen) - white_offset - 1
}
