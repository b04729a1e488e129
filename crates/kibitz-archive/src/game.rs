use std::collections::BTreeMap;

use kibitz_types::side::{ply_from_fen, Side, STANDARD_START_FEN};
use serde::{Deserialize, Serialize};

/// One played move with the position it produced and its annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedMove {
    pub san: String,
    /// `None` once the movetext could no longer be replayed.
    pub fen_after: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedGame {
    pub headers: BTreeMap<String, String>,
    pub initial_fen: String,
    pub moves: Vec<ArchivedMove>,
}

impl ArchivedGame {
    pub fn new(initial_fen: impl Into<String>) -> Self {
        Self {
            headers: BTreeMap::new(),
            initial_fen: initial_fen.into(),
            moves: Vec::new(),
        }
    }

    pub fn standard() -> Self {
        Self::new(STANDARD_START_FEN)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Stored position before move `index`.
    pub fn fen_before(&self, index: usize) -> Option<&str> {
        match index {
            0 => Some(self.initial_fen.as_str()),
            _ => self.moves.get(index - 1)?.fen_after.as_deref(),
        }
    }

    pub fn ply_of(&self, index: usize) -> u32 {
        ply_from_fen(&self.initial_fen) + index as u32
    }

    pub fn mover_of(&self, index: usize) -> Side {
        let first = Side::to_move_in(&self.initial_fen);
        if index % 2 == 0 {
            first
        } else {
            first.opponent()
        }
    }
}
