use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{side::Side, KibitzError};

/// Evaluation from White's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Score {
    Centipawns(i32),
    Mate { moves: u32, winner: Side },
}

impl Score {
    /// Re-sign a raw UCI `cp` value reported for `side_to_move`.
    pub fn from_centipawns(raw: i32, side_to_move: Side) -> Self {
        match side_to_move {
            Side::White => Score::Centipawns(raw),
            Side::Black => Score::Centipawns(-raw),
        }
    }

    /// Re-sign a raw UCI `mate` value reported for `side_to_move`.
    /// `mate 0` means the side to move is already mated.
    pub fn from_mate(raw: i32, side_to_move: Side) -> Self {
        let winner = if raw > 0 {
            side_to_move
        } else {
            side_to_move.opponent()
        };
        Score::Mate {
            moves: raw.unsigned_abs(),
            winner,
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Score::Centipawns(cp) => Score::Centipawns(-cp),
            Score::Mate { moves, winner } => Score::Mate {
                moves,
                winner: winner.opponent(),
            },
        }
    }

    pub fn is_mate(&self) -> bool {
        matches!(self, Score::Mate { .. })
    }
}

impl Default for Score {
    fn default() -> Self {
        Score::Centipawns(0)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Centipawns(cp) => {
                let sign = if *cp < 0 { '-' } else { '+' };
                let abs = cp.unsigned_abs();
                write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
            }
            Score::Mate { moves, winner } => {
                let sign = if winner.is_white() { '+' } else { '-' };
                write!(f, "{sign}M{moves}")
            }
        }
    }
}

impl FromStr for Score {
    type Err = KibitzError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let text = raw.trim();
        let (negative, body) = match text.as_bytes().first() {
            Some(b'+') => (false, &text[1..]),
            Some(b'-') => (true, &text[1..]),
            _ => (false, text),
        };

        if let Some(moves) = body.strip_prefix('M').or_else(|| body.strip_prefix('#')) {
            let moves = moves
                .parse::<u32>()
                .map_err(|err| score_error(raw, err))?;
            let winner = if negative { Side::Black } else { Side::White };
            return Ok(Score::Mate { moves, winner });
        }

        let pawns = body.parse::<f64>().map_err(|err| score_error(raw, err))?;
        if !pawns.is_finite() {
            return Err(KibitzError::Archive(format!("score out of range: {raw}")));
        }
        let cp = (pawns * 100.0).round() as i32;
        Ok(Score::Centipawns(if negative { -cp } else { cp }))
    }
}

impl From<Score> for String {
    fn from(score: Score) -> Self {
        score.to_string()
    }
}

impl TryFrom<String> for Score {
    type Error = KibitzError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

fn score_error(raw: &str, err: impl fmt::Display) -> KibitzError {
    KibitzError::Archive(format!("invalid score '{raw}': {err}"))
}

/// One engine's evaluation of one position at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    pub ply: u32,
    pub side: Side,
    pub score: Score,
    pub depth: u32,
    pub selective_depth: Option<u32>,
    pub node_count: Option<u64>,
    pub nodes_per_second: Option<u64>,
    pub hash_fill_permille: Option<u32>,
    pub tablebase_hits: Option<u64>,
    pub time_elapsed_ms: u64,
    pub multipv: u32,
    /// Coordinate moves, starting with the move the analysing side would play next.
    pub principal_variation: Vec<String>,
    pub principal_variation_algebraic: Option<Vec<String>>,
}

/// Origin and destination squares of a coordinate move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arrow {
    pub orig: String,
    pub dest: String,
}

impl Arrow {
    pub fn from_coordinate_move(mv: &str) -> Option<Self> {
        if mv.len() < 4 || !mv.is_char_boundary(4) {
            return None;
        }
        Some(Self {
            orig: mv[0..2].to_string(),
            dest: mv[2..4].to_string(),
        })
    }
}

impl AnalysisSnapshot {
    pub fn best_move(&self) -> Option<&str> {
        self.principal_variation.first().map(String::as_str)
    }

    pub fn best_move_arrow(&self) -> Option<Arrow> {
        self.best_move().and_then(Arrow::from_coordinate_move)
    }

    /// Space-joined PV, the form the archives and overlays carry.
    pub fn pv_line(&self) -> String {
        self.principal_variation.join(" ")
    }
}

/// Render an optional counter the way the overlays do (`-` when absent).
pub fn display_or_dash<T: fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}
