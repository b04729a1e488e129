//! Thin adapter over the `shakmaty` rules engine: FEN loading and PV replay
//! between coordinate (UCI) and algebraic (SAN) notation.

use shakmaty::{
    fen::Fen,
    san::{San, SanPlus},
    uci::UciMove,
    CastlingMode, Chess, EnPassantMode, Position,
};

use crate::{KibitzError, Result};

fn load(fen: &str) -> Result<(Chess, CastlingMode)> {
    let parsed: Fen = fen
        .trim()
        .parse()
        .map_err(|err| notation_error(format!("invalid FEN '{fen}': {err}")))?;
    match parsed.clone().into_position::<Chess>(CastlingMode::Standard) {
        Ok(pos) => Ok((pos, CastlingMode::Standard)),
        Err(_) => parsed
            .into_position::<Chess>(CastlingMode::Chess960)
            .map(|pos| (pos, CastlingMode::Chess960))
            .map_err(|err| notation_error(format!("illegal position '{fen}': {err}"))),
    }
}

pub fn load_position(fen: &str) -> Result<Chess> {
    load(fen).map(|(pos, _)| pos)
}

pub fn position_fen(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

/// Replay coordinate moves from `fen` and render them in SAN.
///
/// `None` when the FEN does not load; otherwise the longest legal prefix.
pub fn uci_to_san(fen: &str, moves: &[String]) -> Option<Vec<String>> {
    let (mut pos, _) = load(fen).ok()?;
    let mut out = Vec::with_capacity(moves.len());
    for token in moves {
        let Ok(uci) = token.parse::<UciMove>() else {
            break;
        };
        let Ok(mv) = uci.to_move(&pos) else {
            break;
        };
        out.push(San::from_move(&pos, mv.clone()).to_string());
        pos.play_unchecked(mv);
    }
    Some(out)
}

/// Replay algebraic moves from `fen` and render them as coordinate moves.
///
/// Move-number tokens (`12.`, `12...`) are skipped. `None` when the FEN does
/// not load; otherwise the longest legal prefix.
pub fn san_to_uci(fen: &str, moves: &[String]) -> Option<Vec<String>> {
    let (mut pos, mode) = load(fen).ok()?;
    let mut out = Vec::with_capacity(moves.len());
    for token in moves.iter().filter(|t| !is_move_number(t)) {
        let Ok(san) = token.parse::<SanPlus>() else {
            break;
        };
        let Ok(mv) = san.san.to_move(&pos) else {
            break;
        };
        out.push(mv.clone().to_uci(mode).to_string());
        pos.play_unchecked(mv);
    }
    Some(out)
}

/// FEN of the position reached by playing `uci_move` from `fen`.
pub fn fen_after(fen: &str, uci_move: &str) -> Result<String> {
    let (mut pos, _) = load(fen)?;
    let uci: UciMove = uci_move
        .parse()
        .map_err(|err| notation_error(format!("invalid move '{uci_move}': {err}")))?;
    let mv = uci
        .to_move(&pos)
        .map_err(|err| notation_error(format!("illegal move '{uci_move}': {err}")))?;
    pos.play_unchecked(mv);
    Ok(position_fen(&pos))
}

fn is_move_number(token: &str) -> bool {
    let digits = token.trim_end_matches('.');
    digits.len() < token.len() && digits.chars().all(|c| c.is_ascii_digit())
}

pub fn notation_error(message: impl Into<String>) -> KibitzError {
    KibitzError::Notation(message.into())
}
