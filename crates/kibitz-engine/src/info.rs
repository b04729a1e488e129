//! UCI output line parsing.

use kibitz_types::{
    notation,
    side::{ply_from_fen, Side},
    AnalysisSnapshot, Score,
};
use tracing::trace;

/// Classification of one line of engine output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineLine {
    IdName(String),
    BestMove {
        mv: String,
        ponder: Option<String>,
    },
    UciOk,
    ReadyOk,
    Info,
    Other,
}

pub fn parse_engine_line(line: &str) -> EngineLine {
    let mut tokens = line.split_whitespace();
    match tokens.next() {
        Some("id") => match tokens.next() {
            Some("name") => EngineLine::IdName(tokens.collect::<Vec<_>>().join(" ")),
            _ => EngineLine::Other,
        },
        Some("bestmove") => {
            let mv = tokens.next().unwrap_or("(none)").to_string();
            let ponder = match tokens.next() {
                Some("ponder") => tokens.next().map(String::from),
                _ => None,
            };
            EngineLine::BestMove { mv, ponder }
        }
        Some("uciok") => EngineLine::UciOk,
        Some("readyok") => EngineLine::ReadyOk,
        Some("info") => EngineLine::Info,
        _ => EngineLine::Other,
    }
}

fn value_after<'a>(tokens: &[&'a str], key: &str) -> Option<&'a str> {
    tokens
        .iter()
        .position(|t| *t == key)
        .and_then(|idx| tokens.get(idx + 1).copied())
}

fn number_after<T: std::str::FromStr>(tokens: &[&str], key: &str) -> Option<T> {
    value_after(tokens, key).and_then(|v| v.parse().ok())
}

fn parse_score(tokens: &[&str], side: Side) -> Score {
    let idx = match tokens.iter().position(|t| *t == "score") {
        Some(idx) => idx,
        None => return Score::default(),
    };
    let raw = tokens.get(idx + 2).and_then(|v| v.parse::<i32>().ok());
    match (tokens.get(idx + 1).copied(), raw) {
        (Some("cp"), Some(cp)) => Score::from_centipawns(cp, side),
        (Some("mate"), Some(mate)) => Score::from_mate(mate, side),
        _ => Score::default(),
    }
}

/// Parse a depth report produced while searching `fen`.
///
/// Returns `None` for anything that is not a finished depth report:
/// non-info lines, `currmove` progress lines, lines without a numeric
/// `depth`, and lines whose `time` is missing or unparseable.
pub fn parse_info_line(line: &str, fen: &str) -> Option<AnalysisSnapshot> {
    let mut tokens: Vec<&str> = line.split_whitespace().collect();
    if let Some(cut) = tokens.iter().position(|t| *t == "string") {
        tokens.truncate(cut);
    }
    if tokens.first() != Some(&"info") || tokens.contains(&"currmove") {
        return None;
    }

    let pv_at = tokens.iter().position(|t| *t == "pv");
    let (fields, pv_tokens) = match pv_at {
        Some(idx) => (&tokens[..idx], &tokens[idx + 1..]),
        None => (&tokens[..], &tokens[tokens.len()..]),
    };

    let depth = number_after::<u32>(fields, "depth")?;
    let Some(time_elapsed_ms) = number_after::<f64>(fields, "time").filter(|t| t.is_finite())
    else {
        trace!(line, "info line without time");
        return None;
    };

    let side = Side::to_move_in(fen);
    let principal_variation: Vec<String> = pv_tokens.iter().map(|m| m.to_string()).collect();
    let principal_variation_algebraic = notation::uci_to_san(fen, &principal_variation);

    Some(AnalysisSnapshot {
        ply: ply_from_fen(fen),
        side,
        score: parse_score(fields, side),
        depth,
        selective_depth: number_after(fields, "seldepth"),
        node_count: number_after(fields, "nodes"),
        nodes_per_second: number_after(fields, "nps"),
        hash_fill_permille: number_after(fields, "hashfull"),
        tablebase_hits: number_after(fields, "tbhits"),
        time_elapsed_ms: time_elapsed_ms.max(0.0) as u64,
        multipv: number_after(fields, "multipv").unwrap_or(1),
        principal_variation,
        principal_variation_algebraic,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kibitz_types::side::STANDARD_START_FEN;

    const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";

    #[test]
    fn full_depth_report() {
        let line = "info depth 24 seldepth 33 multipv 1 score cp 31 nodes 2400000 nps 1200000 \
                    hashfull 412 tbhits 7 time 2000 pv e2e4 e7e5 g1f3";
        let snap = parse_info_line(line, STANDARD_START_FEN).expect("snapshot");
        assert_eq!(snap.ply, 0);
        assert_eq!(snap.side, Side::White);
        assert_eq!(snap.score.to_string(), "+0.31");
        assert_eq!(snap.depth, 24);
        assert_eq!(snap.selective_depth, Some(33));
        assert_eq!(snap.node_count, Some(2_400_000));
        assert_eq!(snap.nodes_per_second, Some(1_200_000));
        assert_eq!(snap.hash_fill_permille, Some(412));
        assert_eq!(snap.tablebase_hits, Some(7));
        assert_eq!(snap.time_elapsed_ms, 2000);
        assert_eq!(snap.principal_variation, vec!["e2e4", "e7e5", "g1f3"]);
        assert_eq!(
            snap.principal_variation_algebraic,
            Some(vec!["e4".to_string(), "e5".into(), "Nf3".into()])
        );
    }

    #[test]
    fn score_is_resigned_to_white_view() {
        let line = "info depth 10 score cp 150 time 10 pv e7e5";
        assert_eq!(
            parse_info_line(line, AFTER_E4).unwrap().score.to_string(),
            "-1.50"
        );
        assert_eq!(
            parse_info_line(line, STANDARD_START_FEN)
                .unwrap()
                .score
                .to_string(),
            "+1.50"
        );
        let mate = "info depth 30 score mate 4 time 10 pv e7e5";
        assert_eq!(parse_info_line(mate, AFTER_E4).unwrap().score.to_string(), "-M4");
    }

    #[test]
    fn ply_depends_only_on_fen() {
        let a = parse_info_line("info depth 5 score cp 3 time 1 pv e7e5", AFTER_E4).unwrap();
        let b = parse_info_line(
            "info depth 19 seldepth 22 score mate -2 nodes 9 time 700 pv c7c5 g1f3",
            AFTER_E4,
        )
        .unwrap();
        assert_eq!(a.ply, 1);
        assert_eq!(a.ply, b.ply);
    }

    #[test]
    fn noise_lines_are_skipped() {
        let fen = STANDARD_START_FEN;
        assert!(parse_info_line("info depth 12 currmove e2e4 currmovenumber 1", fen).is_none());
        assert!(parse_info_line("info depth 12 score cp 10 pv e2e4", fen).is_none());
        assert!(parse_info_line("info depth 12 score cp 10 time soon pv e2e4", fen).is_none());
        assert!(parse_info_line("info nodes 100 time 5", fen).is_none());
        assert!(parse_info_line("bestmove e2e4", fen).is_none());
        assert!(parse_info_line("info string NNUE evaluation enabled", fen).is_none());
    }

    #[test]
    fn trailing_string_is_stripped() {
        let line = "info depth 8 score cp 0 time 12 pv e2e4 e7e5 string time 99 extra";
        let snap = parse_info_line(line, STANDARD_START_FEN).unwrap();
        assert_eq!(snap.time_elapsed_ms, 12);
        assert_eq!(snap.principal_variation, vec!["e2e4", "e7e5"]);
    }

    #[test]
    fn missing_score_and_pv_are_tolerated() {
        let snap = parse_info_line("info depth 1 time 0", STANDARD_START_FEN).unwrap();
        assert_eq!(snap.score.to_string(), "+0.00");
        assert!(snap.principal_variation.is_empty());
        assert_eq!(snap.multipv, 1);
        assert_eq!(snap.hash_fill_permille, None);
    }

    #[test]
    fn illegal_pv_keeps_coordinates() {
        let snap =
            parse_info_line("info depth 3 time 1 pv e2e4 e2e4", STANDARD_START_FEN).unwrap();
        assert_eq!(snap.principal_variation.len(), 2);
        assert_eq!(snap.principal_variation_algebraic, Some(vec![String::from("e4")]));
    }

    #[test]
    fn classify_engine_lines() {
        assert_eq!(
            parse_engine_line("id name Stockfish 16.1"),
            EngineLine::IdName("Stockfish 16.1".into())
        );
        assert_eq!(parse_engine_line("id author the team"), EngineLine::Other);
        assert_eq!(
            parse_engine_line("bestmove e2e4 ponder e7e5"),
            EngineLine::BestMove {
                mv: "e2e4".into(),
                ponder: Some("e7e5".into())
            }
        );
        assert_eq!(
            parse_engine_line("bestmove a1a2"),
            EngineLine::BestMove {
                mv: "a1a2".into(),
                ponder: None
            }
        );
        assert_eq!(parse_engine_line("uciok"), EngineLine::UciOk);
        assert_eq!(parse_engine_line("readyok"), EngineLine::ReadyOk);
        assert_eq!(parse_engine_line("info depth 1"), EngineLine::Info);
        assert_eq!(parse_engine_line(""), EngineLine::Other);
    }
}
