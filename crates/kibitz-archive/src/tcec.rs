//! Comma-separated `key=value` comments (`d=`, `wv=`, `pv=` in SAN, …).

use kibitz_types::{notation, AnalysisSnapshot, Score, Side};
use tracing::{debug, trace};

use crate::dialect::{counter, field, is_book, move_list, number, segments};

/// `h=` is a percentage; snapshots carry permille.
fn hash_permille(segs: &[&str]) -> Option<u32> {
    let percent: f64 = field(segs, "h")?.parse().ok()?;
    (percent.is_finite() && percent >= 0.0).then(|| (percent * 10.0).round() as u32)
}

/// Parse one annotation. `wv` is already from White's point of view; the
/// SAN line is converted to coordinates by replay from `fen_before`.
pub fn parse_tcec_comment(
    comment: &str,
    ply: u32,
    mover: Side,
    fen_before: Option<&str>,
) -> Option<AnalysisSnapshot> {
    let segs = segments(comment);
    if is_book(&segs) {
        return None;
    }

    let Some(score) = field(&segs, "wv").and_then(|v| v.parse::<Score>().ok()) else {
        trace!(comment, "annotation without a usable wv");
        return None;
    };
    let depth: u32 = number(&segs, "d")?;

    let algebraic: Vec<String> = field(&segs, "pv")
        .map(move_list)
        .unwrap_or_default()
        .into_iter()
        .filter(|token| !token.ends_with('.'))
        .collect();
    let principal_variation = match fen_before {
        Some(fen) => notation::san_to_uci(fen, &algebraic).unwrap_or_default(),
        None => {
            debug!(ply, "no stored position before move, coordinate line left empty");
            Vec::new()
        }
    };

    Some(AnalysisSnapshot {
        ply,
        side: mover,
        score,
        depth,
        selective_depth: number(&segs, "sd"),
        node_count: counter(&segs, "n"),
        nodes_per_second: counter(&segs, "s"),
        hash_fill_permille: hash_permille(&segs),
        tablebase_hits: counter(&segs, "tb"),
        time_elapsed_ms: counter(&segs, "mt").unwrap_or(0),
        multipv: 1,
        principal_variation,
        principal_variation_algebraic: Some(algebraic),
    })
}
