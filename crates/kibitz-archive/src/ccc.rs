//! `<score>/<depth> <time>s, n=…, sd=…, s=…, h=…, tb=…, pv="…"` comments.

use kibitz_types::{notation, AnalysisSnapshot, Score, Side};
use tracing::trace;

use crate::dialect::{counter, field, is_book, move_list, number, segments};

fn seconds_to_ms(raw: &str) -> Option<u64> {
    let secs: f64 = raw.strip_suffix('s').unwrap_or(raw).parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| (secs * 1000.0).round() as u64)
}

/// Parse one annotation. The score is written from the mover's point of
/// view and comes back from White's.
pub fn parse_ccc_comment(
    comment: &str,
    ply: u32,
    mover: Side,
    fen_before: Option<&str>,
) -> Option<AnalysisSnapshot> {
    let segs = segments(comment);
    if is_book(&segs) {
        return None;
    }

    let head = segs.first()?;
    let Some((score_text, rest)) = head.split_once('/') else {
        trace!(comment, "annotation without score/depth head");
        return None;
    };
    let score: Score = score_text.parse().ok()?;
    let mut rest = rest.split_whitespace();
    let depth: u32 = rest.next()?.parse().ok()?;
    let time_elapsed_ms = rest.next().and_then(seconds_to_ms).unwrap_or(0);

    let score = match mover {
        Side::White => score,
        Side::Black => score.flipped(),
    };
    let principal_variation = field(&segs, "pv").map(move_list).unwrap_or_default();
    let principal_variation_algebraic =
        fen_before.and_then(|fen| notation::uci_to_san(fen, &principal_variation));

    Some(AnalysisSnapshot {
        ply,
        side: mover,
        score,
        depth,
        selective_depth: number(&segs, "sd"),
        node_count: counter(&segs, "n"),
        nodes_per_second: counter(&segs, "s"),
        hash_fill_permille: number(&segs, "h"),
        tablebase_hits: counter(&segs, "tb"),
        time_elapsed_ms,
        multipv: 1,
        principal_variation,
        principal_variation_algebraic,
    })
}
