//! Aligning principal variations to a shared position and locating where
//! two or more of them diverge.

use crate::{side::Side, snapshot::AnalysisSnapshot};

/// Align `pv` to the side to move in `reference_fen`.
///
/// A PV reported by the side that is not to move was searched one ply
/// earlier; its first move is that side's own move and is dropped.
pub fn normalize<'a>(pv: &'a [String], producing_side: Side, reference_fen: &str) -> &'a [String] {
    if producing_side != Side::to_move_in(reference_fen) {
        pv.get(1..).unwrap_or(&[])
    } else {
        pv
    }
}

fn normalized_pv<'a>(snapshot: &'a AnalysisSnapshot, reference_fen: &str) -> Option<&'a [String]> {
    if snapshot.principal_variation.is_empty() {
        return None;
    }
    Some(normalize(
        &snapshot.principal_variation,
        snapshot.side,
        reference_fen,
    ))
}

/// Zero-based offset of the first move where the two normalized PVs differ.
pub fn disagreement(
    a: Option<&AnalysisSnapshot>,
    b: Option<&AnalysisSnapshot>,
    reference_fen: &str,
) -> Option<usize> {
    let a = normalized_pv(a?, reference_fen)?;
    let b = normalized_pv(b?, reference_fen)?;
    first_difference(a, b)
}

/// Offset of the first differing move over the common prefix of two
/// already aligned lines.
pub fn first_difference(a: &[String], b: &[String]) -> Option<usize> {
    a.iter().zip(b).position(|(x, y)| x != y)
}

/// First offset at which any of the usable PVs differs from the others.
pub fn disagreement_among<'a, I>(snapshots: I, reference_fen: &str) -> Option<usize>
where
    I: IntoIterator<Item = Option<&'a AnalysisSnapshot>>,
{
    let pvs: Vec<&[String]> = snapshots
        .into_iter()
        .flatten()
        .filter_map(|s| normalized_pv(s, reference_fen))
        .collect();
    if pvs.len() < 2 {
        return None;
    }
    let common = pvs.iter().map(|pv| pv.len()).min().unwrap_or(0);
    (0..common).find(|&idx| pvs.iter().any(|pv| pv[idx] != pvs[0][idx]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{side::STANDARD_START_FEN, snapshot::Score};

    fn moves(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    fn snapshot(side: Side, pv: &str) -> AnalysisSnapshot {
        AnalysisSnapshot {
            ply: 0,
            side,
            score: Score::default(),
            depth: 20,
            selective_depth: None,
            node_count: None,
            nodes_per_second: None,
            hash_fill_permille: None,
            tablebase_hits: None,
            time_elapsed_ms: 0,
            multipv: 1,
            principal_variation: moves(pv),
            principal_variation_algebraic: None,
        }
    }

    #[test]
    fn normalization_aligns_both_sides() {
        let white = moves("e2e4 e7e5 g1f3");
        let black = moves("e7e5 g1f3 b8c6");
        assert_eq!(normalize(&white, Side::White, STANDARD_START_FEN), &white[..]);
        assert_eq!(
            normalize(&black, Side::Black, STANDARD_START_FEN),
            &moves("g1f3 b8c6")[..]
        );
        assert!(normalize(&[], Side::Black, STANDARD_START_FEN).is_empty());
    }

    #[test]
    fn first_differing_move_is_reported() {
        let a = snapshot(Side::White, "e2e4 e7e5 g1f3");
        let b = snapshot(Side::White, "e2e4 c7c5 g1f3");
        assert_eq!(disagreement(Some(&a), Some(&b), STANDARD_START_FEN), Some(1));
        assert_eq!(disagreement(Some(&a), Some(&a), STANDARD_START_FEN), None);
    }

    #[test]
    fn missing_input_means_no_disagreement() {
        let a = snapshot(Side::White, "e2e4");
        let empty = snapshot(Side::White, "");
        assert_eq!(disagreement(Some(&a), None, STANDARD_START_FEN), None);
        assert_eq!(disagreement(Some(&a), Some(&empty), STANDARD_START_FEN), None);
    }

    #[test]
    fn shorter_pv_bounds_the_scan() {
        let a = snapshot(Side::White, "e2e4 e7e5");
        let b = snapshot(Side::White, "e2e4 e7e5 g1f3");
        assert_eq!(disagreement(Some(&a), Some(&b), STANDARD_START_FEN), None);
    }

    #[test]
    fn cross_side_comparison_uses_normalized_lines() {
        let white = snapshot(Side::White, "e2e4 e7e5 g1f3");
        let black = snapshot(Side::Black, "d7d5 e2e4 e7e6");
        assert_eq!(
            disagreement(Some(&white), Some(&black), STANDARD_START_FEN),
            Some(1)
        );
    }

    #[test]
    fn many_way_comparison() {
        let a = snapshot(Side::White, "e2e4 e7e5 g1f3 b8c6");
        let b = snapshot(Side::White, "e2e4 e7e5 g1f3 g8f6");
        let c = snapshot(Side::White, "e2e4 e7e5 f1c4");
        assert_eq!(
            disagreement_among([Some(&a), Some(&b), Some(&c)], STANDARD_START_FEN),
            Some(2)
        );
        assert_eq!(
            disagreement_among([Some(&a), Some(&b)], STANDARD_START_FEN),
            Some(3)
        );
        assert_eq!(disagreement_among([Some(&a), None], STANDARD_START_FEN), None);
    }
}
