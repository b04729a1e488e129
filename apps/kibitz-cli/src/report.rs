//! JSON views over archived games.

use kibitz_archive::{extract_annotations, ArchiveDialect, ArchivedGame};
use kibitz_types::{pv, AnalysisSnapshot, Side};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct GameReport {
    pub event: Option<String>,
    pub white: Option<String>,
    pub black: Option<String>,
    pub dialect: ArchiveDialect,
    pub annotated: usize,
    pub plies: Vec<PlyReport>,
}

#[derive(Debug, Serialize)]
pub struct PlyReport {
    pub ply: u32,
    pub side: Side,
    pub san: String,
    pub snapshot: Option<AnalysisSnapshot>,
    /// Where this move's line departs from the opponent's previous line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub divergence: Option<usize>,
}

pub fn game_report(game: &ArchivedGame, with_divergence: bool) -> GameReport {
    let tracks = extract_annotations(game);
    let plies = game
        .moves
        .iter()
        .enumerate()
        .map(|(index, played)| {
            let ply = game.ply_of(index);
            let snapshot = tracks.get(ply);
            let divergence = match (with_divergence, game.fen_before(index)) {
                (true, Some(fen)) if ply > 0 => {
                    pv::disagreement(snapshot, tracks.get(ply - 1), fen)
                }
                _ => None,
            };
            PlyReport {
                ply,
                side: game.mover_of(index),
                san: played.san.clone(),
                snapshot: snapshot.cloned(),
                divergence,
            }
        })
        .collect();

    GameReport {
        event: game.header("Event").map(String::from),
        white: game.header("White").map(String::from),
        black: game.header("Black").map(String::from),
        dialect: ArchiveDialect::detect(&game.headers),
        annotated: tracks.total(),
        plies,
    }
}
