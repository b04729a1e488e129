use kibitz_types::{track::AnnotationTracks, AnalysisSnapshot, Side};
use tracing::debug;

use crate::{
    ccc::parse_ccc_comment, dialect::ArchiveDialect, game::ArchivedGame,
    tcec::parse_tcec_comment,
};

type CommentParser = fn(&str, u32, Side, Option<&str>) -> Option<AnalysisSnapshot>;

/// Collect one snapshot per annotated move into per-side tracks.
///
/// Unannotated, book and unparseable moves leave a gap at their ply; later
/// plies keep their own index.
pub fn extract_annotations(game: &ArchivedGame) -> AnnotationTracks {
    let dialect = ArchiveDialect::detect(&game.headers);
    let parse: CommentParser = match dialect {
        ArchiveDialect::Ccc => parse_ccc_comment,
        ArchiveDialect::Tcec => parse_tcec_comment,
    };

    let mut tracks = AnnotationTracks::default();
    for (index, played) in game.moves.iter().enumerate() {
        let Some(comment) = played.comment.as_deref() else {
            continue;
        };
        let ply = game.ply_of(index);
        if let Some(snapshot) = parse(comment, ply, game.mover_of(index), game.fen_before(index)) {
            tracks.insert(snapshot);
        }
    }
    debug!(
        ?dialect,
        moves = game.moves.len(),
        annotated = tracks.total(),
        "extracted archive annotations"
    );
    tracks
}
