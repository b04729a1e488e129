//! PGN loading: headers, replayed positions and per-move comments.

use std::{collections::BTreeMap, fs::File, io, ops::ControlFlow, path::Path};

use kibitz_types::{
    notation::{load_position, position_fen},
    side::STANDARD_START_FEN,
    Result,
};
use pgn_reader::{RawComment, RawTag, Reader, SanPlus, Skip, Visitor};
use shakmaty::{Chess, Position};
use tracing::{debug, warn};

use crate::{
    archive_error,
    game::{ArchivedGame, ArchivedMove},
};

struct GameBuilder {
    game: ArchivedGame,
    /// `None` after the first move that could not be replayed.
    position: Option<Chess>,
}

struct ArchiveVisitor;

impl Visitor for ArchiveVisitor {
    type Tags = BTreeMap<String, String>;
    type Movetext = GameBuilder;
    type Output = Result<ArchivedGame>;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        ControlFlow::Continue(BTreeMap::new())
    }

    fn tag(
        &mut self,
        tags: &mut Self::Tags,
        name: &[u8],
        value: RawTag<'_>,
    ) -> ControlFlow<Self::Output> {
        tags.insert(
            String::from_utf8_lossy(name).into_owned(),
            value.decode_utf8_lossy().into_owned(),
        );
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
        let initial_fen = tags
            .get("FEN")
            .cloned()
            .unwrap_or_else(|| STANDARD_START_FEN.to_string());
        let position = match load_position(&initial_fen) {
            Ok(position) => position,
            Err(err) => return ControlFlow::Break(Err(err)),
        };
        let mut game = ArchivedGame::new(initial_fen);
        game.headers = tags;
        ControlFlow::Continue(GameBuilder {
            game,
            position: Some(position),
        })
    }

    fn san(&mut self, movetext: &mut Self::Movetext, san_plus: SanPlus) -> ControlFlow<Self::Output> {
        let fen_after = match movetext.position.take() {
            Some(mut pos) => match san_plus.san.to_move(&pos) {
                Ok(mv) => {
                    pos.play_unchecked(mv);
                    let fen = position_fen(&pos);
                    movetext.position = Some(pos);
                    Some(fen)
                }
                Err(err) => {
                    warn!(
                        san = %san_plus,
                        ply = movetext.game.moves.len(),
                        "movetext no longer replayable: {err}"
                    );
                    None
                }
            },
            None => None,
        };
        movetext.game.moves.push(ArchivedMove {
            san: san_plus.to_string(),
            fen_after,
            comment: None,
        });
        ControlFlow::Continue(())
    }

    fn comment(
        &mut self,
        movetext: &mut Self::Movetext,
        comment: RawComment<'_>,
    ) -> ControlFlow<Self::Output> {
        let text = String::from_utf8_lossy(comment.as_bytes()).trim().to_string();
        if let Some(last) = movetext.game.moves.last_mut() {
            last.comment = Some(match last.comment.take() {
                Some(previous) => format!("{previous} {text}"),
                None => text,
            });
        }
        ControlFlow::Continue(())
    }

    fn begin_variation(
        &mut self,
        _movetext: &mut Self::Movetext,
    ) -> ControlFlow<Self::Output, Skip> {
        ControlFlow::Continue(Skip(true))
    }

    fn end_game(&mut self, movetext: Self::Movetext) -> Self::Output {
        Ok(movetext.game)
    }
}

/// Read every game from PGN text.
pub fn load_pgn(text: &str) -> Result<Vec<ArchivedGame>> {
    read_games(io::Cursor::new(text.as_bytes()))
}

pub fn load_pgn_file<P: AsRef<Path>>(path: P) -> Result<Vec<ArchivedGame>> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref).map_err(|err| {
        archive_error(format!("unable to open {}: {err}", path_ref.display()))
    })?;
    read_games(io::BufReader::new(file))
}

fn read_games<R: io::Read>(source: R) -> Result<Vec<ArchivedGame>> {
    let mut reader = Reader::new(source);
    let mut visitor = ArchiveVisitor;
    let mut games = Vec::new();
    while let Some(game) = reader
        .read_game(&mut visitor)
        .map_err(|err| archive_error(format!("failed to read PGN: {err}")))?
    {
        games.push(game?);
    }
    debug!(games = games.len(), "loaded PGN");
    Ok(games)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CCC_GAME: &str = r#"[Event "CCC 21 Rapid"]
[Site "chess.com"]
[White "Stockfish"]
[Black "Leela"]
[Result "*"]

1. e4 {book} e5 {book} 2. Nf3 {+0.34/18 1.2s, n=120000, sd=22, s=95000, h=210, tb=0, pv="g1f3 b8c6"}
(2. Bc4 {side line}) Nc6 {-0.20/20 2s, n=9, sd=30, s=1, h=5, tb=0, pv="b8c6 f1b5"} *
"#;

    #[test]
    fn headers_moves_and_comments() {
        let games = load_pgn(CCC_GAME).unwrap();
        assert_eq!(games.len(), 1);
        let game = &games[0];
        assert_eq!(game.header("White"), Some("Stockfish"));
        assert_eq!(game.initial_fen, STANDARD_START_FEN);

        let sans: Vec<&str> = game.moves.iter().map(|m| m.san.as_str()).collect();
        assert_eq!(sans, vec!["e4", "e5", "Nf3", "Nc6"]);
        assert_eq!(game.moves[0].comment.as_deref(), Some("book"));
        assert!(game.moves[2]
            .comment
            .as_deref()
            .is_some_and(|c| c.starts_with("+0.34/18")));
        assert!(game.moves[3].comment.as_deref().is_some_and(|c| c.starts_with("-0.20")));
        assert!(game.moves.iter().all(|m| m.fen_after.is_some()));
    }

    #[test]
    fn fen_tag_sets_the_start_position() {
        let pgn = r#"[Site "TCEC"]
[SetUp "1"]
[FEN "4k3/8/8/8/8/8/4P3/4K3 b - - 0 40"]

40... Kd7 {d=12, wv=1.50, pv=Kd7 e4} 41. e4 *
"#;
        let games = load_pgn(pgn).unwrap();
        let game = &games[0];
        assert_eq!(game.initial_fen, "4k3/8/8/8/8/8/4P3/4K3 b - - 0 40");
        assert_eq!(game.ply_of(0), 79);
        assert_eq!(game.moves.len(), 2);
        assert!(game.moves[1].fen_after.is_some());
    }

    #[test]
    fn illegal_move_stops_position_tracking() {
        let games = load_pgn("1. e4 e5 2. Ke3 Nc6 *\n").unwrap();
        let moves = &games[0].moves;
        assert_eq!(moves.len(), 4);
        assert!(moves[1].fen_after.is_some());
        assert!(moves[2].fen_after.is_none());
        assert!(moves[3].fen_after.is_none());
    }

    #[test]
    fn invalid_fen_tag_is_an_error() {
        let pgn = "[FEN \"not a position\"]\n\n1. e4 *\n";
        assert!(load_pgn(pgn).is_err());
    }
}
