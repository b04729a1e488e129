//! Analysis annotations recovered from archived engine games.

pub mod ccc;
pub mod dialect;
pub mod extract;
pub mod game;
pub mod pgn;
pub mod tcec;

use kibitz_types::KibitzError;

pub use dialect::ArchiveDialect;
pub use extract::extract_annotations;
pub use game::{ArchivedGame, ArchivedMove};
pub use pgn::{load_pgn, load_pgn_file};

pub fn archive_error(message: impl Into<String>) -> KibitzError {
    KibitzError::Archive(message.into())
}
