//! Kibitzer multiplexer: runs several engine sessions and routes analysis
//! to whichever one was first to become ready.

pub mod launcher;
pub mod multiplexer;

use kibitz_types::KibitzError;

pub use launcher::{ProcessLauncher, SessionLauncher};
pub use multiplexer::KibitzerMultiplexer;

pub fn orchestrator_error(message: impl Into<String>) -> KibitzError {
    KibitzError::Orchestrator(message.into())
}
