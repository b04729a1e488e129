//! Shared domain types for the Kibitz analysis overlay.

pub mod config;
pub mod events;
pub mod notation;
pub mod pv;
pub mod side;
pub mod snapshot;
pub mod track;

mod errors;

pub use errors::{KibitzError, Result};
pub use side::Side;
pub use snapshot::{AnalysisSnapshot, Score};
