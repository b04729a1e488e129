use thiserror::Error;

pub type Result<T, E = KibitzError> = std::result::Result<T, E>;

/// Unified error type covering common failure scenarios across subsystems.
///
/// None of these cross the snapshot-delivery boundary: parse and replay
/// failures are represented as absent data on the snapshot instead.
#[derive(Debug, Error)]
pub enum KibitzError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("archive error: {0}")]
    Archive(String),
    #[error("notation error: {0}")]
    Notation(String),
    #[error("orchestrator error: {0}")]
    Orchestrator(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
