//! UCI engine sessions: output parsing, transports and the session coordinator.

pub mod info;
pub mod process;
pub mod session;
pub mod transport;

use kibitz_types::KibitzError;

pub use info::{parse_engine_line, parse_info_line, EngineLine};
pub use process::ProcessTransport;
pub use session::{EngineSession, Readiness, Subscriber};
pub use transport::{ChannelTransport, EngineEndpoint, EngineTransport, TransportEvent};

pub fn transport_error(message: impl Into<String>) -> KibitzError {
    KibitzError::Transport(message.into())
}
