//! Line-oriented channel to an engine.

use async_trait::async_trait;
use kibitz_types::Result;
use tokio::sync::{
    mpsc::{self, UnboundedReceiver, UnboundedSender},
    Mutex,
};

use crate::transport_error;

/// Inbound traffic from an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Line(String),
    Closed { reason: String },
}

/// Outbound half of an engine channel. Inbound lines arrive on the
/// receiver handed out alongside the transport.
#[async_trait]
pub trait EngineTransport: Send + Sync {
    async fn send(&self, command: &str) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

/// In-memory transport for engines hosted in-process.
pub struct ChannelTransport {
    commands: Mutex<Option<UnboundedSender<String>>>,
    events: UnboundedSender<TransportEvent>,
}

/// The engine's side of a [`ChannelTransport`].
pub struct EngineEndpoint {
    commands: UnboundedReceiver<String>,
    events: UnboundedSender<TransportEvent>,
}

impl ChannelTransport {
    pub fn pair() -> (Self, UnboundedReceiver<TransportEvent>, EngineEndpoint) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let transport = Self {
            commands: Mutex::new(Some(command_tx)),
            events: event_tx.clone(),
        };
        let endpoint = EngineEndpoint {
            commands: command_rx,
            events: event_tx,
        };
        (transport, event_rx, endpoint)
    }
}

#[async_trait]
impl EngineTransport for ChannelTransport {
    async fn send(&self, command: &str) -> Result<()> {
        let guard = self.commands.lock().await;
        let sender = guard
            .as_ref()
            .ok_or_else(|| transport_error("channel transport closed"))?;
        sender
            .send(command.to_string())
            .map_err(|_| transport_error("engine endpoint dropped"))
    }

    async fn close(&self) -> Result<()> {
        if self.commands.lock().await.take().is_some() {
            let _ = self.events.send(TransportEvent::Closed {
                reason: "closed by session".into(),
            });
        }
        Ok(())
    }
}

impl EngineEndpoint {
    /// Next command written by the session, `None` once the transport closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.commands.recv().await
    }

    /// Commands already written, without waiting.
    pub fn drain(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(cmd) = self.commands.try_recv() {
            out.push(cmd);
        }
        out
    }

    pub fn emit(&self, line: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Line(line.into()));
    }

    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Closed {
            reason: reason.into(),
        });
    }
}
