//! Fan-out of analysis events to in-process subscribers.

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use kibitz_types::{events::AnalysisEvent, Result};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::warn;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: AnalysisEvent) -> Result<()>;
    fn subscribe(&self) -> BoxStream<'static, AnalysisEvent>;
}

/// In-process hub backed by a broadcast channel. Slow subscribers skip
/// what they missed rather than holding up the publisher.
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<AnalysisEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventSink for EventHub {
    async fn publish(&self, event: AnalysisEvent) -> Result<()> {
        let _ = self.tx.send(event);
        Ok(())
    }

    fn subscribe(&self) -> BoxStream<'static, AnalysisEvent> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|event| async move {
                match event {
                    Ok(event) => Some(event),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(skipped, "event subscriber lagged");
                        None
                    }
                }
            })
            .boxed()
    }
}
