use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::snapshot::AnalysisSnapshot;

/// What an engine session delivers to its subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The engine identified itself; requests may now be issued.
    Ready { identity: String },
    /// A report for `fen`, the position confirmed in flight when it arrived.
    Snapshot {
        fen: String,
        snapshot: AnalysisSnapshot,
    },
    /// The transport failed or closed. Delivered at most once.
    Terminated { reason: String },
}

/// High-level event bus message kinds moving through the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Lifecycle,
    Analysis,
}

/// Immutable event envelope published by the multiplexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub slot: usize,
    pub engine: Option<String>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Session(SessionEvent),
    Lifecycle(LifecycleEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub phase: LifecyclePhase,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LifecyclePhase {
    Ready,
    Elected,
    Restarted,
    Terminated,
    Shutdown,
}

impl AnalysisEvent {
    pub fn new(slot: usize, engine: Option<String>, payload: EventPayload) -> Self {
        let kind = match payload {
            EventPayload::Session(_) => EventKind::Analysis,
            EventPayload::Lifecycle(_) => EventKind::Lifecycle,
        };
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            slot,
            engine,
            payload,
        }
    }

    pub fn session(slot: usize, engine: Option<String>, event: SessionEvent) -> Self {
        Self::new(slot, engine, EventPayload::Session(event))
    }

    pub fn lifecycle(
        slot: usize,
        engine: Option<String>,
        phase: LifecyclePhase,
        details: Option<String>,
    ) -> Self {
        Self::new(
            slot,
            engine,
            EventPayload::Lifecycle(LifecycleEvent { phase, details }),
        )
    }

    pub fn snapshot(&self) -> Option<&AnalysisSnapshot> {
        match &self.payload {
            EventPayload::Session(SessionEvent::Snapshot { snapshot, .. }) => Some(snapshot),
            _ => None,
        }
    }
}
