//! Operational helpers: logging setup and the in-memory analysis log.

use std::{collections::BTreeMap, sync::Arc};

use kibitz_types::{
    config::OpsConfig, events::AnalysisEvent, track::PlyTrack, AnalysisSnapshot, KibitzError,
    Result,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| KibitzError::Ops(format!("failed to create log filter: {err}")))?;

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| KibitzError::Ops(format!("tracing init error: {err}")))?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotSummary {
    pub slot: usize,
    pub engine: Option<String>,
    pub snapshots: usize,
    pub latest: Option<AnalysisSnapshot>,
}

#[derive(Default)]
struct LogInner {
    events: Vec<AnalysisEvent>,
    tracks: BTreeMap<usize, PlyTrack>,
    engines: BTreeMap<usize, String>,
}

/// Everything the multiplexer published, plus one ply-indexed track per slot.
#[derive(Clone, Default)]
pub struct AnalysisLog {
    inner: Arc<Mutex<LogInner>>,
}

impl AnalysisLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, event: AnalysisEvent) {
        let mut inner = self.inner.lock().await;
        if let Some(engine) = &event.engine {
            inner.engines.insert(event.slot, engine.clone());
        }
        if let Some(snapshot) = event.snapshot() {
            inner
                .tracks
                .entry(event.slot)
                .or_default()
                .insert(snapshot.clone());
        }
        inner.events.push(event);
    }

    pub async fn events(&self) -> Vec<AnalysisEvent> {
        self.inner.lock().await.events.clone()
    }

    pub async fn track(&self, slot: usize) -> PlyTrack {
        self.inner
            .lock()
            .await
            .tracks
            .get(&slot)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn summary(&self) -> Vec<SlotSummary> {
        let inner = self.inner.lock().await;
        inner
            .tracks
            .iter()
            .map(|(slot, track)| SlotSummary {
                slot: *slot,
                engine: inner.engines.get(slot).cloned(),
                snapshots: track.iter().count(),
                latest: track.latest().cloned(),
            })
            .collect()
    }

    pub async fn summary_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.summary().await)
            .map_err(|err| KibitzError::Ops(format!("failed to encode summary: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kibitz_types::{
        events::{LifecyclePhase, SessionEvent},
        side::STANDARD_START_FEN,
        Score, Side,
    };

    fn snapshot(ply: u32) -> AnalysisSnapshot {
        AnalysisSnapshot {
            ply,
            side: Side::White,
            score: Score::Centipawns(25),
            depth: 14,
            selective_depth: Some(20),
            node_count: Some(1_000),
            nodes_per_second: None,
            hash_fill_permille: None,
            tablebase_hits: None,
            time_elapsed_ms: 40,
            multipv: 1,
            principal_variation: vec!["e2e4".into()],
            principal_variation_algebraic: None,
        }
    }

    fn delivered(slot: usize, ply: u32) -> AnalysisEvent {
        AnalysisEvent::session(
            slot,
            Some("MockFish".into()),
            SessionEvent::Snapshot {
                fen: STANDARD_START_FEN.into(),
                snapshot: snapshot(ply),
            },
        )
    }

    #[tokio::test]
    async fn snapshots_land_in_slot_tracks() {
        let log = AnalysisLog::new();
        log.record(AnalysisEvent::lifecycle(0, None, LifecyclePhase::Elected, None))
            .await;
        log.record(delivered(0, 4)).await;
        log.record(delivered(0, 2)).await;
        log.record(delivered(1, 0)).await;

        assert_eq!(log.events().await.len(), 4);
        let track = log.track(0).await;
        assert_eq!(track.plies().collect::<Vec<_>>(), vec![2, 4]);
        assert!(log.track(7).await.is_empty());

        let summary = log.summary().await;
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].snapshots, 2);
        assert_eq!(summary[0].engine.as_deref(), Some("MockFish"));
        assert_eq!(summary[0].latest.as_ref().map(|s| s.ply), Some(4));
    }

    #[tokio::test]
    async fn summary_encodes_as_json() {
        let log = AnalysisLog::new();
        log.record(delivered(2, 1)).await;
        let json = log.summary_json().await.unwrap();
        assert!(json.contains("\"slot\": 2"));
        assert!(json.contains("\"+0.25\""));
    }
}
