use std::sync::Arc;

use futures::future::join_all;
use kibitz_engine::{EngineSession, Readiness};
use kibitz_network::EventSink;
use kibitz_types::{
    config::{MultiplexerConfig, SessionConfig},
    events::{AnalysisEvent, LifecyclePhase, SessionEvent},
    Result,
};
use tokio::{
    sync::{
        mpsc::{self, UnboundedReceiver, UnboundedSender},
        oneshot, watch,
    },
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{launcher::SessionLauncher, orchestrator_error};

enum Signal {
    Analyze(String),
    Select(usize),
    Shutdown(oneshot::Sender<()>),
    Readiness {
        slot: usize,
        generation: u64,
        readiness: Readiness,
    },
    Session {
        slot: usize,
        generation: u64,
        event: SessionEvent,
    },
}

struct Slot {
    name: String,
    session: Option<EngineSession>,
    /// Bumped on every launch so signals from a replaced session are ignored.
    generation: u64,
    restarts: u32,
    ready: bool,
    watcher: Option<JoinHandle<()>>,
}

struct Actor<L, N> {
    launcher: Arc<L>,
    sink: Arc<N>,
    session_config: SessionConfig,
    config: MultiplexerConfig,
    slots: Vec<Slot>,
    active: Option<usize>,
    last_fen: Option<String>,
    signals: UnboundedSender<Signal>,
    active_tx: watch::Sender<Option<usize>>,
}

/// Handle to a running multiplexer.
pub struct KibitzerMultiplexer {
    signals: UnboundedSender<Signal>,
    active: watch::Receiver<Option<usize>>,
    actor: JoinHandle<()>,
}

impl KibitzerMultiplexer {
    /// Launch one session per launcher slot. The first to report ready
    /// becomes the active kibitzer.
    pub async fn start<L, N>(
        launcher: Arc<L>,
        session_config: SessionConfig,
        config: MultiplexerConfig,
        sink: Arc<N>,
    ) -> Result<Self>
    where
        L: SessionLauncher + 'static,
        N: EventSink + 'static,
    {
        let count = launcher.slots();
        if count == 0 {
            return Err(orchestrator_error("no engines configured"));
        }

        let (signals, inbox) = mpsc::unbounded_channel();
        let (active_tx, active) = watch::channel(None);
        let mut actor = Actor {
            launcher,
            sink,
            session_config,
            config,
            slots: Vec::with_capacity(count),
            active: None,
            last_fen: None,
            signals: signals.clone(),
            active_tx,
        };
        for slot in 0..count {
            actor.slots.push(Slot {
                name: actor.launcher.name(slot),
                session: None,
                generation: 0,
                restarts: 0,
                ready: false,
                watcher: None,
            });
            actor.launch(slot).await;
        }
        if actor.slots.iter().all(|slot| slot.session.is_none()) {
            return Err(orchestrator_error("no engine could be launched"));
        }
        info!(slots = count, "kibitzer multiplexer started");

        Ok(Self {
            signals,
            active,
            actor: tokio::spawn(actor.run(inbox)),
        })
    }

    /// Forward `fen` to the active kibitzer, and to whichever takes over later.
    pub fn analyze(&self, fen: impl Into<String>) {
        let _ = self.signals.send(Signal::Analyze(fen.into()));
    }

    /// Make a ready slot the active one.
    pub fn select(&self, slot: usize) {
        let _ = self.signals.send(Signal::Select(slot));
    }

    pub fn active_slot(&self) -> Option<usize> {
        *self.active.borrow()
    }

    pub fn active_changes(&self) -> watch::Receiver<Option<usize>> {
        self.active.clone()
    }

    /// Terminate every session and stop routing.
    pub async fn shutdown(self) {
        let (done, finished) = oneshot::channel();
        if self.signals.send(Signal::Shutdown(done)).is_ok() {
            let _ = finished.await;
        }
    }
}

impl Drop for KibitzerMultiplexer {
    fn drop(&mut self) {
        self.actor.abort();
    }
}

fn watch_readiness(
    slot: usize,
    generation: u64,
    mut readiness: watch::Receiver<Readiness>,
    signals: UnboundedSender<Signal>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let current = *readiness.borrow_and_update();
            let sent = signals.send(Signal::Readiness {
                slot,
                generation,
                readiness: current,
            });
            if sent.is_err() || current == Readiness::Down {
                return;
            }
            if readiness.changed().await.is_err() {
                return;
            }
        }
    })
}

impl<L, N> Actor<L, N>
where
    L: SessionLauncher + 'static,
    N: EventSink + 'static,
{
    async fn run(mut self, mut inbox: UnboundedReceiver<Signal>) {
        while let Some(signal) = inbox.recv().await {
            match signal {
                Signal::Analyze(fen) => self.analyze(fen),
                Signal::Select(slot) => self.select(slot).await,
                Signal::Readiness {
                    slot,
                    generation,
                    readiness,
                } => self.on_readiness(slot, generation, readiness).await,
                Signal::Session {
                    slot,
                    generation,
                    event,
                } => self.on_session_event(slot, generation, event).await,
                Signal::Shutdown(done) => {
                    self.shutdown().await;
                    let _ = done.send(());
                    return;
                }
            }
        }
    }

    fn label(&self, slot: usize) -> String {
        let entry = &self.slots[slot];
        entry
            .session
            .as_ref()
            .and_then(EngineSession::identity)
            .unwrap_or_else(|| entry.name.clone())
    }

    async fn publish(&self, event: AnalysisEvent) {
        if let Err(err) = self.sink.publish(event).await {
            warn!("publishing analysis event failed: {err}");
        }
    }

    async fn lifecycle(&self, slot: usize, phase: LifecyclePhase, details: Option<String>) {
        let event = AnalysisEvent::lifecycle(slot, Some(self.label(slot)), phase, details);
        self.publish(event).await;
    }

    fn set_active(&mut self, active: Option<usize>) {
        self.active = active;
        self.active_tx.send_replace(active);
    }

    async fn launch(&mut self, slot: usize) -> bool {
        let generation = {
            let entry = &mut self.slots[slot];
            entry.generation += 1;
            entry.ready = false;
            entry.generation
        };
        match self.launcher.launch(slot, &self.session_config).await {
            Ok(session) => {
                let watcher =
                    watch_readiness(slot, generation, session.readiness(), self.signals.clone());
                let entry = &mut self.slots[slot];
                debug!(slot, generation, session = %session.id(), "slot launched");
                entry.session = Some(session);
                entry.watcher = Some(watcher);
                true
            }
            Err(err) => {
                warn!(slot, engine = %self.slots[slot].name, "launch failed: {err}");
                self.lifecycle(
                    slot,
                    LifecyclePhase::Terminated,
                    Some(format!("launch failed: {err}")),
                )
                .await;
                false
            }
        }
    }

    fn analyze(&mut self, fen: String) {
        self.last_fen = Some(fen.clone());
        match self.active.and_then(|slot| self.slots[slot].session.as_ref()) {
            Some(session) => session.analyze(fen),
            None => debug!("no active kibitzer yet, request held"),
        }
    }

    async fn select(&mut self, slot: usize) {
        if self.active == Some(slot) {
            return;
        }
        match self.slots.get(slot) {
            Some(entry) if entry.ready && entry.session.is_some() => self.elect(slot).await,
            _ => warn!(slot, "cannot select a slot that is not ready"),
        }
    }

    /// Stop every other session, then wire `slot` to the output and replay
    /// the latest request to it.
    async fn elect(&mut self, slot: usize) {
        let mut stops = Vec::new();
        for (idx, other) in self.slots.iter().enumerate() {
            if idx == slot {
                continue;
            }
            if let Some(session) = &other.session {
                session.unsubscribe();
                stops.push(session.stop());
            }
        }
        join_all(stops).await;

        self.set_active(Some(slot));
        let entry = &self.slots[slot];
        let Some(session) = entry.session.as_ref() else {
            return;
        };
        let signals = self.signals.clone();
        let generation = entry.generation;
        session.subscribe(move |event| {
            let _ = signals.send(Signal::Session {
                slot,
                generation,
                event,
            });
        });
        if let Some(fen) = &self.last_fen {
            session.analyze(fen.clone());
        }
        info!(slot, engine = %self.label(slot), "kibitzer elected");
        self.lifecycle(slot, LifecyclePhase::Elected, None).await;
    }

    async fn on_readiness(&mut self, slot: usize, generation: u64, readiness: Readiness) {
        if self.slots[slot].generation != generation {
            return;
        }
        match readiness {
            Readiness::Starting => {}
            Readiness::Ready => {
                self.slots[slot].ready = true;
                let identity = self.label(slot);
                info!(slot, %identity, "kibitzer ready");
                self.lifecycle(slot, LifecyclePhase::Ready, Some(identity))
                    .await;
                if self.active.is_none() {
                    self.elect(slot).await;
                }
            }
            Readiness::Down => self.on_down(slot).await,
        }
    }

    async fn on_down(&mut self, slot: usize) {
        let label = self.label(slot);
        let (session, watcher) = {
            let entry = &mut self.slots[slot];
            entry.ready = false;
            (entry.session.take(), entry.watcher.take())
        };
        if let Some(watcher) = watcher {
            watcher.abort();
        }
        if let Some(session) = session {
            session.terminate().await;
        }
        warn!(slot, engine = %label, "kibitzer down");
        self.lifecycle(slot, LifecyclePhase::Terminated, None).await;
        if self.active == Some(slot) {
            self.set_active(None);
        }

        if self.slots[slot].restarts < self.config.restart_limit {
            self.slots[slot].restarts += 1;
            let attempt = self.slots[slot].restarts;
            warn!(slot, attempt, "relaunching kibitzer");
            self.lifecycle(
                slot,
                LifecyclePhase::Restarted,
                Some(format!("attempt {attempt}")),
            )
            .await;
            self.launch(slot).await;
        }

        if self.active.is_none() {
            if let Some(next) = self.slots.iter().position(|s| s.ready && s.session.is_some()) {
                self.elect(next).await;
            }
        }
    }

    async fn on_session_event(&mut self, slot: usize, generation: u64, event: SessionEvent) {
        if self.active != Some(slot) || self.slots[slot].generation != generation {
            debug!(slot, "dropping event from an inactive kibitzer");
            return;
        }
        let event = AnalysisEvent::session(slot, Some(self.label(slot)), event);
        self.publish(event).await;
    }

    async fn shutdown(&mut self) {
        self.set_active(None);
        for slot in 0..self.slots.len() {
            let (session, watcher) = {
                let entry = &mut self.slots[slot];
                entry.ready = false;
                (entry.session.take(), entry.watcher.take())
            };
            if let Some(watcher) = watcher {
                watcher.abort();
            }
            if let Some(session) = session {
                session.unsubscribe();
                session.terminate().await;
            }
            self.lifecycle(slot, LifecyclePhase::Shutdown, None).await;
        }
        info!("kibitzer multiplexer shut down");
    }
}
