//! Engine session coordinator.
//!
//! One session owns one engine. Requests are handled in order by a single
//! worker task, so at most one search is ever running; a reader task
//! consumes engine output and delivers snapshots for the position that is
//! confirmed in flight.

use std::sync::{Arc, Mutex, MutexGuard};

use kibitz_types::{config::SessionConfig, events::SessionEvent};
use tokio::{
    sync::{
        mpsc::{self, UnboundedReceiver, UnboundedSender},
        oneshot, watch,
    },
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::{
    info::{parse_engine_line, parse_info_line, EngineLine},
    transport::{EngineTransport, TransportEvent},
};

pub type Subscriber = Arc<dyn Fn(SessionEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Starting,
    Ready,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Searching,
    Stopping,
}

enum Request {
    Analyze(String),
    Stop(oneshot::Sender<()>),
}

struct SessionState {
    identity: Option<String>,
    phase: Phase,
    in_flight: Option<String>,
    pending: Option<String>,
    stop_ack: Option<oneshot::Sender<()>>,
    /// `bestmove` replies still owed for stops that timed out.
    stale_replies: u32,
    subscriber: Option<Subscriber>,
    terminated: bool,
    failed: bool,
}

impl SessionState {
    fn delivering_for(&self) -> Option<String> {
        if self.phase != Phase::Searching || self.stale_replies > 0 {
            return None;
        }
        match (&self.in_flight, &self.pending) {
            (Some(current), Some(latest)) if current == latest => Some(current.clone()),
            _ => None,
        }
    }
}

struct Shared {
    id: Uuid,
    transport: Box<dyn EngineTransport>,
    config: SessionConfig,
    state: Mutex<SessionState>,
    readiness: watch::Sender<Readiness>,
}

pub struct EngineSession {
    shared: Arc<Shared>,
    requests: UnboundedSender<Request>,
    worker: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl EngineSession {
    /// Bind a session to `transport` and begin the start-up handshake.
    pub fn start(
        transport: Box<dyn EngineTransport>,
        inbound: UnboundedReceiver<TransportEvent>,
        config: SessionConfig,
    ) -> Self {
        let (readiness, _) = watch::channel(Readiness::Starting);
        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            transport,
            config,
            state: Mutex::new(SessionState {
                identity: None,
                phase: Phase::Idle,
                in_flight: None,
                pending: None,
                stop_ack: None,
                stale_replies: 0,
                subscriber: None,
                terminated: false,
                failed: false,
            }),
            readiness,
        });

        let (requests, queue) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(shared.clone(), queue));
        let reader = tokio::spawn(run_reader(shared.clone(), inbound));
        info!(session = %shared.id, "engine session started");

        Self {
            shared,
            requests,
            worker,
            reader,
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Request analysis of `fen`. Returns immediately; the newest request
    /// wins over any still waiting behind a cancellation.
    pub fn analyze(&self, fen: impl Into<String>) {
        let fen = fen.into();
        {
            let mut state = self.shared.lock();
            if state.terminated {
                debug!(session = %self.shared.id, "analyze after terminate ignored");
                return;
            }
            state.pending = Some(fen.clone());
        }
        let _ = self.requests.send(Request::Analyze(fen));
    }

    /// Cancel the running search. Resolves once the engine confirms or the
    /// stop timeout expires; returns at once when nothing is running.
    pub async fn stop(&self) {
        {
            let mut state = self.shared.lock();
            state.pending = None;
            if state.terminated || state.phase == Phase::Idle {
                return;
            }
        }
        let (done, acknowledged) = oneshot::channel();
        if self.requests.send(Request::Stop(done)).is_err() {
            return;
        }
        let _ = acknowledged.await;
    }

    /// Send `quit` and release the engine. The session is unusable afterwards.
    pub async fn terminate(&self) {
        {
            let mut state = self.shared.lock();
            if state.terminated {
                return;
            }
            state.terminated = true;
            state.failed = true;
            state.pending = None;
            state.in_flight = None;
            state.phase = Phase::Idle;
            state.stop_ack = None;
            state.subscriber = None;
        }
        self.worker.abort();
        let _ = self.shared.send("quit").await;
        if let Err(err) = self.shared.transport.close().await {
            warn!(session = %self.shared.id, "closing engine transport failed: {err}");
        }
        self.reader.abort();
        self.shared.readiness.send_replace(Readiness::Down);
        info!(session = %self.shared.id, "engine session terminated");
    }

    pub fn subscribe(&self, subscriber: impl Fn(SessionEvent) + Send + Sync + 'static) {
        self.shared.lock().subscriber = Some(Arc::new(subscriber));
    }

    pub fn unsubscribe(&self) {
        self.shared.lock().subscriber = None;
    }

    pub fn readiness(&self) -> watch::Receiver<Readiness> {
        self.shared.readiness.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        *self.shared.readiness.borrow() == Readiness::Ready
    }

    /// True from the moment a search starts until it is fully cancelled.
    pub fn is_searching(&self) -> bool {
        self.shared.lock().phase != Phase::Idle
    }

    pub fn identity(&self) -> Option<String> {
        self.shared.lock().identity.clone()
    }

    pub fn in_flight_position(&self) -> Option<String> {
        self.shared.lock().in_flight.clone()
    }

    pub fn pending_position(&self) -> Option<String> {
        self.shared.lock().pending.clone()
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        self.worker.abort();
        self.reader.abort();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn send(&self, command: &str) -> kibitz_types::Result<()> {
        debug!(session = %self.id, command, "engine <");
        self.transport.send(command).await
    }

    async fn handshake(&self) -> kibitz_types::Result<()> {
        let mut commands = vec![
            "uci".to_string(),
            format!("setoption name Hash value {}", self.config.hash_mb),
            format!("setoption name Threads value {}", self.config.threads),
        ];
        commands.extend(
            self.config
                .options
                .iter()
                .map(|(name, value)| format!("setoption name {name} value {value}")),
        );
        commands.push("isready".into());
        commands.push("ucinewgame".into());
        for command in &commands {
            self.send(command).await?;
        }
        Ok(())
    }

    async fn wait_until_ready(&self) -> bool {
        let mut readiness = self.readiness.subscribe();
        loop {
            let current = *readiness.borrow_and_update();
            match current {
                Readiness::Ready => return true,
                Readiness::Down => return false,
                Readiness::Starting => {}
            }
            if readiness.changed().await.is_err() {
                return false;
            }
        }
    }

    fn is_current(&self, fen: &str) -> bool {
        let state = self.lock();
        !state.terminated && state.pending.as_deref() == Some(fen)
    }

    async fn start_search(&self, fen: String) {
        let searching = {
            let state = self.lock();
            if state.terminated || state.pending.as_deref() != Some(fen.as_str()) {
                trace!(session = %self.id, %fen, "request superseded");
                return;
            }
            if state.phase == Phase::Searching && state.in_flight.as_deref() == Some(fen.as_str())
            {
                return;
            }
            state.phase != Phase::Idle
        };

        if searching {
            self.halt().await;
            if !self.is_current(&fen) {
                debug!(session = %self.id, %fen, "request superseded during cancellation");
                return;
            }
        }

        {
            let mut state = self.lock();
            state.phase = Phase::Searching;
            state.in_flight = Some(fen.clone());
        }
        let position = format!("position fen {fen}");
        for command in [position.as_str(), "go infinite"] {
            if let Err(err) = self.send(command).await {
                self.fail(err.to_string());
                return;
            }
        }
    }

    /// Send `stop` and wait for `bestmove`, bounded by the stop timeout.
    async fn halt(&self) {
        let acknowledged = {
            let mut state = self.lock();
            if state.phase != Phase::Searching {
                return;
            }
            state.phase = Phase::Stopping;
            let (tx, rx) = oneshot::channel();
            state.stop_ack = Some(tx);
            rx
        };

        if let Err(err) = self.send("stop").await {
            warn!(session = %self.id, "sending stop failed: {err}");
        }
        let timed_out = timeout(self.config.stop_timeout(), acknowledged)
            .await
            .is_err();

        let mut state = self.lock();
        if timed_out {
            warn!(
                session = %self.id,
                timeout_ms = self.config.stop_timeout_ms,
                "no bestmove after stop, treating search as stopped"
            );
            state.stop_ack = None;
            if !state.failed {
                state.stale_replies += 1;
            }
        }
        state.phase = Phase::Idle;
        state.in_flight = None;
    }

    fn handle_line(&self, line: &str) {
        match parse_engine_line(line) {
            EngineLine::Info => {
                trace!(session = %self.id, line, "engine >");
                self.handle_info(line);
            }
            EngineLine::IdName(identity) => {
                debug!(session = %self.id, line, "engine >");
                self.handle_identity(identity);
            }
            EngineLine::BestMove { mv, .. } => {
                debug!(session = %self.id, line, "engine >");
                self.handle_bestmove(&mv);
            }
            EngineLine::UciOk | EngineLine::ReadyOk | EngineLine::Other => {
                debug!(session = %self.id, line, "engine >");
            }
        }
    }

    fn handle_info(&self, line: &str) {
        let Some(fen) = self.lock().delivering_for() else {
            return;
        };
        let Some(snapshot) = parse_info_line(line, &fen) else {
            return;
        };
        let subscriber = {
            let state = self.lock();
            if state.delivering_for().as_deref() != Some(fen.as_str()) {
                return;
            }
            state.subscriber.clone()
        };
        if let Some(subscriber) = subscriber {
            subscriber(SessionEvent::Snapshot { fen, snapshot });
        }
    }

    fn handle_identity(&self, identity: String) {
        let subscriber = {
            let mut state = self.lock();
            let first = state.identity.is_none();
            state.identity = Some(identity.clone());
            if !first || state.failed {
                return;
            }
            state.subscriber.clone()
        };
        info!(session = %self.id, %identity, "engine ready");
        self.readiness.send_replace(Readiness::Ready);
        if let Some(subscriber) = subscriber {
            subscriber(SessionEvent::Ready { identity });
        }
    }

    fn handle_bestmove(&self, mv: &str) {
        let mut state = self.lock();
        if state.stale_replies > 0 {
            state.stale_replies -= 1;
            debug!(session = %self.id, mv, "late bestmove from an abandoned search");
            return;
        }
        if let Some(ack) = state.stop_ack.take() {
            let _ = ack.send(());
        } else if state.phase == Phase::Searching {
            state.phase = Phase::Idle;
            state.in_flight = None;
        }
    }

    /// Mark the session down and report it once.
    fn fail(&self, reason: String) {
        let subscriber = {
            let mut state = self.lock();
            if state.failed {
                return;
            }
            state.failed = true;
            state.phase = Phase::Idle;
            state.in_flight = None;
            state.stop_ack = None;
            state.subscriber.clone()
        };
        warn!(session = %self.id, %reason, "engine session down");
        self.readiness.send_replace(Readiness::Down);
        if let Some(subscriber) = subscriber {
            subscriber(SessionEvent::Terminated { reason });
        }
    }
}

async fn run_worker(shared: Arc<Shared>, mut queue: UnboundedReceiver<Request>) {
    if let Err(err) = shared.handshake().await {
        shared.fail(format!("handshake failed: {err}"));
        return;
    }
    if !shared.wait_until_ready().await {
        return;
    }
    while let Some(request) = queue.recv().await {
        match request {
            Request::Analyze(fen) => shared.start_search(fen).await,
            Request::Stop(done) => {
                shared.halt().await;
                let _ = done.send(());
            }
        }
    }
}

async fn run_reader(shared: Arc<Shared>, mut inbound: UnboundedReceiver<TransportEvent>) {
    while let Some(event) = inbound.recv().await {
        match event {
            TransportEvent::Line(line) => shared.handle_line(line.trim()),
            TransportEvent::Closed { reason } => {
                shared.fail(reason);
                return;
            }
        }
    }
    shared.fail("engine channel ended".into());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ChannelTransport, EngineEndpoint};
    use kibitz_types::side::STANDARD_START_FEN;
    use tokio::time::{sleep, Duration};

    const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
    const AFTER_D4: &str = "rnbqkbnr/pppppppp/8/8/3P4/8/PPP1PPPP/RNBQKBNR b KQkq - 0 1";
    const HANDSHAKE: [&str; 5] = [
        "uci",
        "setoption name Hash value 128",
        "setoption name Threads value 1",
        "isready",
        "ucinewgame",
    ];

    fn config() -> SessionConfig {
        SessionConfig {
            stop_timeout_ms: 100,
            ..SessionConfig::default()
        }
    }

    fn launch() -> (
        EngineSession,
        EngineEndpoint,
        UnboundedReceiver<SessionEvent>,
    ) {
        let (transport, inbound, endpoint) = ChannelTransport::pair();
        let session = EngineSession::start(Box::new(transport), inbound, config());
        let (tx, rx) = mpsc::unbounded_channel();
        session.subscribe(move |event| {
            let _ = tx.send(event);
        });
        (session, endpoint, rx)
    }

    async fn expect(endpoint: &mut EngineEndpoint, command: &str) {
        let got = timeout(Duration::from_secs(1), endpoint.recv())
            .await
            .expect("engine command in time");
        assert_eq!(got.as_deref(), Some(command));
    }

    async fn ready() -> (
        EngineSession,
        EngineEndpoint,
        UnboundedReceiver<SessionEvent>,
    ) {
        let (session, mut endpoint, mut events) = launch();
        for command in HANDSHAKE {
            expect(&mut endpoint, command).await;
        }
        endpoint.emit("id name MockFish 1.0");
        let event = events.recv().await.expect("ready event");
        assert_eq!(
            event,
            SessionEvent::Ready {
                identity: "MockFish 1.0".into()
            }
        );
        (session, endpoint, events)
    }

    async fn next_snapshot_fen(events: &mut UnboundedReceiver<SessionEvent>) -> String {
        match timeout(Duration::from_secs(1), events.recv()).await {
            Ok(Some(SessionEvent::Snapshot { fen, .. })) => fen,
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn becomes_ready_on_self_identification() {
        let (session, _endpoint, _events) = ready().await;
        assert!(session.is_ready());
        assert_eq!(session.identity().as_deref(), Some("MockFish 1.0"));
        assert!(!session.is_searching());
    }

    #[tokio::test]
    async fn extra_options_follow_hash_and_threads() {
        let mut config = config();
        config.options.insert("MultiPV".into(), "2".into());
        let (transport, inbound, mut endpoint) = ChannelTransport::pair();
        let _session = EngineSession::start(Box::new(transport), inbound, config);
        for command in [
            "uci",
            "setoption name Hash value 128",
            "setoption name Threads value 1",
            "setoption name MultiPV value 2",
            "isready",
            "ucinewgame",
        ] {
            expect(&mut endpoint, command).await;
        }
    }

    #[tokio::test]
    async fn requests_wait_for_readiness() {
        let (session, mut endpoint, _events) = launch();
        session.analyze(STANDARD_START_FEN);
        for command in HANDSHAKE {
            expect(&mut endpoint, command).await;
        }
        sleep(Duration::from_millis(30)).await;
        assert!(endpoint.drain().is_empty());

        endpoint.emit("id name Late");
        expect(&mut endpoint, &format!("position fen {STANDARD_START_FEN}")).await;
        expect(&mut endpoint, "go infinite").await;
    }

    #[tokio::test]
    async fn back_to_back_requests_coalesce() {
        let (session, mut endpoint, _events) = ready().await;
        session.analyze(STANDARD_START_FEN);
        expect(&mut endpoint, &format!("position fen {STANDARD_START_FEN}")).await;
        expect(&mut endpoint, "go infinite").await;

        session.analyze(AFTER_E4);
        session.analyze(AFTER_D4);
        expect(&mut endpoint, "stop").await;
        endpoint.emit("bestmove e2e4");
        expect(&mut endpoint, &format!("position fen {AFTER_D4}")).await;
        expect(&mut endpoint, "go infinite").await;

        sleep(Duration::from_millis(30)).await;
        assert!(endpoint.drain().is_empty());
        assert_eq!(session.in_flight_position().as_deref(), Some(AFTER_D4));
    }

    #[tokio::test]
    async fn requests_coalesce_while_idle() {
        let (session, mut endpoint, _events) = launch();
        session.analyze(STANDARD_START_FEN);
        session.analyze(AFTER_E4);
        for command in HANDSHAKE {
            expect(&mut endpoint, command).await;
        }
        endpoint.emit("id name MockFish");
        expect(&mut endpoint, &format!("position fen {AFTER_E4}")).await;
        expect(&mut endpoint, "go infinite").await;
        sleep(Duration::from_millis(30)).await;
        assert!(endpoint.drain().is_empty());
    }

    #[tokio::test]
    async fn repeating_the_current_position_is_a_no_op() {
        let (session, mut endpoint, _events) = ready().await;
        session.analyze(STANDARD_START_FEN);
        expect(&mut endpoint, &format!("position fen {STANDARD_START_FEN}")).await;
        expect(&mut endpoint, "go infinite").await;
        session.analyze(STANDARD_START_FEN);
        sleep(Duration::from_millis(30)).await;
        assert!(endpoint.drain().is_empty());
    }

    #[tokio::test]
    async fn superseded_position_is_never_attributed() {
        let (session, mut endpoint, mut events) = ready().await;
        let info = "info depth 12 score cp 20 nodes 1000 time 15 pv e2e4";

        session.analyze(STANDARD_START_FEN);
        expect(&mut endpoint, &format!("position fen {STANDARD_START_FEN}")).await;
        expect(&mut endpoint, "go infinite").await;
        endpoint.emit(info);
        assert_eq!(next_snapshot_fen(&mut events).await, STANDARD_START_FEN);

        session.analyze(AFTER_E4);
        expect(&mut endpoint, "stop").await;
        endpoint.emit(info);
        endpoint.emit("bestmove e2e4");
        expect(&mut endpoint, &format!("position fen {AFTER_E4}")).await;
        expect(&mut endpoint, "go infinite").await;
        endpoint.emit("info depth 9 score cp 18 time 11 pv e7e5");

        assert_eq!(next_snapshot_fen(&mut events).await, AFTER_E4);
    }

    #[tokio::test]
    async fn progress_lines_are_not_delivered() {
        let (session, mut endpoint, mut events) = ready().await;
        session.analyze(STANDARD_START_FEN);
        expect(&mut endpoint, &format!("position fen {STANDARD_START_FEN}")).await;
        expect(&mut endpoint, "go infinite").await;
        endpoint.emit("info depth 3 currmove e2e4 currmovenumber 1");
        endpoint.emit("info string NNUE enabled");
        endpoint.emit("info depth 3 score cp 5 time 2 pv d2d4");
        let fen = next_snapshot_fen(&mut events).await;
        assert_eq!(fen, STANDARD_START_FEN);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let (session, mut endpoint, _events) = ready().await;
        session.stop().await;
        assert!(endpoint.drain().is_empty());

        session.analyze(STANDARD_START_FEN);
        expect(&mut endpoint, &format!("position fen {STANDARD_START_FEN}")).await;
        expect(&mut endpoint, "go infinite").await;
        tokio::join!(session.stop(), async {
            expect(&mut endpoint, "stop").await;
            endpoint.emit("bestmove e2e4");
        });
        assert!(!session.is_searching());

        session.stop().await;
        assert!(endpoint.drain().is_empty());
    }

    #[tokio::test]
    async fn unanswered_stop_times_out() {
        let (session, mut endpoint, _events) = ready().await;
        session.analyze(STANDARD_START_FEN);
        expect(&mut endpoint, &format!("position fen {STANDARD_START_FEN}")).await;
        expect(&mut endpoint, "go infinite").await;

        timeout(Duration::from_secs(1), session.stop())
            .await
            .expect("stop resolves after the timeout");
        assert!(!session.is_searching());
        expect(&mut endpoint, "stop").await;

        session.analyze(AFTER_E4);
        expect(&mut endpoint, &format!("position fen {AFTER_E4}")).await;
        expect(&mut endpoint, "go infinite").await;
        endpoint.emit("bestmove e2e4");
        sleep(Duration::from_millis(20)).await;
        assert!(session.is_searching());
    }

    #[tokio::test]
    async fn unsolicited_bestmove_returns_to_idle() {
        let (session, mut endpoint, _events) = ready().await;
        session.analyze(STANDARD_START_FEN);
        expect(&mut endpoint, &format!("position fen {STANDARD_START_FEN}")).await;
        expect(&mut endpoint, "go infinite").await;
        endpoint.emit("bestmove e2e4");
        sleep(Duration::from_millis(20)).await;
        assert!(!session.is_searching());
    }

    #[tokio::test]
    async fn transport_failure_is_reported_once() {
        let (session, endpoint, mut events) = ready().await;
        let mut readiness = session.readiness();
        endpoint.fail("engine crashed");
        endpoint.fail("again");

        assert_eq!(
            events.recv().await,
            Some(SessionEvent::Terminated {
                reason: "engine crashed".into()
            })
        );
        readiness
            .wait_for(|r| *r == Readiness::Down)
            .await
            .expect("readiness down");
        sleep(Duration::from_millis(20)).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn terminate_sends_quit_and_ignores_later_requests() {
        let (session, mut endpoint, _events) = ready().await;
        session.terminate().await;
        expect(&mut endpoint, "quit").await;
        assert_eq!(*session.readiness().borrow(), Readiness::Down);

        session.analyze(STANDARD_START_FEN);
        sleep(Duration::from_millis(20)).await;
        assert!(endpoint.drain().is_empty());
    }
}
