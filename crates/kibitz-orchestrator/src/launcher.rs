use async_trait::async_trait;
use kibitz_engine::{EngineSession, ProcessTransport};
use kibitz_types::{
    config::{EngineConfig, SessionConfig},
    Result,
};
use tracing::info;

use crate::orchestrator_error;

/// Creates the session behind a multiplexer slot, both at start-up and
/// when a slot is relaunched after its engine went down.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    fn slots(&self) -> usize;
    fn name(&self, slot: usize) -> String;
    async fn launch(&self, slot: usize, config: &SessionConfig) -> Result<EngineSession>;
}

/// One engine subprocess per configured engine.
pub struct ProcessLauncher {
    engines: Vec<EngineConfig>,
}

impl ProcessLauncher {
    pub fn new(engines: Vec<EngineConfig>) -> Self {
        Self { engines }
    }
}

#[async_trait]
impl SessionLauncher for ProcessLauncher {
    fn slots(&self) -> usize {
        self.engines.len()
    }

    fn name(&self, slot: usize) -> String {
        self.engines
            .get(slot)
            .map(|engine| engine.name.clone())
            .unwrap_or_else(|| format!("slot-{slot}"))
    }

    async fn launch(&self, slot: usize, config: &SessionConfig) -> Result<EngineSession> {
        let engine = self
            .engines
            .get(slot)
            .ok_or_else(|| orchestrator_error(format!("no engine configured for slot {slot}")))?;
        let (transport, inbound) = ProcessTransport::spawn(engine)?;
        info!(slot, engine = %engine.name, command = %engine.command, "engine process spawned");
        Ok(EngineSession::start(
            Box::new(transport),
            inbound,
            config.clone(),
        ))
    }
}
