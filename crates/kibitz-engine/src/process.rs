//! Engine subprocess transport over piped stdio.

use std::process::Stdio;

use async_trait::async_trait;
use kibitz_types::{config::EngineConfig, Result};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStdin, Command},
    sync::{
        mpsc::{self, UnboundedReceiver},
        Mutex,
    },
    task::JoinHandle,
    time::{timeout, Duration},
};
use tracing::{debug, warn};

use crate::{
    transport::{EngineTransport, TransportEvent},
    transport_error,
};

const QUIT_GRACE: Duration = Duration::from_millis(300);

pub struct ProcessTransport {
    name: String,
    stdin: Mutex<Option<ChildStdin>>,
    child: Mutex<Child>,
    reader: JoinHandle<()>,
}

impl ProcessTransport {
    pub fn spawn(config: &EngineConfig) -> Result<(Self, UnboundedReceiver<TransportEvent>)> {
        let mut child = Command::new(&config.command)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                transport_error(format!("failed to spawn {}: {err}", config.command))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| transport_error("engine stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| transport_error("engine stdout unavailable"))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let name = config.name.clone();
        let reader_name = name.clone();
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let reason = loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(TransportEvent::Line(line)).is_err() {
                            return;
                        }
                    }
                    Ok(None) => break "engine closed its output".to_string(),
                    Err(err) => break format!("read failed: {err}"),
                }
            };
            debug!(engine = %reader_name, %reason, "engine stream ended");
            let _ = tx.send(TransportEvent::Closed { reason });
        });

        Ok((
            Self {
                name,
                stdin: Mutex::new(Some(stdin)),
                child: Mutex::new(child),
                reader,
            },
            rx,
        ))
    }
}

#[async_trait]
impl EngineTransport for ProcessTransport {
    async fn send(&self, command: &str) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| transport_error(format!("{} stdin already closed", self.name)))?;
        stdin
            .write_all(format!("{command}\n").as_bytes())
            .await
            .map_err(|err| transport_error(format!("write to {} failed: {err}", self.name)))?;
        stdin
            .flush()
            .await
            .map_err(|err| transport_error(format!("flush to {} failed: {err}", self.name)))
    }

    async fn close(&self) -> Result<()> {
        drop(self.stdin.lock().await.take());
        let mut child = self.child.lock().await;
        match timeout(QUIT_GRACE, child.wait()).await {
            Ok(Ok(status)) => debug!(engine = %self.name, %status, "engine exited"),
            Ok(Err(err)) => warn!(engine = %self.name, "waiting for engine failed: {err}"),
            Err(_) => {
                warn!(engine = %self.name, "engine ignored quit, killing");
                child
                    .start_kill()
                    .map_err(|err| transport_error(format!("kill failed: {err}")))?;
            }
        }
        Ok(())
    }
}

impl Drop for ProcessTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
