use std::{collections::BTreeMap, fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{KibitzError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    pub log_level: String,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

/// Fixed per-session engine settings, applied during the start-up handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_hash_mb")]
    pub hash_mb: u32,
    #[serde(default = "default_threads")]
    pub threads: u32,
    /// Upper bound on waiting for `bestmove` after `stop`.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
    /// Extra `setoption` pairs sent after Hash and Threads.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

fn default_hash_mb() -> u32 {
    128
}

fn default_threads() -> u32 {
    1
}

fn default_stop_timeout_ms() -> u64 {
    500
}

impl SessionConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hash_mb: default_hash_mb(),
            threads: default_threads(),
            stop_timeout_ms: default_stop_timeout_ms(),
            options: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiplexerConfig {
    /// Relaunches allowed per slot after its engine goes down.
    #[serde(default = "default_restart_limit")]
    pub restart_limit: u32,
}

fn default_restart_limit() -> u32 {
    1
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            restart_limit: default_restart_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KibitzConfig {
    #[serde(default)]
    pub ops: OpsConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub multiplexer: MultiplexerConfig,
    #[serde(default)]
    pub engines: Vec<EngineConfig>,
}

impl KibitzConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            KibitzError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            KibitzError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.threads == 0 {
            return Err(KibitzError::Configuration(
                "session.threads must be greater than zero".into(),
            ));
        }
        if self.session.hash_mb == 0 {
            return Err(KibitzError::Configuration(
                "session.hash_mb must be greater than zero".into(),
            ));
        }
        if self.session.stop_timeout_ms == 0 {
            return Err(KibitzError::Configuration(
                "session.stop_timeout_ms must be greater than zero".into(),
            ));
        }
        for engine in &self.engines {
            if engine.command.trim().is_empty() {
                return Err(KibitzError::Configuration(format!(
                    "engine '{}' has an empty command",
                    engine.name
                )));
            }
        }
        Ok(())
    }
}
