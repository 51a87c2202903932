//! Agent configuration file.

use lockstep_backend::BackendConfig;
use lockstep_engine::{Elevation, EngineConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// JSON config file. Every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    pub poll_interval_ms: u64,
    pub offline_lock_threshold_minutes: u64,
    pub request_timeout_ms: u64,
    pub reminder_threshold_days: u32,
    pub base_url: String,
    pub database_path: PathBuf,
    pub listen_addr: SocketAddr,
    /// How often the backend host is probed for reachability. 0 disables
    /// probing; samples then only arrive through the HTTP API.
    pub reachability_interval_ms: u64,
    /// Privilege the host grants the agent, used at enrollment.
    pub elevation: Elevation,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            poll_interval_ms: millis(engine.poll_interval),
            offline_lock_threshold_minutes: engine.offline_lock_threshold.as_secs() / 60,
            request_timeout_ms: millis(engine.request_timeout),
            reminder_threshold_days: engine.reminder_threshold_days,
            base_url: BackendConfig::default().base_url,
            database_path: PathBuf::from("lockstep.db"),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 7878)),
            reachability_interval_ms: 30_000,
            elevation: Elevation::DeviceAdmin,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl AgentConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            offline_lock_threshold: Duration::from_secs(
                self.offline_lock_threshold_minutes.saturating_mul(60),
            ),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            reminder_threshold_days: self.reminder_threshold_days,
        }
    }

    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }

    pub fn reachability_interval(&self) -> Option<Duration> {
        (self.reachability_interval_ms > 0)
            .then(|| Duration::from_millis(self.reachability_interval_ms))
    }
}
