//! Feeds connectivity samples by probing the backend host over TCP.

use lockstep_engine::EngineHandle;
use reqwest::Url;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReachabilityProbe {
    target: String,
    interval: Duration,
    timeout: Duration,
}

impl ReachabilityProbe {
    pub fn new(target: impl Into<String>, interval: Duration, timeout: Duration) -> Self {
        Self {
            target: target.into(),
            interval,
            timeout,
        }
    }

    /// Probes the host and port of `base_url`. `None` if the URL has no host.
    pub fn for_base_url(base_url: &str, interval: Duration, timeout: Duration) -> Option<Self> {
        let url = Url::parse(base_url).ok()?;
        let host = url.host_str()?;
        let port = url.port_or_known_default()?;
        // IPv6 hosts keep their brackets.
        Some(Self::new(format!("{host}:{port}"), interval, timeout))
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// One probe: can a TCP connection be opened within the timeout.
    pub async fn check(&self) -> bool {
        matches!(
            tokio::time::timeout(self.timeout, TcpStream::connect(self.target.as_str())).await,
            Ok(Ok(_))
        )
    }

    /// Probes forever, reporting every result to the engine.
    pub fn spawn(self, handle: EngineHandle) -> JoinHandle<()> {
        info!(host = %self.target, interval = ?self.interval, "reachability probe started");
        tokio::spawn(async move {
            loop {
                let online = self.check().await;
                if handle.set_online(online) {
                    info!(host = %self.target, "backend reachable again");
                } else {
                    debug!(host = %self.target, online, "reachability sample");
                }
                tokio::time::sleep(self.interval).await;
            }
        })
    }
}
