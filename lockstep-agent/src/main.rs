//! Lockstep device agent
//!
//! Keeps the device's lock decision in line with the backend, pushed
//! commands and how long the device has been offline.
//!
//! Usage:
//!   lockstep-agent --config /etc/lockstep/agent.json
//!
//! Logging honours `RUST_LOG`; `--verbose` raises the default to debug.

use anyhow::{Context, Result};
use clap::Parser;
use lockstep_agent::{build_router, AgentConfig, AppState, LoggingEnforcer, ReachabilityProbe};
use lockstep_backend::HttpBackendClient;
use lockstep_engine::{
    CommandChannel, ConnectivityMonitor, EngineEvent, EngineRunner, EnrollmentWorkflow,
    HostProbe, ReconciliationEngine, SystemClock,
};
use lockstep_store::SqliteStateStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "lockstep-agent")]
#[command(about = "Lockstep device compliance agent")]
struct Args {
    /// Path to a JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend base URL (overrides the config file)
    #[arg(long)]
    base_url: Option<String>,

    /// SQLite state database (overrides the config file)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Address for the local HTTP API (overrides the config file)
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn load_config(&self) -> Result<AgentConfig> {
        let mut config = match &self.config {
            Some(path) => AgentConfig::load(path).context("Failed to load config")?,
            None => AgentConfig::default(),
        };
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(db) = &self.db {
            config.database_path = db.clone();
        }
        if let Some(listen) = self.listen {
            config.listen_addr = listen;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let config = args.load_config()?;
    info!(base_url = %config.base_url, db = %config.database_path.display(), "lockstep agent starting");

    let store = Arc::new(
        SqliteStateStore::open(&config.database_path).context("Failed to open state database")?,
    );
    let backend = Arc::new(
        HttpBackendClient::new(config.backend_config()).context("Failed to build backend client")?,
    );
    let clock = Arc::new(SystemClock);
    let connectivity = Arc::new(ConnectivityMonitor::new(store.clone(), clock.clone()));
    let engine = ReconciliationEngine::new(
        config.engine_config(),
        store.clone(),
        backend.clone(),
        Arc::new(LoggingEnforcer::new()),
        connectivity,
        Arc::new(CommandChannel::new()),
        clock.clone(),
    );
    let (handle, runner) = EngineRunner::spawn(engine);
    tokio::spawn(log_events(handle.subscribe()));

    if let Some(interval) = config.reachability_interval() {
        match ReachabilityProbe::for_base_url(
            &config.base_url,
            interval,
            config.backend_config().timeout,
        ) {
            Some(probe) => {
                probe.spawn(handle.clone());
            }
            None => warn!(base_url = %config.base_url, "no host to probe; reachability disabled"),
        }
    }

    let state = AppState {
        engine: handle.clone(),
        enrollment: Arc::new(
            EnrollmentWorkflow::new(store, clock)
                .with_request_timeout(config.engine_config().request_timeout),
        ),
        backend,
        probe: Arc::new(HostProbe::new(config.elevation)),
    };
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .context("Failed to bind HTTP API")?;
    info!(addr = %config.listen_addr, "HTTP API listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    handle.shutdown();
    runner.await.context("Engine runner panicked")?;
    info!("lockstep agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn log_events(mut events: broadcast::Receiver<EngineEvent>) {
    loop {
        match events.recv().await {
            Ok(EngineEvent::LockChanged(state)) => {
                info!(locked = state.is_locked(), reason = %state.reason(), "lock state changed");
            }
            Ok(EngineEvent::Reminder { title, message }) => {
                info!(title = ?title, %message, "reminder received");
            }
            Ok(EngineEvent::PaymentDue {
                next_payment_date,
                days_left,
            }) => {
                info!(%next_payment_date, days_left, "payment due soon");
            }
            Ok(EngineEvent::SnapshotUpdated(_)) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
