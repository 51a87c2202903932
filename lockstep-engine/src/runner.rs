//! Drives the engine from timers and external triggers.
//!
//! The runner owns the engine inside a tokio task and keeps at most one
//! pass in flight. Triggers that arrive while a pass runs are collapsed into
//! a single follow-up pass. Manual unlocks and admin-disable reports take
//! the same engine lock, so they never interleave with a pass.

use crate::clock::Clock;
use crate::commands::CommandChannel;
use crate::connectivity::ConnectivityMonitor;
use crate::engine::{EngineStatus, ReconciliationEngine, UnlockOutcome};
use crate::error::{EngineError, EngineResult};
use crate::events::EngineEvent;
use lockstep_types::{CommandKind, ConnectivitySample, InboundDirective, LockState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Why a pass was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Timer,
    ConnectivityRestored,
    CommandReceived,
    /// A UI surface came to the foreground; enforcement is re-applied first.
    Foregrounded,
    /// Someone entered an unlock code, whatever the verdict.
    UnlockAttempt,
    Manual,
}

enum Control {
    Trigger(Trigger),
    Shutdown,
}

/// When several triggers collapse into one pass, a foreground trigger must
/// survive so enforcement is re-applied.
fn merge(pending: Option<Trigger>, incoming: Trigger) -> Option<Trigger> {
    match (pending, incoming) {
        (_, Trigger::Foregrounded) => Some(Trigger::Foregrounded),
        (Some(existing), _) => Some(existing),
        (None, other) => Some(other),
    }
}

/// Cheap, cloneable access to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    engine: Arc<Mutex<ReconciliationEngine>>,
    connectivity: Arc<ConnectivityMonitor>,
    commands: Arc<CommandChannel>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<EngineEvent>,
    control: mpsc::UnboundedSender<Control>,
    passes: Arc<AtomicU64>,
}

impl EngineHandle {
    /// Requests a pass.
    pub fn trigger(&self, trigger: Trigger) -> EngineResult<()> {
        self.control
            .send(Control::Trigger(trigger))
            .map_err(|_| EngineError::Stopped)
    }

    /// Queues a pushed directive and requests a pass.
    pub fn enqueue(&self, directive: InboundDirective) -> EngineResult<CommandKind> {
        let kind = self.commands.push_directive(directive, self.clock.now())?;
        self.trigger(Trigger::CommandReceived)?;
        Ok(kind)
    }

    /// Feeds a reachability sample. Coming online triggers a pass.
    pub fn observe_connectivity(&self, sample: ConnectivitySample) -> bool {
        self.connectivity.observe(sample)
    }

    /// Same as [`observe_connectivity`](Self::observe_connectivity), stamped
    /// with the engine clock.
    pub fn set_online(&self, online: bool) -> bool {
        self.connectivity.set_online(online)
    }

    /// Checks a user-entered code, then requests a pass once the engine
    /// is free again.
    pub async fn attempt_unlock(&self, code: &str) -> EngineResult<UnlockOutcome> {
        let outcome = self.engine.lock().await.attempt_unlock(code).await;
        if self.trigger(Trigger::UnlockAttempt).is_err() {
            debug!("runner stopped; no pass after unlock attempt");
        }
        outcome
    }

    pub async fn admin_disabled(&self) -> EngineResult<LockState> {
        self.engine.lock().await.admin_disabled().await
    }

    pub async fn register_push_token(&self, token: &str) -> EngineResult<bool> {
        self.engine.lock().await.register_push_token(token).await
    }

    pub async fn status(&self) -> EngineResult<EngineStatus> {
        self.engine.lock().await.status()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    /// Passes run since the runner started.
    pub fn pass_count(&self) -> u64 {
        self.passes.load(Ordering::SeqCst)
    }

    /// Stops the runner after any in-flight pass.
    pub fn shutdown(&self) {
        // Already stopped is fine.
        let _ = self.control.send(Control::Shutdown);
    }
}

pub struct EngineRunner {
    engine: Arc<Mutex<ReconciliationEngine>>,
    control: mpsc::UnboundedReceiver<Control>,
    connectivity: broadcast::Receiver<ConnectivitySample>,
    poll_interval: Duration,
    passes: Arc<AtomicU64>,
}

impl EngineRunner {
    pub fn new(engine: ReconciliationEngine) -> (Self, EngineHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connectivity = Arc::clone(engine.connectivity());
        let commands = Arc::clone(engine.commands());
        let clock = Arc::clone(engine.clock());
        let events = engine.event_sender();
        let poll_interval = engine.config().poll_interval;
        let transitions = connectivity.subscribe();
        let engine = Arc::new(Mutex::new(engine));
        let passes = Arc::new(AtomicU64::new(0));

        let handle = EngineHandle {
            engine: Arc::clone(&engine),
            connectivity,
            commands,
            clock,
            events,
            control: tx,
            passes: Arc::clone(&passes),
        };
        let runner = Self {
            engine,
            control: rx,
            connectivity: transitions,
            poll_interval,
            passes,
        };
        (runner, handle)
    }

    /// Starts the runner on the current tokio runtime.
    pub fn spawn(engine: ReconciliationEngine) -> (EngineHandle, JoinHandle<()>) {
        let (runner, handle) = Self::new(engine);
        (handle, tokio::spawn(runner.run()))
    }

    /// Re-applies the persisted state, runs an initial pass, then serves
    /// triggers until shut down or every handle is dropped.
    pub async fn run(mut self) {
        if let Err(e) = self.engine.lock().await.resume() {
            warn!(error = %e, "could not re-apply lock state at startup");
        }

        let period = self.poll_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut next = Some(Trigger::Manual);
        'serve: loop {
            while let Some(trigger) = next.take() {
                self.pass(trigger).await;
                ticker.reset();
                match self.collect_pending() {
                    Some(follow_up) => next = follow_up,
                    None => break 'serve,
                }
            }

            next = tokio::select! {
                _ = ticker.tick() => Some(Trigger::Timer),
                control = self.control.recv() => match control {
                    Some(Control::Trigger(trigger)) => Some(trigger),
                    Some(Control::Shutdown) | None => break 'serve,
                },
                sample = self.connectivity.recv() => match sample {
                    Ok(sample) if sample.online => Some(Trigger::ConnectivityRestored),
                    Ok(_) => None,
                    Err(broadcast::error::RecvError::Lagged(_)) => Some(Trigger::ConnectivityRestored),
                    Err(broadcast::error::RecvError::Closed) => break 'serve,
                },
            };
        }
        info!("engine runner stopped");
    }

    /// Drains triggers that queued up during a pass into at most one
    /// follow-up. `None` means shut down.
    fn collect_pending(&mut self) -> Option<Option<Trigger>> {
        let mut follow_up = None;
        loop {
            match self.control.try_recv() {
                Ok(Control::Trigger(trigger)) => follow_up = merge(follow_up, trigger),
                Ok(Control::Shutdown) | Err(mpsc::error::TryRecvError::Disconnected) => {
                    return None;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
            }
        }
        loop {
            match self.connectivity.try_recv() {
                Ok(sample) if !sample.online => {}
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {
                    follow_up = merge(follow_up, Trigger::ConnectivityRestored);
                }
                Err(_) => break,
            }
        }
        Some(follow_up)
    }

    async fn pass(&self, trigger: Trigger) {
        let mut engine = self.engine.lock().await;
        if trigger == Trigger::Foregrounded {
            if let Err(e) = engine.resume() {
                warn!(?trigger, error = %e, "could not re-apply lock state");
            }
        }
        match engine.reconcile().await {
            Ok(report) => debug!(
                ?trigger,
                locked = report.state.is_locked(),
                transitioned = report.transitioned,
                "pass finished"
            ),
            Err(EngineError::NotEnrolled) => debug!(?trigger, "not enrolled; pass skipped"),
            Err(e) => warn!(?trigger, error = %e, "pass failed"),
        }
        self.passes.fetch_add(1, Ordering::SeqCst);
    }
}
