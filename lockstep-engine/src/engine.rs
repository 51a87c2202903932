//! The reconciliation engine.
//!
//! One pass: drain commands, poll the backend, read the offline duration,
//! resolve the target state (see [`crate::precedence`]), persist the result
//! together with the refreshed display cache in a single batch, then bring
//! the policy enforcer in line with the persisted state.
//!
//! The backend is told about an offline lock in the background. Whatever it
//! hands back (an unlock code, a contact number) is folded in by the next
//! pass.
//!
//! Enforcement is state-driven. The engine remembers what it last applied
//! and re-applies whenever that differs from the persisted state, so a
//! failed enforcement is retried by the next pass.

use crate::clock::Clock;
use crate::commands::CommandChannel;
use crate::config::EngineConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::{EnforcementError, EngineError, EngineResult};
use crate::events::EngineEvent;
use crate::policy::PolicyEnforcer;
use crate::precedence::{self, Intent, Signals};
use chrono::{DateTime, Utc};
use lockstep_backend::{BackendClient, FailureCause, LockNotice, Outcome};
use lockstep_store::layout::{self, keys};
use lockstep_store::{DurableStateStore, WriteBatch};
use lockstep_types::{
    CommandKind, CommandPayload, ComplianceSnapshot, DeviceIdentity, DisplayCache,
    EnrollmentState, LockReason, LockState,
};
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Result of a manual unlock that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnlockOutcome {
    /// The server confirmed the code; carries its message.
    Unlocked { message: String },
    /// Nothing to do.
    AlreadyUnlocked,
}

/// What a reconciliation pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub state: LockState,
    /// Whether the lock decision changed.
    pub transitioned: bool,
    /// Whether the poll succeeded and refreshed the display cache.
    pub snapshot_refreshed: bool,
    pub commands_applied: usize,
    pub enforcement_error: Option<EnforcementError>,
}

/// Read-only view for status surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub enrollment: EnrollmentState,
    pub identity: Option<DeviceIdentity>,
    pub lock: LockState,
    pub display: DisplayCache,
    pub online: bool,
}

/// Caps a backend call at `limit`; running out counts as a timeout.
pub(crate) async fn bounded<T>(limit: Duration, call: impl Future<Output = Outcome<T>>) -> Outcome<T> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Outcome::Unknown(FailureCause::Timeout))
}

pub struct ReconciliationEngine {
    config: EngineConfig,
    store: Arc<dyn DurableStateStore>,
    backend: Arc<dyn BackendClient>,
    enforcer: Arc<dyn PolicyEnforcer>,
    connectivity: Arc<ConnectivityMonitor>,
    commands: Arc<CommandChannel>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<EngineEvent>,
    /// Lock bit last applied to the enforcer; `None` when unknown.
    enforced: Option<bool>,
    /// Reply to the last offline-lock notice, not yet applied.
    lock_notice: Arc<Mutex<Option<LockNotice>>>,
}

impl ReconciliationEngine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn DurableStateStore>,
        backend: Arc<dyn BackendClient>,
        enforcer: Arc<dyn PolicyEnforcer>,
        connectivity: Arc<ConnectivityMonitor>,
        commands: Arc<CommandChannel>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            config,
            store,
            backend,
            enforcer,
            connectivity,
            commands,
            clock,
            events,
            enforced: None,
            lock_notice: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }

    pub fn commands(&self) -> &Arc<CommandChannel> {
        &self.commands
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Attaches a listener for lock changes, snapshots and reminders.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<EngineEvent> {
        self.events.clone()
    }

    /// The persisted lock state; unlocked if none was ever written.
    pub fn lock_state(&self) -> EngineResult<LockState> {
        Ok(layout::load_lock_state(self.store.as_ref())?
            .unwrap_or_else(|| LockState::unlocked(DateTime::<Utc>::UNIX_EPOCH)))
    }

    pub fn identity(&self) -> EngineResult<Option<DeviceIdentity>> {
        Ok(layout::load_identity(self.store.as_ref())?)
    }

    pub fn display_cache(&self) -> EngineResult<DisplayCache> {
        Ok(layout::load_display_cache(self.store.as_ref())?)
    }

    pub fn status(&self) -> EngineResult<EngineStatus> {
        Ok(EngineStatus {
            enrollment: layout::load_enrollment_state(self.store.as_ref())?,
            identity: self.identity()?,
            lock: self.lock_state()?,
            display: self.display_cache()?,
            online: self.connectivity.is_online(),
        })
    }

    /// Re-applies the persisted state to the enforcer unconditionally.
    ///
    /// Called at startup and when a UI surface comes to the foreground.
    pub fn resume(&mut self) -> EngineResult<LockState> {
        let state = self.lock_state()?;
        self.enforced = None;
        self.enforce(state.is_locked())?;
        info!(locked = state.is_locked(), reason = %state.reason(), "lock state re-applied");
        Ok(state)
    }

    /// Runs one reconciliation pass.
    pub async fn reconcile(&mut self) -> EngineResult<PassReport> {
        let identity = self.identity()?.ok_or(EngineError::NotEnrolled)?;
        let serial = identity.serial_number.as_str();
        let now = self.clock.now();
        let stored = self.lock_state()?;
        let notice = self.take_lock_notice();
        let current = match notice.as_ref().and_then(|n| n.unlock_code.clone()) {
            Some(code) if stored.is_locked() => stored.clone().with_unlock_code(Some(code)),
            _ => stored.clone(),
        };

        self.connectivity.ensure_baseline(now);
        let offline = self.connectivity.offline_duration(now);
        let offline_exceeded = offline >= self.config.offline_threshold();

        let drained = self.commands.drain();
        let intent = Intent::from_commands(&drained);
        let reminders: Vec<&CommandPayload> = drained
            .iter()
            .filter(|c| c.kind == CommandKind::Reminder)
            .map(|c| &c.payload)
            .filter(|p| p.message.as_deref().is_some_and(|m| !m.trim().is_empty()))
            .collect();

        let poll = bounded(
            self.config.request_timeout,
            self.backend
                .poll_status(serial, self.connectivity.is_online()),
        )
        .await;
        let snapshot = match poll {
            Outcome::Success(snapshot) => Some(snapshot),
            Outcome::Rejected(message) => {
                warn!(serial, %message, "status poll rejected");
                None
            }
            Outcome::Unknown(cause) => {
                warn!(serial, %cause, "status poll failed; server state unknown");
                None
            }
        };

        let signals = Signals {
            offline_exceeded,
            intent,
            server_locked: snapshot.as_ref().map(|s| s.server_locked),
        };
        let target = precedence::resolve(&current, &signals, now);
        let transitioned = !target.same_decision(&current);

        let mut batch = WriteBatch::new();
        if target != stored {
            batch.extend(layout::lock_state_ops(&target));
        }
        if let Some(phone) = notice.as_ref().and_then(|n| n.contact_phone.as_deref()) {
            batch.put(keys::COMPLIANCE_CONTACT_PHONE, phone);
        }
        if let Some(snapshot) = &snapshot {
            batch.extend(layout::snapshot_ops(snapshot));
        }
        for payload in &reminders {
            batch.extend(layout::reminder_ops(payload));
        }
        if let Err(e) = self.store.apply(batch) {
            error!(error = %e, "failed to persist pass; aborting");
            self.commands.requeue_front(drained);
            if let Some(notice) = notice {
                self.restore_lock_notice(notice);
            }
            return Err(EngineError::PersistenceFailure(e));
        }

        if transitioned {
            info!(
                serial,
                from = %current.reason(),
                to = %target.reason(),
                offline_minutes = offline.num_minutes(),
                "lock state changed"
            );
            self.emit(EngineEvent::LockChanged(target.clone()));
        }

        let enforcement_error = self.enforce(target.is_locked()).err();

        if let Some(snapshot) = &snapshot {
            self.emit(EngineEvent::SnapshotUpdated(snapshot.clone()));
            if !target.is_locked() {
                self.check_payment_due(snapshot, now);
            }
        }
        for payload in &reminders {
            self.emit(EngineEvent::Reminder {
                title: payload.title.clone(),
                message: payload.message.clone().unwrap_or_default(),
            });
        }

        if transitioned && target.reason() == LockReason::OfflineTimeout {
            self.report_offline_lock(serial);
        }

        debug!(
            serial,
            commands = drained.len(),
            polled = snapshot.is_some(),
            "pass complete"
        );
        Ok(PassReport {
            state: target,
            transitioned,
            snapshot_refreshed: snapshot.is_some(),
            commands_applied: drained.len(),
            enforcement_error,
        })
    }

    /// Verifies a user-entered code with the backend and unlocks on success.
    ///
    /// A wrong code is `ServerRejection`; an unreachable backend is
    /// `NetworkFailure`. Either way the lock state is untouched.
    pub async fn attempt_unlock(&mut self, code: &str) -> EngineResult<UnlockOutcome> {
        let code = code.trim();
        if code.is_empty() {
            return Err(EngineError::EmptyUnlockCode);
        }
        let identity = self.identity()?.ok_or(EngineError::NotEnrolled)?;
        let current = self.lock_state()?;
        if !current.is_locked() {
            return Ok(UnlockOutcome::AlreadyUnlocked);
        }

        let serial = identity.serial_number.as_str();
        let outcome = bounded(
            self.config.request_timeout,
            self.backend.verify_unlock_code(serial, code),
        )
        .await;
        let message = match outcome {
            Outcome::Success(message) => message,
            Outcome::Rejected(message) => {
                info!(serial, %message, "unlock code rejected");
                return Err(EngineError::ServerRejection(message));
            }
            Outcome::Unknown(cause) => {
                warn!(serial, %cause, "unlock verification failed");
                return Err(EngineError::from_failure(cause));
            }
        };

        let target = LockState::unlocked(self.clock.now());
        self.store.apply(layout::lock_state_ops(&target))?;
        info!(serial, from = %current.reason(), "unlocked with verified code");
        self.emit(EngineEvent::LockChanged(target));
        if let Err(e) = self.enforce(false) {
            // The state is persisted; the next pass retries enforcement.
            warn!(error = %e, "unlock persisted but restricted mode still active");
        }
        Ok(UnlockOutcome::Unlocked { message })
    }

    /// Locks immediately because administrative elevation was revoked.
    ///
    /// The backend is told in the background; that call never delays or
    /// undoes the local lock. Works before enrollment completes.
    pub async fn admin_disabled(&mut self) -> EngineResult<LockState> {
        let current = self.lock_state()?;
        let target = if current.reason() == LockReason::AdminDisabled {
            current.clone()
        } else {
            LockState::locked(
                LockReason::AdminDisabled,
                current.unlock_code().map(str::to_string),
                self.clock.now(),
            )
        };

        let persisted = if target != current {
            self.store.apply(layout::lock_state_ops(&target))
        } else {
            Ok(())
        };
        // Lock locally even if the write failed.
        self.enforced = None;
        let enforced = self.enforce(true);

        if target != current {
            warn!(from = %current.reason(), "administrative elevation revoked; device locked");
            self.emit(EngineEvent::LockChanged(target.clone()));
        }

        match self.store.get_str(keys::DEVICE_SERIAL) {
            Ok(Some(serial)) => {
                let backend = Arc::clone(&self.backend);
                let limit = self.config.request_timeout;
                tokio::spawn(async move {
                    match bounded(limit, backend.notify_admin_disabled(&serial)).await {
                        Outcome::Success(()) => debug!(%serial, "admin-disabled notice delivered"),
                        Outcome::Rejected(message) => {
                            warn!(%serial, %message, "admin-disabled notice rejected");
                        }
                        Outcome::Unknown(cause) => {
                            warn!(%serial, %cause, "admin-disabled notice not delivered");
                        }
                    }
                });
            }
            Ok(None) => debug!("no serial yet; skipping admin-disabled notice"),
            Err(e) => warn!(error = %e, "could not read serial for admin-disabled notice"),
        }

        persisted?;
        enforced?;
        Ok(target)
    }

    /// Stores the push token and registers it with the backend once the
    /// device is enrolled.
    pub async fn register_push_token(&mut self, token: &str) -> EngineResult<bool> {
        self.store.set(keys::PUSH_TOKEN, token.into())?;
        let Some(identity) = self.identity()? else {
            debug!("not enrolled; push token stored for later");
            return Ok(false);
        };
        let serial = identity.serial_number;
        match bounded(
            self.config.request_timeout,
            self.backend.register_push_token(&serial, token),
        )
        .await
        {
            Outcome::Success(()) => {
                info!(%serial, "push token registered");
                Ok(true)
            }
            Outcome::Rejected(message) => Err(EngineError::ServerRejection(message)),
            Outcome::Unknown(cause) => Err(EngineError::from_failure(cause)),
        }
    }

    /// Brings the enforcer in line with `locked` if it is not already.
    fn enforce(&mut self, locked: bool) -> Result<(), EnforcementError> {
        if self.enforced == Some(locked) {
            return Ok(());
        }
        let result = if locked {
            self.enforcer.enter_restricted_mode()
        } else {
            self.enforcer.exit_restricted_mode()
        };
        match result {
            Ok(()) => {
                self.enforced = Some(locked);
                info!(restricted = locked, "restricted mode applied");
                Ok(())
            }
            Err(e) => {
                self.enforced = None;
                error!(restricted = locked, error = %e, "policy enforcement failed");
                Err(e)
            }
        }
    }

    /// Tells the backend about a fail-safe lock without holding up the pass.
    fn report_offline_lock(&self, serial: &str) {
        let serial = serial.to_string();
        let backend = Arc::clone(&self.backend);
        let limit = self.config.request_timeout;
        let slot = Arc::clone(&self.lock_notice);
        tokio::spawn(async move {
            let reply = backend.notify_locked(&serial, LockReason::OfflineTimeout);
            match bounded(limit, reply).await {
                Outcome::Success(notice) => {
                    debug!(%serial, "lock notice delivered");
                    *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(notice);
                }
                Outcome::Rejected(message) => warn!(%serial, %message, "lock notice rejected"),
                Outcome::Unknown(cause) => debug!(%serial, %cause, "lock notice not delivered"),
            }
        });
    }

    fn take_lock_notice(&self) -> Option<LockNotice> {
        self.lock_notice
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Puts back a reply a failed pass could not persist, unless a newer
    /// one arrived meanwhile.
    fn restore_lock_notice(&self, notice: LockNotice) {
        self.lock_notice
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(notice);
    }

    fn check_payment_due(&self, snapshot: &ComplianceSnapshot, now: DateTime<Utc>) {
        let Some(days_left) = snapshot.days_until_payment(now.date_naive()) else {
            return;
        };
        if (0..=i64::from(self.config.reminder_threshold_days)).contains(&days_left) {
            self.emit(EngineEvent::PaymentDue {
                next_payment_date: snapshot.next_payment_date.clone().unwrap_or_default(),
                days_left,
            });
        }
    }

    fn emit(&self, event: EngineEvent) {
        // Dropped when nobody is listening.
        let _ = self.events.send(event);
    }
}
