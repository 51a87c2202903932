//! A scripted [`BackendClient`] for tests.
//!
//! Each call pops the next queued outcome for its operation, falling back to
//! a per-operation default. Every call is recorded so tests can assert on
//! what the engine sent.

use crate::client::BackendClient;
use crate::outcome::{FailureCause, Outcome};
use crate::wire::{EnrollReply, EnrollRequest, LockNotice};
use async_trait::async_trait;
use lockstep_types::{ComplianceSnapshot, LockReason};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

fn unreachable_outcome<T>() -> Outcome<T> {
    Outcome::Unknown(FailureCause::Network("no scripted response".into()))
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Queue of scripted outcomes for one operation.
struct Script<T> {
    queued: VecDeque<Outcome<T>>,
    default: Outcome<T>,
}

impl<T: Clone> Script<T> {
    fn new() -> Self {
        Self {
            queued: VecDeque::new(),
            default: unreachable_outcome(),
        }
    }

    fn next(&mut self) -> Outcome<T> {
        self.queued
            .pop_front()
            .unwrap_or_else(|| self.default.clone())
    }
}

/// Calls observed by a [`ScriptedBackend`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordedCalls {
    pub enroll: Vec<EnrollRequest>,
    /// `(serial, is_online)` per poll.
    pub polls: Vec<(String, bool)>,
    /// `(serial, code)` per verification.
    pub unlock_codes: Vec<(String, String)>,
    pub lock_notices: Vec<(String, LockReason)>,
    pub admin_disabled: Vec<String>,
    pub push_tokens: Vec<(String, String)>,
}

pub struct ScriptedBackend {
    enroll: Mutex<Script<EnrollReply>>,
    poll: Mutex<Script<ComplianceSnapshot>>,
    verify: Mutex<Script<String>>,
    notify_locked: Mutex<Script<LockNotice>>,
    notify_admin: Mutex<Script<()>>,
    push_token: Mutex<Script<()>>,
    poll_delay: Mutex<Option<Duration>>,
    enroll_delay: Mutex<Option<Duration>>,
    calls: Mutex<RecordedCalls>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    /// A backend that answers every call with a network failure.
    #[must_use]
    pub fn new() -> Self {
        Self {
            enroll: Mutex::new(Script::new()),
            poll: Mutex::new(Script::new()),
            verify: Mutex::new(Script::new()),
            notify_locked: Mutex::new(Script::new()),
            notify_admin: Mutex::new(Script::new()),
            push_token: Mutex::new(Script::new()),
            poll_delay: Mutex::new(None),
            enroll_delay: Mutex::new(None),
            calls: Mutex::new(RecordedCalls::default()),
        }
    }

    /// A backend whose polls report an unlocked, paid-up device.
    #[must_use]
    pub fn healthy() -> Self {
        let backend = Self::new();
        backend.set_poll_default(Outcome::Success(ComplianceSnapshot::default()));
        backend.set_notify_locked_default(Outcome::Success(LockNotice::default()));
        backend.set_notify_admin_default(Outcome::Success(()));
        backend.set_push_token_default(Outcome::Success(()));
        backend
    }

    pub fn push_enroll(&self, outcome: Outcome<EnrollReply>) {
        lock(&self.enroll).queued.push_back(outcome);
    }

    pub fn push_poll(&self, outcome: Outcome<ComplianceSnapshot>) {
        lock(&self.poll).queued.push_back(outcome);
    }

    pub fn set_poll_default(&self, outcome: Outcome<ComplianceSnapshot>) {
        lock(&self.poll).default = outcome;
    }

    pub fn push_verify(&self, outcome: Outcome<String>) {
        lock(&self.verify).queued.push_back(outcome);
    }

    pub fn push_notify_locked(&self, outcome: Outcome<LockNotice>) {
        lock(&self.notify_locked).queued.push_back(outcome);
    }

    pub fn set_notify_locked_default(&self, outcome: Outcome<LockNotice>) {
        lock(&self.notify_locked).default = outcome;
    }

    pub fn set_notify_admin_default(&self, outcome: Outcome<()>) {
        lock(&self.notify_admin).default = outcome;
    }

    pub fn set_push_token_default(&self, outcome: Outcome<()>) {
        lock(&self.push_token).default = outcome;
    }

    /// Delays every poll, so tests can hold a pass in flight.
    pub fn set_poll_delay(&self, delay: Option<Duration>) {
        *lock(&self.poll_delay) = delay;
    }

    /// Delays every enrollment request.
    pub fn set_enroll_delay(&self, delay: Option<Duration>) {
        *lock(&self.enroll_delay) = delay;
    }

    /// Everything recorded so far.
    pub fn calls(&self) -> RecordedCalls {
        lock(&self.calls).clone()
    }

    pub fn poll_count(&self) -> usize {
        lock(&self.calls).polls.len()
    }
}

#[async_trait]
impl BackendClient for ScriptedBackend {
    async fn enroll(&self, request: &EnrollRequest) -> Outcome<EnrollReply> {
        lock(&self.calls).enroll.push(request.clone());
        let delay = *lock(&self.enroll_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.enroll).next()
    }

    async fn poll_status(&self, serial: &str, is_online: bool) -> Outcome<ComplianceSnapshot> {
        lock(&self.calls).polls.push((serial.to_string(), is_online));
        let delay = *lock(&self.poll_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.poll).next()
    }

    async fn verify_unlock_code(&self, serial: &str, code: &str) -> Outcome<String> {
        lock(&self.calls)
            .unlock_codes
            .push((serial.to_string(), code.to_string()));
        lock(&self.verify).next()
    }

    async fn notify_locked(&self, serial: &str, reason: LockReason) -> Outcome<LockNotice> {
        lock(&self.calls)
            .lock_notices
            .push((serial.to_string(), reason));
        lock(&self.notify_locked).next()
    }

    async fn notify_admin_disabled(&self, serial: &str) -> Outcome<()> {
        lock(&self.calls).admin_disabled.push(serial.to_string());
        lock(&self.notify_admin).next()
    }

    async fn register_push_token(&self, serial: &str, token: &str) -> Outcome<()> {
        lock(&self.calls)
            .push_tokens
            .push((serial.to_string(), token.to_string()));
        lock(&self.push_token).next()
    }
}
