//! Test doubles shared by this crate's tests and the agent's.

use crate::error::EnforcementError;
use crate::policy::PolicyEnforcer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// One call made on a [`RecordingEnforcer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcerCall {
    Enter,
    Exit,
}

#[derive(Debug, Default)]
struct Recorded {
    calls: Vec<EnforcerCall>,
    restricted: bool,
    /// Calls that actually changed the mode.
    effects: usize,
}

/// An idempotent enforcer that records what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingEnforcer {
    recorded: Mutex<Recorded>,
    failing: AtomicBool,
}

impl RecordingEnforcer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail without changing the mode.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<EnforcerCall> {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .calls
            .clone()
    }

    pub fn is_restricted(&self) -> bool {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .restricted
    }

    /// Number of calls that changed the mode.
    pub fn effects(&self) -> usize {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .effects
    }

    fn record(&self, call: EnforcerCall) -> Result<(), EnforcementError> {
        let mut recorded = self.recorded.lock().unwrap_or_else(PoisonError::into_inner);
        recorded.calls.push(call);
        if self.failing.load(Ordering::SeqCst) {
            return Err(EnforcementError("lock task unavailable".into()));
        }
        let restricted = call == EnforcerCall::Enter;
        if recorded.restricted != restricted {
            recorded.restricted = restricted;
            recorded.effects += 1;
        }
        Ok(())
    }
}

impl PolicyEnforcer for RecordingEnforcer {
    fn enter_restricted_mode(&self) -> Result<(), EnforcementError> {
        self.record(EnforcerCall::Enter)
    }

    fn exit_restricted_mode(&self) -> Result<(), EnforcementError> {
        self.record(EnforcerCall::Exit)
    }
}
