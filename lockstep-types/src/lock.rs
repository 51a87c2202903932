//! The canonical lock state.
//!
//! `LockState` is owned by the reconciliation engine. Its constructors keep
//! the invariant `reason != None` iff `locked`, and decoding from storage
//! rejects values that break it.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Why the device is locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockReason {
    /// Not locked.
    None,
    /// Unreachable for longer than the configured threshold.
    OfflineTimeout,
    /// The backend (poll or pushed command) asked for a lock.
    ServerDirective,
    /// Administrative elevation was revoked on the device.
    AdminDisabled,
}

impl LockReason {
    /// Stable string form used in persisted state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::OfflineTimeout => "OFFLINE_TIMEOUT",
            Self::ServerDirective => "SERVER_DIRECTIVE",
            Self::AdminDisabled => "ADMIN_DISABLED",
        }
    }
}

impl fmt::Display for LockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockReason {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "NONE" => Ok(Self::None),
            "OFFLINE_TIMEOUT" => Ok(Self::OfflineTimeout),
            "SERVER_DIRECTIVE" => Ok(Self::ServerDirective),
            "ADMIN_DISABLED" => Ok(Self::AdminDisabled),
            other => Err(Error::UnknownValue {
                field: "lock.reason",
                value: other.to_string(),
            }),
        }
    }
}

/// Current lock decision for the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockState {
    locked: bool,
    reason: LockReason,
    unlock_code: Option<String>,
    last_changed_at: DateTime<Utc>,
}

impl LockState {
    /// An unlocked state recorded at `at`.
    #[must_use]
    pub fn unlocked(at: DateTime<Utc>) -> Self {
        Self {
            locked: false,
            reason: LockReason::None,
            unlock_code: None,
            last_changed_at: at,
        }
    }

    /// A locked state. Passing `LockReason::None` is a programming error and
    /// is coerced to `ServerDirective` so the invariant still holds.
    #[must_use]
    pub fn locked(reason: LockReason, unlock_code: Option<String>, at: DateTime<Utc>) -> Self {
        let reason = match reason {
            LockReason::None => LockReason::ServerDirective,
            other => other,
        };
        Self {
            locked: true,
            reason,
            unlock_code,
            last_changed_at: at,
        }
    }

    /// Rebuilds a state from its persisted parts, validating the invariant.
    pub fn from_parts(
        locked: bool,
        reason: LockReason,
        unlock_code: Option<String>,
        last_changed_at: DateTime<Utc>,
    ) -> Result<Self> {
        if locked == (reason == LockReason::None) {
            return Err(Error::InconsistentLockState(format!(
                "locked={locked} with reason {reason}"
            )));
        }
        Ok(Self {
            locked,
            reason,
            unlock_code,
            last_changed_at,
        })
    }

    /// Returns whether the device is locked.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Returns the lock reason (`None` when unlocked).
    #[must_use]
    pub fn reason(&self) -> LockReason {
        self.reason
    }

    /// Returns the unlock code delivered with the lock, if any.
    #[must_use]
    pub fn unlock_code(&self) -> Option<&str> {
        self.unlock_code.as_deref()
    }

    /// Returns when the state last changed.
    #[must_use]
    pub fn last_changed_at(&self) -> DateTime<Utc> {
        self.last_changed_at
    }

    /// Returns a copy carrying `code` as its unlock code. No-op when unlocked.
    #[must_use]
    pub fn with_unlock_code(mut self, code: Option<String>) -> Self {
        if self.locked {
            self.unlock_code = code;
        }
        self
    }

    /// Whether `other` is the same decision (ignores timestamps and codes).
    #[must_use]
    pub fn same_decision(&self, other: &LockState) -> bool {
        self.locked == other.locked && self.reason == other.reason
    }
}
