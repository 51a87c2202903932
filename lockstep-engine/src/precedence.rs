//! Merging a pass's signals into one lock decision.
//!
//! Highest wins:
//!
//! 1. offline for at least the threshold locks with `OFFLINE_TIMEOUT`;
//! 2. a lock command or a poll reporting `is_locked` locks with
//!    `SERVER_DIRECTIVE`;
//! 3. an unlock command or a poll reporting not locked unlocks;
//! 4. otherwise the current state is held.
//!
//! The rules apply whatever the current reason is. `ADMIN_DISABLED` is
//! only ever entered outside this function and is left like any other lock.
//! An unknown poll result contributes nothing, so it can never unlock.

use chrono::{DateTime, Utc};
use lockstep_types::{CommandKind, LockReason, LockState, PendingCommand};

/// Net effect of the lock and unlock commands drained in one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Lock { unlock_code: Option<String> },
    Unlock,
}

impl Intent {
    /// Folds commands in arrival order; the last lock or unlock wins.
    pub fn from_commands<'a>(commands: impl IntoIterator<Item = &'a PendingCommand>) -> Option<Self> {
        commands.into_iter().fold(None, |net, command| match command.kind {
            CommandKind::Lock => Some(Self::Lock {
                unlock_code: command.payload.unlock_code.clone(),
            }),
            CommandKind::Unlock => Some(Self::Unlock),
            CommandKind::Reminder => net,
        })
    }
}

/// Everything a pass learned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signals {
    pub offline_exceeded: bool,
    pub intent: Option<Intent>,
    /// `None` when the poll failed.
    pub server_locked: Option<bool>,
}

/// Returns the state the device should be in after this pass.
///
/// When the decision is unchanged the current state is returned as is,
/// except that a lock command's unlock code replaces the stored one.
pub fn resolve(current: &LockState, signals: &Signals, now: DateTime<Utc>) -> LockState {
    let unlock_command = signals.intent == Some(Intent::Unlock);
    let (reason, code) = if signals.offline_exceeded {
        (LockReason::OfflineTimeout, None)
    } else if let Some(Intent::Lock { unlock_code }) = &signals.intent {
        (LockReason::ServerDirective, unlock_code.clone())
    } else if signals.server_locked == Some(true) {
        (LockReason::ServerDirective, None)
    } else if unlock_command || signals.server_locked == Some(false) {
        (LockReason::None, None)
    } else {
        return current.clone();
    };

    let target = if reason == LockReason::None {
        LockState::unlocked(now)
    } else {
        LockState::locked(reason, code.clone(), now)
    };

    if !target.same_decision(current) {
        // A fresh lock keeps a code delivered earlier unless a new one came.
        return match (target.is_locked(), code) {
            (true, None) => target.with_unlock_code(current.unlock_code().map(str::to_string)),
            _ => target,
        };
    }
    match code {
        Some(code) => current.clone().with_unlock_code(Some(code)),
        None => current.clone(),
    }
}
