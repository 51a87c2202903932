//! Out-of-band commands delivered by the push channel.
//!
//! Commands are hints: they trigger a reconciliation pass and contribute a
//! lock or unlock intent, but the engine decides the resulting state.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Lock,
    Unlock,
    Reminder,
}

impl CommandKind {
    /// Parses a wire `action` value. `payment_reminder` is accepted as an
    /// alias of `reminder`.
    pub fn from_action(action: &str) -> Result<Self> {
        match action.trim() {
            "lock" => Ok(Self::Lock),
            "unlock" => Ok(Self::Unlock),
            "reminder" | "payment_reminder" => Ok(Self::Reminder),
            other => Err(Error::UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lock => f.write_str("lock"),
            Self::Unlock => f.write_str("unlock"),
            Self::Reminder => f.write_str("reminder"),
        }
    }
}

/// Optional fields carried by a directive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandPayload {
    pub unlock_code: Option<String>,
    pub title: Option<String>,
    pub message: Option<String>,
    pub next_payment_date: Option<String>,
    pub amount_due: Option<String>,
    pub amount_paid: Option<String>,
    pub payment_instructions: Option<String>,
    pub contact_phone: Option<String>,
}

/// A directive as it arrives on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundDirective {
    pub action: String,
    #[serde(flatten)]
    pub payload: CommandPayload,
}

/// A queued command awaiting the next reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCommand {
    pub kind: CommandKind,
    pub payload: CommandPayload,
    pub received_at: DateTime<Utc>,
}

impl PendingCommand {
    /// Builds a pending command from a wire directive.
    pub fn from_directive(directive: InboundDirective, received_at: DateTime<Utc>) -> Result<Self> {
        let kind = CommandKind::from_action(&directive.action)?;
        Ok(Self {
            kind,
            payload: directive.payload,
            received_at,
        })
    }

    /// Shorthand for a command with no payload.
    #[must_use]
    pub fn bare(kind: CommandKind, received_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            payload: CommandPayload::default(),
            received_at,
        }
    }
}
