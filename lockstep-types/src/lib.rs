//! Core data model for the lockstep compliance agent.
//!
//! This crate defines the plain types shared by every layer of the agent:
//! - Device identifiers and the enrolled device identity
//! - The canonical lock state and its reasons
//! - The backend's compliance snapshot (display cache)
//! - Pending out-of-band commands and connectivity samples
//!
//! Nothing here performs I/O. Persistence lives in `lockstep-store`, the
//! backend transport in `lockstep-backend`, and the state machine in
//! `lockstep-engine`.

mod command;
mod compliance;
mod connectivity;
mod identity;
mod ids;
mod lock;

pub use command::{CommandKind, CommandPayload, InboundDirective, PendingCommand};
pub use compliance::{ComplianceSnapshot, DisplayCache};
pub use connectivity::ConnectivitySample;
pub use identity::{DeviceIdentity, EnrollmentState, SerialSource};
pub use ids::{DeviceId, LocalDeviceId};
pub use lock::{LockReason, LockState};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or decoding model types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("unknown command action: {0}")]
    UnknownAction(String),

    #[error("unknown value {value:?} for {field}")]
    UnknownValue { field: &'static str, value: String },

    #[error("inconsistent lock state: {0}")]
    InconsistentLockState(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
