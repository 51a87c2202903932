//! Error types for the engine.

use lockstep_backend::FailureCause;
use lockstep_store::StorageError;
use lockstep_types::EnrollmentState;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The backend could not be reached, or timed out. Retriable.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// The backend gave an authoritative "no". Carries its message verbatim.
    #[error("{0}")]
    ServerRejection(String),

    /// The backend answered with something that did not decode.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The state store refused a write; the pass was aborted.
    #[error("persistence failure: {0}")]
    PersistenceFailure(#[from] StorageError),

    #[error("policy enforcement failed: {0}")]
    PolicyEnforcementFailure(#[from] EnforcementError),

    /// The device has no identity yet.
    #[error("device is not enrolled")]
    NotEnrolled,

    #[error("cannot {action} while {state}")]
    InvalidTransition {
        state: EnrollmentState,
        action: &'static str,
    },

    /// An inbound directive could not be understood.
    #[error("invalid command: {0}")]
    InvalidCommand(#[from] lockstep_types::Error),

    #[error("unlock code is empty")]
    EmptyUnlockCode,

    /// The runner has shut down.
    #[error("engine stopped")]
    Stopped,
}

impl EngineError {
    /// Maps a backend failure onto the engine taxonomy.
    pub fn from_failure(cause: FailureCause) -> Self {
        match cause {
            FailureCause::Malformed(msg) => Self::MalformedResponse(msg),
            other @ (FailureCause::Network(_) | FailureCause::Timeout) => {
                Self::NetworkFailure(other.to_string())
            }
        }
    }

    /// Whether trying again later may succeed without user action.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::NetworkFailure(_)
                | Self::MalformedResponse(_)
                | Self::PersistenceFailure(_)
                | Self::PolicyEnforcementFailure(_)
        )
    }
}

/// A [`crate::PolicyEnforcer`] could not change restricted mode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct EnforcementError(pub String);
