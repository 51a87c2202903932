use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a call produced no trustworthy answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureCause {
    /// Connection failed or the server returned a transient error.
    Network(String),
    /// The call exceeded its timeout.
    Timeout,
    /// The server answered with something that did not decode.
    Malformed(String),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::Timeout => f.write_str("request timed out"),
            Self::Malformed(msg) => write!(f, "malformed response: {msg}"),
        }
    }
}

/// Tri-state result of a backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Success(T),
    /// Authoritative negative answer, with the server's message.
    Rejected(String),
    Unknown(FailureCause),
}

impl<T> Outcome<T> {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The success value, discarding rejections and failures.
    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(v) => Some(v),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success(v) => Outcome::Success(f(v)),
            Self::Rejected(msg) => Outcome::Rejected(msg),
            Self::Unknown(cause) => Outcome::Unknown(cause),
        }
    }
}
