//! Process host for the lockstep compliance engine.
//!
//! Wires the SQLite store, the HTTP backend client and the engine runner
//! together, and exposes a loopback HTTP API for the push bridge and lock
//! screen.

mod api;
mod config;
mod enforcer;
mod reachability;

pub use api::{
    build_router, ApiError, AppState, CommandAccepted, ConnectivityRequest, ConnectivityResponse,
    EnrollBody, EnrolledResponse, MessageResponse, PushTokenRequest, PushTokenResponse,
    UnlockRequest, UnlockResponse,
};
pub use config::{AgentConfig, ConfigError};
pub use enforcer::LoggingEnforcer;
pub use reachability::ReachabilityProbe;
