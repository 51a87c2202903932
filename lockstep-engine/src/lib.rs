//! Compliance reconciliation engine for the lockstep agent.
//!
//! The engine keeps one decision, whether the device is locked into
//! restricted mode, consistent with three unreliable inputs: periodic status
//! polls against the backend, pushed commands, and how long the device has
//! been offline.
//!
//! - [`ConnectivityMonitor`] tracks reachability and `lastOnlineAt`
//! - [`CommandChannel`] queues pushed directives until the next pass
//! - [`EnrollmentWorkflow`] produces the device identity the engine needs
//! - [`ReconciliationEngine`] merges the inputs, persists the result and
//!   drives the [`PolicyEnforcer`]
//! - [`EngineRunner`] serializes passes and coalesces triggers
//!
//! Offline for longer than the configured threshold always locks. A failed
//! poll never unlocks.

mod clock;
mod commands;
mod config;
mod connectivity;
mod engine;
mod enrollment;
mod error;
mod events;
mod policy;
pub mod precedence;
mod probe;
mod runner;
pub mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use commands::CommandChannel;
pub use config::EngineConfig;
pub use connectivity::ConnectivityMonitor;
pub use engine::{EngineStatus, PassReport, ReconciliationEngine, UnlockOutcome};
pub use enrollment::{select_serial, EnrollmentWorkflow};
pub use error::{EnforcementError, EngineError, EngineResult};
pub use events::EngineEvent;
pub use policy::PolicyEnforcer;
pub use probe::{DeviceFacts, DeviceProbe, Elevation, HostProbe};
pub use runner::{EngineHandle, EngineRunner, Trigger};
