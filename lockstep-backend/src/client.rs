//! The backend contract consumed by the engine.

use crate::outcome::Outcome;
use crate::wire::{EnrollReply, EnrollRequest, LockNotice};
use async_trait::async_trait;
use lockstep_types::{ComplianceSnapshot, LockReason};

/// Calls the agent makes against the backend.
///
/// Implementations must bound every call with a timeout and must not retry.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Registers the device. `Success` only when the server accepted it.
    async fn enroll(&self, request: &EnrollRequest) -> Outcome<EnrollReply>;

    /// Reports reachability and fetches the current compliance snapshot.
    async fn poll_status(&self, serial: &str, is_online: bool) -> Outcome<ComplianceSnapshot>;

    /// Checks a user-entered unlock code. `Success` carries the server's
    /// confirmation message; a wrong code is `Rejected` with its message.
    async fn verify_unlock_code(&self, serial: &str, code: &str) -> Outcome<String>;

    /// Tells the server the device locked itself.
    async fn notify_locked(&self, serial: &str, reason: LockReason) -> Outcome<LockNotice>;

    /// Tells the server administrative elevation was revoked.
    async fn notify_admin_disabled(&self, serial: &str) -> Outcome<()>;

    /// Registers the push-channel token for this device.
    async fn register_push_token(&self, serial: &str, token: &str) -> Outcome<()>;
}
