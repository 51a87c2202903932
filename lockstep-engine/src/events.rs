use lockstep_types::{ComplianceSnapshot, LockState};
use serde::Serialize;

/// Notifications for UI surfaces attached through
/// [`crate::ReconciliationEngine::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// The lock decision changed.
    LockChanged(LockState),
    /// A poll succeeded and refreshed the display cache.
    SnapshotUpdated(ComplianceSnapshot),
    Reminder {
        title: Option<String>,
        message: String,
    },
    /// The next payment falls within the reminder window.
    PaymentDue {
        next_payment_date: String,
        days_left: i64,
    },
}
