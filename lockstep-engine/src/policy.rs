use crate::error::EnforcementError;

/// Enters and leaves the OS-level restricted mode.
///
/// Both calls must be idempotent: entering twice has the same effect as
/// entering once.
pub trait PolicyEnforcer: Send + Sync {
    fn enter_restricted_mode(&self) -> Result<(), EnforcementError>;

    fn exit_restricted_mode(&self) -> Result<(), EnforcementError>;
}
