use lockstep_engine::{EnforcementError, PolicyEnforcer};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Host enforcer: records restricted mode and logs each change.
///
/// Kiosk APIs are platform specific, so this only tracks the mode. The
/// persisted decision is what `GET /api/v1/status` reports under `lock`.
#[derive(Debug, Default)]
pub struct LoggingEnforcer {
    restricted: AtomicBool,
}

impl LoggingEnforcer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_restricted(&self) -> bool {
        self.restricted.load(Ordering::SeqCst)
    }

    fn apply(&self, restricted: bool) {
        if self.restricted.swap(restricted, Ordering::SeqCst) == restricted {
            debug!(restricted, "restricted mode unchanged");
        } else {
            info!(restricted, "restricted mode changed");
        }
    }
}

impl PolicyEnforcer for LoggingEnforcer {
    fn enter_restricted_mode(&self) -> Result<(), EnforcementError> {
        self.apply(true);
        Ok(())
    }

    fn exit_restricted_mode(&self) -> Result<(), EnforcementError> {
        self.apply(false);
        Ok(())
    }
}
