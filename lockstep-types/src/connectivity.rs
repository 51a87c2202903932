use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single reachability observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivitySample {
    pub online: bool,
    pub observed_at: DateTime<Utc>,
}

impl ConnectivitySample {
    #[must_use]
    pub fn online(at: DateTime<Utc>) -> Self {
        Self {
            online: true,
            observed_at: at,
        }
    }

    #[must_use]
    pub fn offline(at: DateTime<Utc>) -> Self {
        Self {
            online: false,
            observed_at: at,
        }
    }
}
