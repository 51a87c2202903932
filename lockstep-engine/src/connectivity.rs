//! Reachability tracking.
//!
//! The monitor folds platform reachability samples into two facts the
//! engine needs: whether the device is online right now, and when it was
//! last seen online. The latter is persisted so the offline fail-safe
//! survives restarts.

use crate::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use lockstep_store::layout::{self, keys};
use lockstep_store::{DurableStateStore, WriteBatch};
use lockstep_types::ConnectivitySample;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct Reachability {
    /// `None` until the first sample; treated as offline.
    online: Option<bool>,
    last_online_at: Option<DateTime<Utc>>,
}

pub struct ConnectivityMonitor {
    store: Arc<dyn DurableStateStore>,
    clock: Arc<dyn Clock>,
    inner: Mutex<Reachability>,
    transitions: broadcast::Sender<ConnectivitySample>,
}

impl ConnectivityMonitor {
    /// Creates a monitor, restoring `lastOnlineAt` from the store.
    pub fn new(store: Arc<dyn DurableStateStore>, clock: Arc<dyn Clock>) -> Self {
        let last_online_at = match layout::load_time(store.as_ref(), keys::CONNECTIVITY_LAST_ONLINE_AT)
        {
            Ok(at) => at,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable lastOnlineAt");
                None
            }
        };
        let (transitions, _) = broadcast::channel(16);
        Self {
            store,
            clock,
            inner: Mutex::new(Reachability {
                online: None,
                last_online_at,
            }),
            transitions,
        }
    }

    /// Records a sample. Returns `true` when it moves the device online.
    pub fn observe(&self, sample: ConnectivitySample) -> bool {
        let (changed, became_online) = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let was_online = inner.online == Some(true);
            let changed = inner.online != Some(sample.online);
            inner.online = Some(sample.online);
            if sample.online {
                inner.last_online_at = Some(
                    inner
                        .last_online_at
                        .map_or(sample.observed_at, |prev| prev.max(sample.observed_at)),
                );
            }
            (changed, sample.online && !was_online)
        };

        if sample.online {
            self.persist_last_online(sample.observed_at);
        }
        if changed {
            info!(online = sample.online, "connectivity changed");
            // No subscribers is fine.
            let _ = self.transitions.send(sample);
        }
        became_online
    }

    /// Convenience for `observe` stamped with the current time.
    pub fn set_online(&self, online: bool) -> bool {
        let now = self.clock.now();
        self.observe(ConnectivitySample {
            online,
            observed_at: now,
        })
    }

    /// Point-in-time reachability. `false` until a sample has been observed.
    pub fn is_online(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .online
            .unwrap_or(false)
    }

    pub fn last_online_at(&self) -> Option<DateTime<Utc>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_online_at
    }

    /// How long the device has been unreachable as of `now`.
    ///
    /// Zero while online or when there is no reference point.
    pub fn offline_duration(&self, now: DateTime<Utc>) -> Duration {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.online == Some(true) {
            return Duration::zero();
        }
        inner
            .last_online_at
            .map_or_else(Duration::zero, |at| (now - at).max(Duration::zero()))
    }

    /// Seeds `lastOnlineAt` with `now` if it was never recorded, so a device
    /// that is never seen online still reaches the fail-safe threshold.
    pub fn ensure_baseline(&self, now: DateTime<Utc>) {
        let seeded = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.last_online_at.is_some() {
                false
            } else {
                inner.last_online_at = Some(now);
                true
            }
        };
        if seeded {
            self.persist_last_online(now);
        }
    }

    /// Online/offline transitions, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivitySample> {
        self.transitions.subscribe()
    }

    fn persist_last_online(&self, at: DateTime<Utc>) {
        let mut batch = WriteBatch::new();
        layout::put_time(&mut batch, keys::CONNECTIVITY_LAST_ONLINE_AT, at);
        if let Err(e) = self.store.apply(batch) {
            warn!(error = %e, "failed to persist lastOnlineAt");
        }
    }
}
