//! One-time enrollment: `Unenrolled → AdminPending → Identified → Enrolled`.
//!
//! The workflow owns the `device.*` and `enrollment.*` keys. Once the state
//! is `Enrolled` every step is a no-op.

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::engine::bounded;
use crate::error::{EngineError, EngineResult};
use crate::probe::{DeviceFacts, DeviceProbe, Elevation};
use lockstep_backend::{local_ip, BackendClient, EnrollRequest, Outcome};
use lockstep_store::layout::{self, keys};
use lockstep_store::{DurableStateStore, WriteBatch};
use lockstep_types::{DeviceId, DeviceIdentity, EnrollmentState, LocalDeviceId, SerialSource};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Picks the device identifier: IMEI when the agent owns the device and may
/// read it, then the hardware serial, then the manual serial, and finally a
/// generated placeholder. Never fails.
pub fn select_serial(facts: &DeviceFacts, manual_serial: Option<&str>) -> (String, SerialSource) {
    fn usable(value: Option<&str>) -> Option<String> {
        value
            .map(str::trim)
            .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("unknown"))
            .map(str::to_string)
    }

    if facts.elevation == Elevation::DeviceOwner && facts.phone_permission {
        if let Some(imei) = usable(facts.imei.as_deref()) {
            return (imei, SerialSource::Imei);
        }
    }
    if let Some(serial) = usable(facts.hardware_serial.as_deref()) {
        return (serial, SerialSource::HardwareSerial);
    }
    if let Some(manual) = usable(manual_serial) {
        return (manual, SerialSource::Manual);
    }
    let generated = Uuid::new_v4().simple().to_string()[..12].to_uppercase();
    (format!("GEN-{generated}"), SerialSource::Generated)
}

pub struct EnrollmentWorkflow {
    store: Arc<dyn DurableStateStore>,
    clock: Arc<dyn Clock>,
    request_timeout: Duration,
}

impl EnrollmentWorkflow {
    pub fn new(store: Arc<dyn DurableStateStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            request_timeout: EngineConfig::default().request_timeout,
        }
    }

    /// Bounds the enrollment request; defaults to the engine's timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn state(&self) -> EngineResult<EnrollmentState> {
        Ok(layout::load_enrollment_state(self.store.as_ref())?)
    }

    pub fn identity(&self) -> EngineResult<Option<DeviceIdentity>> {
        Ok(layout::load_identity(self.store.as_ref())?)
    }

    /// The serial chosen during identification, if any.
    pub fn serial(&self) -> EngineResult<Option<String>> {
        Ok(self.store.get_str(keys::DEVICE_SERIAL)?)
    }

    fn set_state(&self, batch: &mut WriteBatch, state: EnrollmentState) {
        batch.put(keys::ENROLLMENT_STATE, state.as_str());
    }

    /// `Unenrolled → AdminPending`. Later states are left alone.
    pub fn begin(&self) -> EngineResult<EnrollmentState> {
        let state = self.state()?;
        if state != EnrollmentState::Unenrolled {
            return Ok(state);
        }
        let mut batch = WriteBatch::new();
        self.set_state(&mut batch, EnrollmentState::AdminPending);
        self.store.apply(batch)?;
        info!("enrollment started, awaiting administrative elevation");
        Ok(EnrollmentState::AdminPending)
    }

    /// `AdminPending → Identified` once elevation is confirmed.
    ///
    /// May be repeated from `Identified` to correct the manual serial.
    pub fn confirm_admin(
        &self,
        probe: &dyn DeviceProbe,
        manual_serial: Option<&str>,
    ) -> EngineResult<EnrollmentState> {
        let state = self.state()?;
        match state {
            EnrollmentState::Enrolled => return Ok(state),
            EnrollmentState::Unenrolled => {
                return Err(EngineError::InvalidTransition {
                    state,
                    action: "confirm elevation",
                });
            }
            EnrollmentState::AdminPending | EnrollmentState::Identified => {}
        }

        let facts = probe.facts();
        if facts.elevation == Elevation::None {
            return Err(EngineError::InvalidTransition {
                state,
                action: "identify without elevation",
            });
        }

        let (serial, source) = select_serial(&facts, manual_serial);
        let local_id = match self.store.get_str(keys::DEVICE_LOCAL_ID)? {
            Some(id) => id,
            None => LocalDeviceId::new().to_string(),
        };

        let mut batch = WriteBatch::new();
        batch
            .put(keys::DEVICE_SERIAL, serial.as_str())
            .put(keys::DEVICE_SERIAL_SOURCE, source.as_str())
            .put(keys::DEVICE_LOCAL_ID, local_id)
            .put(keys::DEVICE_BRAND, facts.brand.as_str())
            .put(keys::DEVICE_MODEL, facts.model.as_str())
            .put_opt(keys::DEVICE_IMEI, facts.imei.as_deref());
        self.set_state(&mut batch, EnrollmentState::Identified);
        self.store.apply(batch)?;

        info!(serial = %serial, source = %source, "device identified");
        Ok(EnrollmentState::Identified)
    }

    /// `Identified → Enrolled`. On any failure the state stays `Identified`;
    /// the caller decides when to try again.
    pub async fn enroll(&self, backend: &dyn BackendClient) -> EngineResult<DeviceIdentity> {
        let state = self.state()?;
        match state {
            EnrollmentState::Enrolled => {
                return self.identity()?.ok_or(EngineError::NotEnrolled);
            }
            EnrollmentState::Identified => {}
            _ => {
                return Err(EngineError::InvalidTransition {
                    state,
                    action: "enroll",
                });
            }
        }

        let request = self.enroll_request()?;
        let reply = match bounded(self.request_timeout, backend.enroll(&request)).await {
            Outcome::Success(reply) => reply,
            Outcome::Rejected(message) => {
                warn!(serial = %request.serial_number, %message, "enrollment rejected");
                return Err(EngineError::ServerRejection(message));
            }
            Outcome::Unknown(cause) => {
                warn!(serial = %request.serial_number, %cause, "enrollment failed");
                return Err(EngineError::from_failure(cause));
            }
        };

        let identity = DeviceIdentity {
            device_id: reply
                .device_id
                .unwrap_or_else(|| DeviceId::new(request.device_id.clone())),
            serial_number: request.serial_number,
            enrolled_at: self.clock.now(),
        };
        let mut batch = layout::identity_ops(&identity);
        self.set_state(&mut batch, EnrollmentState::Enrolled);
        self.store.apply(batch)?;

        info!(
            device_id = %identity.device_id,
            serial = %identity.serial_number,
            message = %reply.message,
            "device enrolled"
        );
        Ok(identity)
    }

    /// Drives the whole workflow as far as it will go.
    pub async fn run(
        &self,
        probe: &dyn DeviceProbe,
        manual_serial: Option<&str>,
        backend: &dyn BackendClient,
    ) -> EngineResult<DeviceIdentity> {
        self.begin()?;
        self.confirm_admin(probe, manual_serial)?;
        self.enroll(backend).await
    }

    fn enroll_request(&self) -> EngineResult<EnrollRequest> {
        let store = self.store.as_ref();
        let required = |key: &'static str| -> EngineResult<String> {
            store.get_str(key)?.ok_or(EngineError::InvalidTransition {
                state: EnrollmentState::Identified,
                action: "enroll without a recorded identifier",
            })
        };
        Ok(EnrollRequest {
            device_id: required(keys::DEVICE_LOCAL_ID)?,
            serial_number: required(keys::DEVICE_SERIAL)?,
            brand: store.get_str(keys::DEVICE_BRAND)?.unwrap_or_default(),
            model: store.get_str(keys::DEVICE_MODEL)?.unwrap_or_default(),
            imei: store.get_str(keys::DEVICE_IMEI)?,
            current_ip: local_ip().map(|ip| ip.to_string()),
        })
    }
}
