//! Facts about the device needed to pick its identifier.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;

/// Administrative privilege the agent holds on the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Elevation {
    #[default]
    None,
    /// Can lock the screen but not read privileged identifiers.
    DeviceAdmin,
    /// Full ownership; privileged identifiers are readable.
    DeviceOwner,
}

/// What the platform reports about the hardware.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFacts {
    pub brand: String,
    pub model: String,
    pub hardware_serial: Option<String>,
    pub imei: Option<String>,
    /// Whether the phone-state permission was granted.
    pub phone_permission: bool,
    pub elevation: Elevation,
}

pub trait DeviceProbe: Send + Sync {
    fn facts(&self) -> DeviceFacts;
}

impl DeviceProbe for DeviceFacts {
    fn facts(&self) -> DeviceFacts {
        self.clone()
    }
}

/// Probe for the host the agent runs on.
///
/// Hosts have no IMEI. The hardware serial is the DMI product serial when
/// readable, otherwise a hash of the machine id.
#[derive(Debug, Clone, Copy)]
pub struct HostProbe {
    elevation: Elevation,
}

impl HostProbe {
    #[must_use]
    pub fn new(elevation: Elevation) -> Self {
        Self { elevation }
    }
}

impl DeviceProbe for HostProbe {
    fn facts(&self) -> DeviceFacts {
        DeviceFacts {
            brand: env::consts::OS.to_string(),
            model: format!("{}-{}", host_name(), env::consts::ARCH),
            hardware_serial: hardware_serial(),
            imei: None,
            phone_permission: false,
            elevation: self.elevation,
        }
    }
}

fn host_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

fn hardware_serial() -> Option<String> {
    dmi_serial().or_else(|| machine_id().map(|id| fingerprint(&id)))
}

#[cfg(target_os = "linux")]
fn dmi_serial() -> Option<String> {
    std::fs::read_to_string("/sys/class/dmi/id/product_serial")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("unknown"))
}

#[cfg(not(target_os = "linux"))]
fn dmi_serial() -> Option<String> {
    None
}

#[cfg(target_os = "linux")]
fn machine_id() -> Option<String> {
    std::fs::read_to_string("/etc/machine-id")
        .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(not(target_os = "linux"))]
fn machine_id() -> Option<String> {
    None
}

/// First 8 bytes of SHA-256, upper-case hex.
fn fingerprint(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    hex::encode_upper(&digest[..8])
}
