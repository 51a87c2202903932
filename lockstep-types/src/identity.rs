//! Enrolled device identity and the enrollment state machine's states.

use crate::ids::DeviceId;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where the device's serial number came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerialSource {
    Imei,
    HardwareSerial,
    Manual,
    Generated,
}

impl SerialSource {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Imei => "imei",
            Self::HardwareSerial => "hardware_serial",
            Self::Manual => "manual",
            Self::Generated => "generated",
        }
    }
}

impl fmt::Display for SerialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SerialSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "imei" => Ok(Self::Imei),
            "hardware_serial" => Ok(Self::HardwareSerial),
            "manual" => Ok(Self::Manual),
            "generated" => Ok(Self::Generated),
            other => Err(Error::UnknownValue {
                field: "device.serialSource",
                value: other.to_string(),
            }),
        }
    }
}

/// Immutable identity assigned at enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub device_id: DeviceId,
    pub serial_number: String,
    pub enrolled_at: DateTime<Utc>,
}

/// Progress through the one-time enrollment workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentState {
    Unenrolled,
    AdminPending,
    Identified,
    Enrolled,
}

impl EnrollmentState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unenrolled => "unenrolled",
            Self::AdminPending => "admin_pending",
            Self::Identified => "identified",
            Self::Enrolled => "enrolled",
        }
    }
}

impl fmt::Display for EnrollmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnrollmentState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unenrolled" => Ok(Self::Unenrolled),
            "admin_pending" => Ok(Self::AdminPending),
            "identified" => Ok(Self::Identified),
            "enrolled" => Ok(Self::Enrolled),
            other => Err(Error::UnknownValue {
                field: "enrollment.state",
                value: other.to_string(),
            }),
        }
    }
}
