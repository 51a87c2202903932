//! Request and response bodies exchanged with the backend.
//!
//! Responses are decoded once here into typed values. Billing fields are
//! accepted as strings or numbers since the server is not consistent about
//! which it sends.

use lockstep_types::{ComplianceSnapshot, DeviceId};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

// ── Enroll ───────────────────────────────────────────────────────

/// Identity and descriptive fields sent when enrolling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollRequest {
    /// Provisional id generated on the device.
    pub device_id: String,
    pub serial_number: String,
    pub brand: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imei: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_ip: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EnrollResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub device_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub contact_phone: Option<String>,
}

impl EnrollResponse {
    pub(crate) fn accepted(&self) -> bool {
        self.success == Some(true)
            || matches!(self.status.as_deref(), Some("success") | Some("ok"))
    }
}

/// A successful enrollment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollReply {
    /// Server-assigned id, when the server assigns one.
    pub device_id: Option<DeviceId>,
    pub message: String,
    pub contact_phone: Option<String>,
}

// ── Status poll ──────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct StatusRequest<'a> {
    pub serial_number: &'a str,
    pub is_online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_known_ip: Option<String>,
}

/// `is_locked` is required: a reply without it says nothing about the lock.
#[derive(Debug, Deserialize)]
pub(crate) struct StatusResponse {
    pub is_locked: bool,
    #[serde(default, deserialize_with = "lenient_string")]
    pub next_payment_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub amount_due: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub amount_paid: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub payment_instructions: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub contact_phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub company_logo_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: Option<String>,
}

impl From<StatusResponse> for ComplianceSnapshot {
    fn from(r: StatusResponse) -> Self {
        Self {
            server_locked: r.is_locked,
            next_payment_date: r.next_payment_date,
            amount_due: r.amount_due,
            amount_paid: r.amount_paid,
            payment_instructions: r.payment_instructions,
            contact_phone: r.contact_phone,
            company_logo_url: r.company_logo_url,
            message: r.message,
        }
    }
}

// ── Unlock verification ──────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct VerifyRequest<'a> {
    pub serial_number: &'a str,
    pub unlock_code: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VerifyResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

// ── Lock / admin notices ─────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct LockNoticeRequest<'a> {
    pub serial_number: &'a str,
    pub lock_reason: &'a str,
}

/// What the server sends back when told about a local lock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LockNotice {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub unlock_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub contact_phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SerialRequest<'a> {
    pub serial_number: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct PushTokenRequest<'a> {
    pub serial_number: &'a str,
    pub fcm_token: &'a str,
}

/// Body of a rejection; servers use any of these fields for the message.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ErrorBody {
    pub(crate) fn into_message(self) -> Option<String> {
        self.message.or(self.error).or(self.detail)
    }
}
