//! reqwest-backed implementation of [`BackendClient`].

use crate::client::BackendClient;
use crate::error::{BackendError, BackendResult};
use crate::outcome::{FailureCause, Outcome};
use crate::wire::{
    EnrollReply, EnrollRequest, EnrollResponse, ErrorBody, LockNotice, LockNoticeRequest,
    PushTokenRequest, SerialRequest, StatusRequest, StatusResponse, VerifyRequest, VerifyResponse,
};
use async_trait::async_trait;
use lockstep_types::{ComplianceSnapshot, DeviceId, LockReason};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, UdpSocket};
use std::time::Duration;
use tracing::{debug, warn};

/// Connection settings for the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend API (e.g. `https://api.lockstep.io`).
    pub base_url: String,
    /// Upper bound on each request, connect included.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.lockstep.io".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Maps a lock reason to the value the backend expects in `lock_reason`.
fn wire_reason(reason: LockReason) -> &'static str {
    match reason {
        LockReason::OfflineTimeout => "no_internet_connection",
        LockReason::AdminDisabled => "admin_disabled",
        LockReason::ServerDirective | LockReason::None => "server_directive",
    }
}

/// Best-effort address of the interface used for outbound traffic.
///
/// No packet is sent; connecting a UDP socket only selects a route.
pub fn local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

fn transport_failure(err: &reqwest::Error) -> FailureCause {
    if err.is_timeout() {
        FailureCause::Timeout
    } else if err.is_decode() {
        FailureCause::Malformed(err.to_string())
    } else {
        FailureCause::Network(err.to_string())
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Outcome<T> {
    match serde_json::from_slice(body) {
        Ok(value) => Outcome::Success(value),
        Err(e) => Outcome::Unknown(FailureCause::Malformed(e.to_string())),
    }
}

/// HTTP client for the backend API.
pub struct HttpBackendClient {
    config: BackendConfig,
    base: Url,
    client: Client,
}

impl HttpBackendClient {
    /// Creates a client. Fails only if the base URL is unusable or the TLS
    /// stack cannot be initialised.
    pub fn new(config: BackendConfig) -> BackendResult<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| BackendError::InvalidBaseUrl(format!("{}: {e}", config.base_url)))?;
        if base.cannot_be_a_base() {
            return Err(BackendError::InvalidBaseUrl(config.base_url.clone()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()?;
        Ok(Self {
            config,
            base,
            client,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Builds `{base}/{segments..}/` with each segment escaped.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments).push("");
        }
        url
    }

    /// Sends a JSON POST and classifies the response by status.
    ///
    /// A 2xx yields the raw body. Other 4xx codes are authoritative
    /// rejections; 408, 429 and 5xx are transient.
    async fn post_raw<B: Serialize + ?Sized>(
        &self,
        op: &'static str,
        url: Url,
        body: &B,
    ) -> Outcome<Vec<u8>> {
        debug!(op, %url, "backend request");
        let response = match self.client.post(url).json(body).send().await {
            Ok(r) => r,
            Err(e) => {
                let cause = transport_failure(&e);
                warn!(op, %cause, "backend request failed");
                return Outcome::Unknown(cause);
            }
        };
        let status = response.status();
        let bytes = match response.bytes().await {
            Ok(b) => b.to_vec(),
            Err(e) => {
                let cause = transport_failure(&e);
                warn!(op, %cause, "failed to read backend response");
                return Outcome::Unknown(cause);
            }
        };

        if status.is_success() {
            return Outcome::Success(bytes);
        }
        let transient = status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS;
        if transient || !status.is_client_error() {
            warn!(op, status = status.as_u16(), "backend unavailable");
            return Outcome::Unknown(FailureCause::Network(format!(
                "server error (status {})",
                status.as_u16()
            )));
        }
        let message = serde_json::from_slice::<ErrorBody>(&bytes)
            .ok()
            .and_then(ErrorBody::into_message)
            .unwrap_or_else(|| format!("request rejected (status {})", status.as_u16()));
        warn!(op, status = status.as_u16(), %message, "backend rejected request");
        Outcome::Rejected(message)
    }

    async fn post_json<B, R>(&self, op: &'static str, url: Url, body: &B) -> Outcome<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        match self.post_raw(op, url, body).await {
            Outcome::Success(bytes) => {
                let decoded = decode(&bytes);
                if let Outcome::Unknown(cause) = &decoded {
                    warn!(op, %cause, "undecodable backend response");
                }
                decoded
            }
            Outcome::Rejected(msg) => Outcome::Rejected(msg),
            Outcome::Unknown(cause) => Outcome::Unknown(cause),
        }
    }
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn enroll(&self, request: &EnrollRequest) -> Outcome<EnrollReply> {
        let url = self.endpoint(&["api", "enroll"]);
        let response: EnrollResponse = match self.post_json("enroll", url, request).await {
            Outcome::Success(r) => r,
            Outcome::Rejected(msg) => return Outcome::Rejected(msg),
            Outcome::Unknown(cause) => return Outcome::Unknown(cause),
        };
        if !response.accepted() {
            let message = response
                .message
                .unwrap_or_else(|| "enrollment refused".to_string());
            return Outcome::Rejected(message);
        }
        Outcome::Success(EnrollReply {
            device_id: response
                .device_id
                .filter(|id| !id.trim().is_empty())
                .map(DeviceId::new),
            message: response
                .message
                .unwrap_or_else(|| "Device enrolled".to_string()),
            contact_phone: response.contact_phone,
        })
    }

    async fn poll_status(&self, serial: &str, is_online: bool) -> Outcome<ComplianceSnapshot> {
        let url = self.endpoint(&["api", "status", serial]);
        let body = StatusRequest {
            serial_number: serial,
            is_online,
            last_known_ip: local_ip().map(|ip| ip.to_string()),
        };
        self.post_json::<_, StatusResponse>("poll_status", url, &body)
            .await
            .map(ComplianceSnapshot::from)
    }

    async fn verify_unlock_code(&self, serial: &str, code: &str) -> Outcome<String> {
        let url = self.endpoint(&["api", "unlock"]);
        let body = VerifyRequest {
            serial_number: serial,
            unlock_code: code,
        };
        match self.post_json::<_, VerifyResponse>("verify_unlock_code", url, &body).await {
            Outcome::Success(r) if r.success => Outcome::Success(
                r.message.unwrap_or_else(|| "Device unlocked".to_string()),
            ),
            Outcome::Success(r) => {
                Outcome::Rejected(r.message.unwrap_or_else(|| "Invalid unlock code".to_string()))
            }
            Outcome::Rejected(msg) => Outcome::Rejected(msg),
            Outcome::Unknown(cause) => Outcome::Unknown(cause),
        }
    }

    async fn notify_locked(&self, serial: &str, reason: LockReason) -> Outcome<LockNotice> {
        let url = self.endpoint(&["api", "lock_device_initiated_by_app"]);
        let body = LockNoticeRequest {
            serial_number: serial,
            lock_reason: wire_reason(reason),
        };
        match self.post_raw("notify_locked", url, &body).await {
            Outcome::Success(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => {
                Outcome::Success(LockNotice::default())
            }
            Outcome::Success(bytes) => decode(&bytes),
            Outcome::Rejected(msg) => Outcome::Rejected(msg),
            Outcome::Unknown(cause) => Outcome::Unknown(cause),
        }
    }

    async fn notify_admin_disabled(&self, serial: &str) -> Outcome<()> {
        let url = self.endpoint(&["api", "admin_disabled"]);
        let body = SerialRequest {
            serial_number: serial,
        };
        self.post_raw("notify_admin_disabled", url, &body)
            .await
            .map(|_| ())
    }

    async fn register_push_token(&self, serial: &str, token: &str) -> Outcome<()> {
        let url = self.endpoint(&["api", "update-fcm-token"]);
        let body = PushTokenRequest {
            serial_number: serial,
            fcm_token: token,
        };
        self.post_raw("register_push_token", url, &body)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_segments_with_trailing_slash() {
        let client = HttpBackendClient::new(BackendConfig {
            base_url: "http://localhost:9000/v2".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            client.endpoint(&["api", "status", "SN 1"]).as_str(),
            "http://localhost:9000/v2/api/status/SN%201/"
        );
    }

    #[test]
    fn rejects_unparseable_base_url() {
        let result = HttpBackendClient::new(BackendConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(BackendError::InvalidBaseUrl(_))));
    }

    #[test]
    fn wire_reasons() {
        assert_eq!(wire_reason(LockReason::OfflineTimeout), "no_internet_connection");
        assert_eq!(wire_reason(LockReason::AdminDisabled), "admin_disabled");
    }
}
