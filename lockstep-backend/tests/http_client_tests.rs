use lockstep_backend::{
    BackendClient, BackendConfig, EnrollRequest, FailureCause, HttpBackendClient, Outcome,
};
use lockstep_types::{DeviceId, LockReason};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_for(server: &MockServer) -> HttpBackendClient {
    HttpBackendClient::new(BackendConfig {
        base_url: server.uri(),
        timeout: Duration::from_millis(500),
    })
    .unwrap()
}

fn enroll_request() -> EnrollRequest {
    EnrollRequest {
        device_id: "0b5c6a1e-local".to_string(),
        serial_number: "R58N12ABCDE".to_string(),
        brand: "samsung".to_string(),
        model: "SM-A125F".to_string(),
        imei: None,
        current_ip: Some("10.0.0.7".to_string()),
    }
}

// ── Config ──────────────────────────────────────────────────────

#[test]
fn backend_config_default() {
    let cfg = BackendConfig::default();
    assert_eq!(cfg.base_url, "https://api.lockstep.io");
    assert_eq!(cfg.timeout, Duration::from_secs(10));
}

#[test]
fn backend_config_serde_uses_millis() {
    let cfg = BackendConfig {
        base_url: "http://localhost:1".to_string(),
        timeout: Duration::from_millis(2500),
    };
    let value = serde_json::to_value(&cfg).unwrap();
    assert_eq!(value["timeout"], json!(2500));
    let back: BackendConfig = serde_json::from_value(value).unwrap();
    assert_eq!(back.timeout, Duration::from_millis(2500));
}

// ── Status poll ─────────────────────────────────────────────────

#[tokio::test]
async fn poll_status_decodes_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/status/R58N12ABCDE/"))
        .and(body_partial_json(json!({
            "serial_number": "R58N12ABCDE",
            "is_online": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "is_locked": true,
            "next_payment_date": "2026-11-01",
            "amount_due": 125.5,
            "amount_paid": "$300.00",
            "payment_instructions": "Pay at any branch",
            "contact_phone": "+2348000000000"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let snapshot = client
        .poll_status("R58N12ABCDE", true)
        .await
        .success()
        .unwrap();
    assert!(snapshot.server_locked);
    assert_eq!(snapshot.next_payment_date.as_deref(), Some("2026-11-01"));
    assert_eq!(snapshot.amount_due.as_deref(), Some("125.5"));
    assert_eq!(snapshot.amount_paid.as_deref(), Some("$300.00"));
    assert_eq!(snapshot.contact_phone.as_deref(), Some("+2348000000000"));
    assert_eq!(snapshot.company_logo_url, None);
}

#[tokio::test]
async fn poll_status_without_lock_flag_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/status/SN1/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "amount_due": "10"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let outcome = client.poll_status("SN1", true).await;
    assert!(matches!(outcome, Outcome::Unknown(FailureCause::Malformed(_))));
}

#[tokio::test]
async fn poll_status_garbage_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/status/SN1/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let outcome = client.poll_status("SN1", false).await;
    assert!(matches!(outcome, Outcome::Unknown(FailureCause::Malformed(_))));
}

#[tokio::test]
async fn poll_status_server_error_is_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/status/SN1/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let outcome = client.poll_status("SN1", true).await;
    assert!(matches!(outcome, Outcome::Unknown(FailureCause::Network(_))));
}

#[tokio::test]
async fn poll_status_timeout_is_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/status/SN1/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "is_locked": false }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let outcome = client.poll_status("SN1", true).await;
    assert_eq!(outcome, Outcome::Unknown(FailureCause::Timeout));
}

#[tokio::test]
async fn unreachable_server_is_unknown() {
    let client = HttpBackendClient::new(BackendConfig {
        base_url: "http://127.0.0.1:1".to_string(),
        timeout: Duration::from_millis(500),
    })
    .unwrap();
    let outcome = client.poll_status("SN1", true).await;
    assert!(matches!(outcome, Outcome::Unknown(_)));
}

// ── Unlock verification ─────────────────────────────────────────

#[tokio::test]
async fn verify_unlock_code_success_returns_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/unlock/"))
        .and(body_partial_json(json!({
            "serial_number": "SN1",
            "unlock_code": "4321"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "Unlocked until 2026-11-01"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let outcome = client.verify_unlock_code("SN1", "4321").await;
    assert_eq!(outcome, Outcome::Success("Unlocked until 2026-11-01".to_string()));
}

#[tokio::test]
async fn verify_unlock_code_success_false_is_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/unlock/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "Invalid code"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let outcome = client.verify_unlock_code("SN1", "0000").await;
    assert_eq!(outcome, Outcome::Rejected("Invalid code".to_string()));
}

#[tokio::test]
async fn verify_unlock_code_client_error_uses_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/unlock/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "code expired"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let outcome = client.verify_unlock_code("SN1", "0000").await;
    assert_eq!(outcome, Outcome::Rejected("code expired".to_string()));
}

#[tokio::test]
async fn rejection_without_body_gets_generic_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/unlock/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let outcome = client.verify_unlock_code("SN1", "0000").await;
    assert_eq!(
        outcome,
        Outcome::Rejected("request rejected (status 404)".to_string())
    );
}

#[tokio::test]
async fn too_many_requests_is_not_a_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/unlock/"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let outcome = client.verify_unlock_code("SN1", "0000").await;
    assert!(matches!(outcome, Outcome::Unknown(FailureCause::Network(_))));
}

// ── Enroll ──────────────────────────────────────────────────────

#[tokio::test]
async fn enroll_accepts_status_ok_and_reads_device_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/enroll/"))
        .and(body_partial_json(json!({
            "serial_number": "R58N12ABCDE",
            "brand": "samsung",
            "current_ip": "10.0.0.7"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "status": "ok",
            "device_id": 8812,
            "message": "Welcome"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let reply = client.enroll(&enroll_request()).await.success().unwrap();
    assert_eq!(reply.device_id, Some(DeviceId::new("8812")));
    assert_eq!(reply.message, "Welcome");
}

#[tokio::test]
async fn enroll_omits_absent_imei() {
    let body = serde_json::to_value(enroll_request()).unwrap();
    assert!(body.get("imei").is_none());
}

#[tokio::test]
async fn enroll_without_success_marker_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/enroll/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "pending",
            "message": "Serial not recognised"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let outcome = client.enroll(&enroll_request()).await;
    assert_eq!(outcome, Outcome::Rejected("Serial not recognised".to_string()));
}

// ── Notices ─────────────────────────────────────────────────────

#[tokio::test]
async fn notify_locked_sends_wire_reason_and_reads_unlock_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/lock_device_initiated_by_app/"))
        .and(body_partial_json(json!({
            "serial_number": "SN1",
            "lock_reason": "no_internet_connection"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Locked",
            "unlock_code": 987654,
            "contact_phone": "+100"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let notice = client
        .notify_locked("SN1", LockReason::OfflineTimeout)
        .await
        .success()
        .unwrap();
    assert_eq!(notice.unlock_code.as_deref(), Some("987654"));
    assert_eq!(notice.contact_phone.as_deref(), Some("+100"));
}

#[tokio::test]
async fn notify_locked_accepts_empty_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/lock_device_initiated_by_app/"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let outcome = client.notify_locked("SN1", LockReason::AdminDisabled).await;
    assert!(outcome.is_success());
}

#[tokio::test]
async fn admin_disabled_and_push_token_ignore_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/admin_disabled/"))
        .and(body_partial_json(json!({ "serial_number": "SN1" })))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/update-fcm-token/"))
        .and(body_partial_json(json!({
            "serial_number": "SN1",
            "fcm_token": "tok-1"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    assert_eq!(client.notify_admin_disabled("SN1").await, Outcome::Success(()));
    assert_eq!(
        client.register_push_token("SN1", "tok-1").await,
        Outcome::Success(())
    );
}
