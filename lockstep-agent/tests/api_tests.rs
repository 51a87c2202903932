use chrono::Utc;
use lockstep_agent::{
    build_router, AppState, CommandAccepted, ConnectivityResponse, EnrolledResponse,
    MessageResponse, PushTokenResponse, UnlockResponse,
};
use lockstep_backend::testing::ScriptedBackend;
use lockstep_backend::{EnrollReply, FailureCause, Outcome};
use lockstep_engine::testing::RecordingEnforcer;
use lockstep_engine::{
    CommandChannel, ConnectivityMonitor, DeviceFacts, Elevation, EngineConfig, EngineHandle,
    EngineRunner, EnrollmentWorkflow, ReconciliationEngine, SystemClock,
};
use lockstep_store::layout::{self, keys};
use lockstep_store::{DurableStateStore, MemoryStateStore};
use lockstep_types::{
    CommandKind, ComplianceSnapshot, DeviceId, DeviceIdentity, EnrollmentState, LockReason,
    LockState,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

struct TestAgent {
    base: String,
    backend: Arc<ScriptedBackend>,
    enforcer: Arc<RecordingEnforcer>,
    handle: EngineHandle,
    http: reqwest::Client,
}

impl TestAgent {
    async fn get(&self, path: &str) -> reqwest::Response {
        self.http
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap()
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.http
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn status(&self) -> Value {
        self.get("/api/v1/status").await.json().await.unwrap()
    }
}

fn host_facts() -> DeviceFacts {
    DeviceFacts {
        brand: "samsung".to_string(),
        model: "SM-A125F".to_string(),
        hardware_serial: Some("R58N12ABCDE".to_string()),
        imei: None,
        phone_permission: false,
        elevation: Elevation::DeviceAdmin,
    }
}

fn write_identity(store: &MemoryStateStore) {
    let identity = DeviceIdentity {
        device_id: DeviceId::new("dev-1"),
        serial_number: "SN-001".to_string(),
        enrolled_at: Utc::now(),
    };
    let mut batch = layout::identity_ops(&identity);
    batch.put(keys::ENROLLMENT_STATE, "enrolled");
    store.apply(batch).unwrap();
}

/// Spin up the agent API on an OS-assigned port.
async fn spawn_agent(backend: ScriptedBackend, enrolled: bool) -> TestAgent {
    let store = Arc::new(MemoryStateStore::new());
    if enrolled {
        write_identity(&store);
    }
    let backend = Arc::new(backend);
    let enforcer = Arc::new(RecordingEnforcer::new());
    let clock = Arc::new(SystemClock);
    let connectivity = Arc::new(ConnectivityMonitor::new(store.clone(), clock.clone()));
    let engine = ReconciliationEngine::new(
        EngineConfig::default(),
        store.clone(),
        backend.clone(),
        enforcer.clone(),
        connectivity,
        Arc::new(CommandChannel::new()),
        clock.clone(),
    );
    let (handle, _runner) = EngineRunner::spawn(engine);

    let app = build_router(AppState {
        engine: handle.clone(),
        enrollment: Arc::new(EnrollmentWorkflow::new(store, clock)),
        backend: backend.clone(),
        probe: Arc::new(host_facts()),
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestAgent {
        base: format!("http://127.0.0.1:{}", port),
        backend,
        enforcer,
        handle,
        http: reqwest::Client::new(),
    }
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held");
}

fn locked_by_server() -> ScriptedBackend {
    let backend = ScriptedBackend::healthy();
    backend.set_poll_default(Outcome::Success(ComplianceSnapshot {
        server_locked: true,
        ..Default::default()
    }));
    backend
}

// ── Status ──────────────────────────────────────────────────────

#[tokio::test]
async fn status_of_fresh_device() {
    let agent = spawn_agent(ScriptedBackend::healthy(), false).await;
    let resp = agent.get("/api/v1/status").await;

    assert_eq!(resp.status(), 200);
    let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.contains("application/json"));

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["enrollment"], "unenrolled");
    assert_eq!(body["identity"], Value::Null);
    assert_eq!(body["lock"]["locked"], false);
    assert_eq!(body["display"]["amount_due"], "$0.00");
    assert_eq!(body["display"]["contact_phone"], "N/A");
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let agent = spawn_agent(ScriptedBackend::healthy(), true).await;
    let resp = agent.get("/api/v1/nonexistent").await;
    assert_eq!(resp.status(), 404);
}

// ── Commands ────────────────────────────────────────────────────

#[tokio::test]
async fn lock_command_is_accepted_and_applied() {
    let agent = spawn_agent(ScriptedBackend::healthy(), true).await;
    let resp = agent
        .post(
            "/api/v1/commands",
            json!({ "action": "lock", "unlock_code": "4321" }),
        )
        .await;

    assert_eq!(resp.status(), 202);
    let body: CommandAccepted = resp.json().await.unwrap();
    assert_eq!(body.action, CommandKind::Lock);

    eventually(|| agent.enforcer.is_restricted()).await;
    let lock: LockState = serde_json::from_value(agent.status().await["lock"].clone()).unwrap();
    assert_eq!(lock.reason(), LockReason::ServerDirective);
    assert_eq!(lock.unlock_code(), Some("4321"));
}

#[tokio::test]
async fn unknown_action_is_rejected() {
    let agent = spawn_agent(ScriptedBackend::healthy(), true).await;
    let resp = agent
        .post("/api/v1/commands", json!({ "action": "wipe" }))
        .await;

    assert_eq!(resp.status(), 400);
    let body: MessageResponse = resp.json().await.unwrap();
    assert!(body.message.contains("wipe"));
}

#[tokio::test]
async fn legacy_reminder_action_is_accepted() {
    let agent = spawn_agent(ScriptedBackend::healthy(), true).await;
    let resp = agent
        .post(
            "/api/v1/commands",
            json!({ "action": "payment_reminder", "title": "Due", "message": "Pay by Friday" }),
        )
        .await;

    assert_eq!(resp.status(), 202);
    let body: CommandAccepted = resp.json().await.unwrap();
    assert_eq!(body.action, CommandKind::Reminder);
}

// ── Unlock ──────────────────────────────────────────────────────

#[tokio::test]
async fn wrong_code_is_403_and_right_code_unlocks() {
    let agent = spawn_agent(locked_by_server(), true).await;
    eventually(|| agent.enforcer.is_restricted()).await;

    agent
        .backend
        .push_verify(Outcome::Rejected("Invalid unlock code".into()));
    let resp = agent
        .post("/api/v1/unlock", json!({ "code": "0000" }))
        .await;
    assert_eq!(resp.status(), 403);
    let body: MessageResponse = resp.json().await.unwrap();
    assert_eq!(body.message, "Invalid unlock code");
    assert!(agent.enforcer.is_restricted());

    // The rejected attempt schedules a pass; let it settle while still locked.
    eventually(|| agent.handle.pass_count() >= 2).await;
    assert!(agent.enforcer.is_restricted());

    agent
        .backend
        .set_poll_default(Outcome::Success(ComplianceSnapshot::default()));
    agent
        .backend
        .push_verify(Outcome::Success("Device unlocked".into()));
    let resp = agent
        .post("/api/v1/unlock", json!({ "code": "4321" }))
        .await;
    assert_eq!(resp.status(), 200);
    let body: UnlockResponse = resp.json().await.unwrap();
    assert_eq!(
        body,
        UnlockResponse {
            unlocked: true,
            message: "Device unlocked".to_string(),
        }
    );
    assert!(!agent.enforcer.is_restricted());
    assert_eq!(
        agent.backend.calls().unlock_codes,
        vec![
            ("SN-001".to_string(), "0000".to_string()),
            ("SN-001".to_string(), "4321".to_string()),
        ]
    );
}

#[tokio::test]
async fn unreachable_backend_on_unlock_is_503() {
    let agent = spawn_agent(locked_by_server(), true).await;
    eventually(|| agent.enforcer.is_restricted()).await;

    agent
        .backend
        .push_verify(Outcome::Unknown(FailureCause::Timeout));
    let resp = agent
        .post("/api/v1/unlock", json!({ "code": "4321" }))
        .await;

    assert_eq!(resp.status(), 503);
    assert!(agent.enforcer.is_restricted());

    eventually(|| agent.handle.pass_count() >= 2).await;
    assert!(agent.backend.poll_count() >= 2);
}

#[tokio::test]
async fn blank_code_is_400() {
    let agent = spawn_agent(locked_by_server(), true).await;
    let resp = agent.post("/api/v1/unlock", json!({ "code": "  " })).await;
    assert_eq!(resp.status(), 400);
    assert!(agent.backend.calls().unlock_codes.is_empty());
}

#[tokio::test]
async fn unlock_when_not_locked_reports_success() {
    let agent = spawn_agent(ScriptedBackend::healthy(), true).await;
    eventually(|| agent.handle.pass_count() >= 1).await;

    let resp = agent
        .post("/api/v1/unlock", json!({ "code": "4321" }))
        .await;
    assert_eq!(resp.status(), 200);
    let body: UnlockResponse = resp.json().await.unwrap();
    assert!(body.unlocked);
    assert!(agent.backend.calls().unlock_codes.is_empty());
}

// ── Admin disabled ──────────────────────────────────────────────

#[tokio::test]
async fn admin_disabled_locks_and_notifies_backend() {
    let agent = spawn_agent(ScriptedBackend::healthy(), true).await;
    let resp = agent.post("/api/v1/admin-disabled", json!({})).await;

    assert_eq!(resp.status(), 200);
    let lock: LockState = resp.json().await.unwrap();
    assert!(lock.is_locked());
    assert_eq!(lock.reason(), LockReason::AdminDisabled);
    assert!(agent.enforcer.is_restricted());

    eventually(|| !agent.backend.calls().admin_disabled.is_empty()).await;
    assert_eq!(agent.backend.calls().admin_disabled, vec!["SN-001"]);
}

// ── Connectivity ────────────────────────────────────────────────

#[tokio::test]
async fn connectivity_reports_feed_the_monitor() {
    let agent = spawn_agent(ScriptedBackend::healthy(), true).await;

    let resp = agent
        .post("/api/v1/connectivity", json!({ "online": true }))
        .await;
    assert_eq!(resp.status(), 200);
    let body: ConnectivityResponse = resp.json().await.unwrap();
    assert_eq!(
        body,
        ConnectivityResponse {
            online: true,
            restored: true,
        }
    );

    let body: ConnectivityResponse = agent
        .post("/api/v1/connectivity", json!({ "online": true }))
        .await
        .json()
        .await
        .unwrap();
    assert!(!body.restored);

    let body: ConnectivityResponse = agent
        .post("/api/v1/connectivity", json!({ "online": false }))
        .await
        .json()
        .await
        .unwrap();
    assert!(!body.online);
    assert!(!agent.handle.is_online());
}

// ── Enrollment ──────────────────────────────────────────────────

#[tokio::test]
async fn enroll_runs_workflow_and_starts_polling() {
    let backend = ScriptedBackend::healthy();
    backend.push_enroll(Outcome::Success(EnrollReply {
        device_id: Some(DeviceId::new("srv-9")),
        message: "Enrolled".to_string(),
        contact_phone: None,
    }));
    let agent = spawn_agent(backend, false).await;

    let resp = agent.post("/api/v1/enroll", json!({})).await;
    assert_eq!(resp.status(), 200);
    let body: EnrolledResponse = resp.json().await.unwrap();
    assert_eq!(body.state, EnrollmentState::Enrolled);
    assert_eq!(body.identity.serial_number, "R58N12ABCDE");
    assert_eq!(body.identity.device_id, DeviceId::new("srv-9"));

    eventually(|| agent.backend.poll_count() >= 1).await;
    assert_eq!(agent.backend.calls().polls[0].0, "R58N12ABCDE");
    assert_eq!(agent.status().await["enrollment"], "enrolled");
}

#[tokio::test]
async fn enroll_with_supplied_facts_and_manual_serial() {
    let backend = ScriptedBackend::healthy();
    backend.push_enroll(Outcome::Success(EnrollReply {
        device_id: None,
        message: "Enrolled".to_string(),
        contact_phone: None,
    }));
    let agent = spawn_agent(backend, false).await;

    let resp = agent
        .post(
            "/api/v1/enroll",
            json!({
                "manual_serial": "KIOSK-7",
                "facts": {
                    "brand": "generic",
                    "model": "kiosk",
                    "hardware_serial": null,
                    "imei": null,
                    "phone_permission": false,
                    "elevation": "device_owner"
                }
            }),
        )
        .await;

    assert_eq!(resp.status(), 200);
    let body: EnrolledResponse = resp.json().await.unwrap();
    assert_eq!(body.identity.serial_number, "KIOSK-7");
    assert_eq!(agent.backend.calls().enroll[0].brand, "generic");
}

#[tokio::test]
async fn rejected_enrollment_is_403_and_can_be_retried() {
    let backend = ScriptedBackend::healthy();
    backend.push_enroll(Outcome::Rejected("Serial not registered".into()));
    backend.push_enroll(Outcome::Success(EnrollReply {
        device_id: Some(DeviceId::new("srv-2")),
        message: "Enrolled".to_string(),
        contact_phone: None,
    }));
    let agent = spawn_agent(backend, false).await;

    let resp = agent.post("/api/v1/enroll", json!({})).await;
    assert_eq!(resp.status(), 403);
    let body: MessageResponse = resp.json().await.unwrap();
    assert_eq!(body.message, "Serial not registered");
    assert_eq!(agent.status().await["enrollment"], "identified");

    let resp = agent.post("/api/v1/enroll", json!({})).await;
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn enroll_without_elevation_is_409() {
    let agent = spawn_agent(ScriptedBackend::healthy(), false).await;
    let resp = agent
        .post(
            "/api/v1/enroll",
            json!({
                "facts": {
                    "brand": "x",
                    "model": "y",
                    "phone_permission": false,
                    "elevation": "none"
                }
            }),
        )
        .await;
    assert_eq!(resp.status(), 409);
    assert!(agent.backend.calls().enroll.is_empty());
}

// ── Push token and triggers ─────────────────────────────────────

#[tokio::test]
async fn push_token_waits_for_enrollment() {
    let agent = spawn_agent(ScriptedBackend::healthy(), false).await;
    let body: PushTokenResponse = agent
        .post("/api/v1/push-token", json!({ "token": "fcm-abc" }))
        .await
        .json()
        .await
        .unwrap();
    assert!(!body.registered);
    assert!(agent.backend.calls().push_tokens.is_empty());
}

#[tokio::test]
async fn push_token_is_registered_when_enrolled() {
    let agent = spawn_agent(ScriptedBackend::healthy(), true).await;
    let body: PushTokenResponse = agent
        .post("/api/v1/push-token", json!({ "token": "fcm-abc" }))
        .await
        .json()
        .await
        .unwrap();
    assert!(body.registered);
    assert_eq!(
        agent.backend.calls().push_tokens,
        vec![("SN-001".to_string(), "fcm-abc".to_string())]
    );
}

#[tokio::test]
async fn foreground_and_refresh_trigger_passes() {
    let agent = spawn_agent(ScriptedBackend::healthy(), true).await;
    eventually(|| agent.handle.pass_count() >= 1).await;

    let resp = agent.post("/api/v1/foreground", json!({})).await;
    assert_eq!(resp.status(), 202);
    eventually(|| agent.handle.pass_count() >= 2).await;

    let resp = agent.post("/api/v1/refresh", json!({})).await;
    assert_eq!(resp.status(), 202);
    eventually(|| agent.handle.pass_count() >= 3).await;
    assert!(agent.backend.poll_count() >= 3);
}
