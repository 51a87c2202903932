//! Local HTTP API.
//!
//! Bound to loopback. The push bridge posts directives here, platform
//! bridges report reachability and foreground events, and lock screens read
//! status and submit unlock codes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use lockstep_backend::BackendClient;
use lockstep_engine::{
    DeviceFacts, DeviceProbe, EngineError, EngineHandle, EngineStatus, EnrollmentWorkflow,
    Trigger, UnlockOutcome,
};
use lockstep_types::{CommandKind, DeviceIdentity, EnrollmentState, InboundDirective, LockState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything the handlers need.
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub enrollment: Arc<EnrollmentWorkflow>,
    pub backend: Arc<dyn BackendClient>,
    pub probe: Arc<dyn DeviceProbe>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CommandAccepted {
    pub action: CommandKind,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UnlockRequest {
    pub code: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UnlockResponse {
    pub unlocked: bool,
    pub message: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConnectivityRequest {
    pub online: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConnectivityResponse {
    pub online: bool,
    /// Whether this report brought the device back online.
    pub restored: bool,
}

/// Administrator-supplied enrollment input. Facts default to the host probe.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct EnrollBody {
    pub manual_serial: Option<String>,
    pub facts: Option<DeviceFacts>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EnrolledResponse {
    pub state: EnrollmentState,
    pub identity: DeviceIdentity,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PushTokenRequest {
    pub token: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PushTokenResponse {
    pub registered: bool,
}

/// An engine error rendered as `{message}` with a matching status code.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            EngineError::InvalidCommand(_) | EngineError::EmptyUnlockCode => {
                StatusCode::BAD_REQUEST
            }
            EngineError::ServerRejection(_) => StatusCode::FORBIDDEN,
            EngineError::NotEnrolled | EngineError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            EngineError::NetworkFailure(_)
            | EngineError::MalformedResponse(_)
            | EngineError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::PersistenceFailure(_) | EngineError::PolicyEnforcementFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(%status, error = %self.0, "request failed");
        }
        let body = MessageResponse {
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

async fn status_handler(State(state): State<AppState>) -> Result<Json<EngineStatus>, ApiError> {
    Ok(Json(state.engine.status().await?))
}

async fn command_handler(
    State(state): State<AppState>,
    Json(directive): Json<InboundDirective>,
) -> Result<(StatusCode, Json<CommandAccepted>), ApiError> {
    let action = state.engine.enqueue(directive)?;
    info!(%action, "command queued");
    Ok((StatusCode::ACCEPTED, Json(CommandAccepted { action })))
}

async fn unlock_handler(
    State(state): State<AppState>,
    Json(body): Json<UnlockRequest>,
) -> Result<Json<UnlockResponse>, ApiError> {
    let message = match state.engine.attempt_unlock(&body.code).await? {
        UnlockOutcome::Unlocked { message } => message,
        UnlockOutcome::AlreadyUnlocked => "Device is not locked".to_string(),
    };
    Ok(Json(UnlockResponse {
        unlocked: true,
        message,
    }))
}

async fn admin_disabled_handler(
    State(state): State<AppState>,
) -> Result<Json<LockState>, ApiError> {
    Ok(Json(state.engine.admin_disabled().await?))
}

async fn connectivity_handler(
    State(state): State<AppState>,
    Json(body): Json<ConnectivityRequest>,
) -> Json<ConnectivityResponse> {
    let restored = state.engine.set_online(body.online);
    Json(ConnectivityResponse {
        online: state.engine.is_online(),
        restored,
    })
}

async fn enroll_handler(
    State(state): State<AppState>,
    Json(body): Json<EnrollBody>,
) -> Result<Json<EnrolledResponse>, ApiError> {
    let probe: &dyn DeviceProbe = match &body.facts {
        Some(facts) => facts,
        None => state.probe.as_ref(),
    };
    let identity = state
        .enrollment
        .run(probe, body.manual_serial.as_deref(), state.backend.as_ref())
        .await?;
    state.engine.trigger(Trigger::Manual)?;
    Ok(Json(EnrolledResponse {
        state: state.enrollment.state()?,
        identity,
    }))
}

async fn push_token_handler(
    State(state): State<AppState>,
    Json(body): Json<PushTokenRequest>,
) -> Result<Json<PushTokenResponse>, ApiError> {
    let registered = state.engine.register_push_token(&body.token).await?;
    Ok(Json(PushTokenResponse { registered }))
}

async fn foreground_handler(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.engine.trigger(Trigger::Foregrounded)?;
    Ok(StatusCode::ACCEPTED)
}

async fn refresh_handler(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.engine.trigger(Trigger::Manual)?;
    Ok(StatusCode::ACCEPTED)
}

/// Build the agent's HTTP API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/status", get(status_handler))
        .route("/api/v1/commands", post(command_handler))
        .route("/api/v1/unlock", post(unlock_handler))
        .route("/api/v1/admin-disabled", post(admin_disabled_handler))
        .route("/api/v1/connectivity", post(connectivity_handler))
        .route("/api/v1/enroll", post(enroll_handler))
        .route("/api/v1/push-token", post(push_token_handler))
        .route("/api/v1/foreground", post(foreground_handler))
        .route("/api/v1/refresh", post(refresh_handler))
        .with_state(state)
}
