use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use santai_agent::{AgentRuntime, Reply};
use santai_core::domain::candidate::Candidate;
use santai_core::domain::session::SessionId;
use santai_core::errors::{ApplicationError, InterfaceError};
use santai_core::flows::ConversationState;
use santai_core::protocol::Acknowledgment;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    runtime: Arc<AgentRuntime>,
}

impl ApiState {
    pub fn new(runtime: Arc<AgentRuntime>) -> Self {
        Self { runtime }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub state: ConversationState,
    pub reply: String,
    pub candidates: Vec<Candidate>,
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl From<Reply> for ChatResponse {
    fn from(reply: Reply) -> Self {
        Self {
            session_id: reply.session_id.to_string(),
            state: reply.state,
            reply: reply.text,
            candidates: reply.candidates,
            categories: reply.categories,
            error_code: reply.error.map(|error| error.code().to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AcknowledgmentResponse {
    pub matched: bool,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub correlation_id: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/sessions/{session_id}/reset", post(reset_session))
        .route("/agent/acknowledgments", post(acknowledge))
        .with_state(state)
}

pub async fn chat(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    let correlation_id = correlation_id(&headers);
    let session_id = body
        .session_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let session_id = SessionId::from(session_id);

    let reply = state
        .runtime
        .handle_message(&session_id, &body.text, &correlation_id)
        .await
        .map_err(|error| interface_error(error, &correlation_id))?;

    info!(
        event_name = "api.chat.handled",
        correlation_id = %correlation_id,
        session_id = %session_id,
        state = reply.state.as_str(),
        candidates = reply.candidates.len(),
        "chat message handled"
    );

    Ok(Json(reply.into()))
}

pub async fn reset_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<ChatResponse> {
    let correlation_id = correlation_id(&headers);
    let session_id = SessionId::from(session_id);
    let reply = state
        .runtime
        .reset_session(&session_id, &correlation_id)
        .await
        .map_err(|error| interface_error(error, &correlation_id))?;

    info!(
        event_name = "api.session.reset",
        correlation_id = %correlation_id,
        session_id = %session_id,
        "session reset"
    );

    Ok(Json(reply.into()))
}

/// Inbound acknowledgments from recipients' agents. Unmatched ones are accepted and dropped.
pub async fn acknowledge(
    State(state): State<ApiState>,
    Json(body): Json<Acknowledgment>,
) -> Json<AcknowledgmentResponse> {
    let session_id = state.runtime.record_acknowledgment(body);
    Json(AcknowledgmentResponse {
        matched: session_id.is_some(),
        session_id: session_id.map(|id| id.to_string()),
    })
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn interface_error(error: ApplicationError, correlation_id: &str) -> (StatusCode, Json<ApiError>) {
    let detail = error.to_string();
    let mapped = error.into_interface(correlation_id);
    let status = match &mapped {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    warn!(
        event_name = "api.request.failed",
        correlation_id = %correlation_id,
        status = status.as_u16(),
        error = %detail,
        "request failed"
    );

    (
        status,
        Json(ApiError {
            error: mapped.user_message().to_string(),
            correlation_id: mapped.correlation_id().to_string(),
        }),
    )
}
