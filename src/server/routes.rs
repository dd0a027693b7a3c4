//! Route handlers for the HTTP API.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::agent::ChatAgent;
use crate::agent_loop::{ApprovalRequest, EventStream};
use crate::conversation::Conversation;
use crate::error::{ErrorCategory, LoopError};
use crate::tools::RiskLevel;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<ChatAgent>,
}

pub type SseStream = BoxStream<'static, Result<Event, Infallible>>;

/// JSON error body with a status derived from the error category.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<LoopError> for ApiError {
    fn from(err: LoopError) -> Self {
        let status = match (&err, err.category()) {
            (LoopError::ConversationEnded(_), _) => StatusCode::CONFLICT,
            (_, ErrorCategory::Conversation | ErrorCategory::Approval) => StatusCode::NOT_FOUND,
            (_, ErrorCategory::Validation | ErrorCategory::ToolExecution) => {
                StatusCode::BAD_REQUEST
            }
            (_, ErrorCategory::Provider) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// One `data:` frame per event, each carrying the JSON envelope.
fn into_sse(events: EventStream) -> Sse<SseStream> {
    let frames = events
        .map(|event| {
            let frame = Event::default()
                .json_data(&event)
                .unwrap_or_else(|err| Event::default().comment(format!("unencodable event: {err}")));
            Ok(frame)
        })
        .boxed();
    Sse::new(frames).keep_alive(KeepAlive::default())
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub risk_level: RiskLevel,
    pub requires_approval: bool,
}

pub async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolInfo>> {
    let registry = state.agent.tool_loop().registry();
    let tools = registry
        .declarations()
        .into_iter()
        .filter_map(|decl| {
            let risk_level = registry.risk_level(&decl.name)?;
            Some(ToolInfo {
                name: decl.name,
                description: decl.description,
                input_schema: decl.input_schema,
                risk_level,
                requires_approval: risk_level.requires_approval(),
            })
        })
        .collect();
    Json(tools)
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub title: Option<String>,
}

pub async fn create_conversation(
    State(state): State<AppState>,
    body: Option<Json<CreateConversationRequest>>,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    let title = body.and_then(|Json(req)| req.title);
    let conversation = state.agent.store().create_conversation(title).await?;
    tracing::info!(conversation_id = %conversation.id, "conversation created");
    Ok((StatusCode::CREATED, Json(conversation)))
}

pub async fn end_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Conversation>, ApiError> {
    Ok(Json(state.agent.store().end_conversation(id).await?))
}

pub async fn pending_approvals(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Json<Vec<ApprovalRequest>> {
    Json(
        state
            .agent
            .tool_loop()
            .approvals()
            .pending_for_conversation(id),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub conversation_id: Uuid,
    pub content: String,
}

/// Start a turn. Failures before the loop starts arrive as an `error` event.
pub async fn chat_stream(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Sse<SseStream> {
    into_sse(state.agent.initiate(req.conversation_id, req.content))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    pub approval_id: Uuid,
    pub approved: bool,
}

/// Resolve a pending approval and stream the rest of the turn.
pub async fn approve(
    State(state): State<AppState>,
    Json(req): Json<ApproveRequest>,
) -> Sse<SseStream> {
    into_sse(state.agent.resume(req.approval_id, req.approved))
}
