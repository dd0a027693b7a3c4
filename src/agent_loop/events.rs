//! Turn event stream types.
//!
//! [`StreamEvent`] is what the loop emits. On the wire every event becomes a
//! flat [`WireEvent`] envelope: `{type, data?, messageId?, toolApproval?,
//! toolResult?}`.

use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use super::approvals::ApprovalRequest;

/// Events observed by the client during one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireEvent", try_from = "WireEvent")]
pub enum StreamEvent {
    /// Streamed assistant text.
    Content { text: String },
    /// Outcome of a tool that actually ran.
    ToolResult(ToolResultEvent),
    /// The turn is suspended until the operator decides.
    ToolApproval(ApprovalRequest),
    /// Non-fatal notice, e.g. a failed response validation.
    Warning { text: String },
    /// The user's message was persisted.
    MessageSaved { message_id: Uuid },
    /// The turn finished. `message_id` is absent when no text was produced.
    Done { message_id: Option<Uuid> },
    Error { text: String },
}

impl StreamEvent {
    pub fn error(text: impl Into<String>) -> Self {
        Self::Error { text: text.into() }
    }

    /// `done`, `error` and `tool_approval` end an invocation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done { .. } | Self::Error { .. } | Self::ToolApproval(_)
        )
    }

    /// Wire `type` string.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Content { .. } => "content",
            Self::ToolResult(_) => "tool_result",
            Self::ToolApproval(_) => "tool_approval",
            Self::Warning { .. } => "warning",
            Self::MessageSaved { .. } => "message_saved",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultEvent {
    pub name: String,
    pub success: bool,
    pub output: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Flat JSON envelope for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_approval: Option<ApprovalRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResultEvent>,
}

impl WireEvent {
    fn bare(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            data: None,
            message_id: None,
            tool_approval: None,
            tool_result: None,
        }
    }
}

impl From<StreamEvent> for WireEvent {
    fn from(event: StreamEvent) -> Self {
        let mut wire = WireEvent::bare(event.kind());
        match event {
            StreamEvent::Content { text }
            | StreamEvent::Warning { text }
            | StreamEvent::Error { text } => wire.data = Some(text),
            StreamEvent::ToolResult(result) => wire.tool_result = Some(result),
            StreamEvent::ToolApproval(request) => wire.tool_approval = Some(request),
            StreamEvent::MessageSaved { message_id } => wire.message_id = Some(message_id),
            StreamEvent::Done { message_id } => wire.message_id = message_id,
        }
        wire
    }
}

impl TryFrom<WireEvent> for StreamEvent {
    type Error = String;

    fn try_from(wire: WireEvent) -> Result<Self, String> {
        let missing = |field: &str| format!("{} event without {field}", wire.kind);
        let event = match wire.kind.as_str() {
            "content" => StreamEvent::Content {
                text: wire.data.clone().ok_or_else(|| missing("data"))?,
            },
            "warning" => StreamEvent::Warning {
                text: wire.data.clone().ok_or_else(|| missing("data"))?,
            },
            "error" => StreamEvent::Error {
                text: wire.data.clone().unwrap_or_default(),
            },
            "tool_result" => {
                StreamEvent::ToolResult(wire.tool_result.clone().ok_or_else(|| missing("toolResult"))?)
            }
            "tool_approval" => StreamEvent::ToolApproval(
                wire.tool_approval
                    .clone()
                    .ok_or_else(|| missing("toolApproval"))?,
            ),
            "message_saved" => StreamEvent::MessageSaved {
                message_id: wire.message_id.ok_or_else(|| missing("messageId"))?,
            },
            "done" => StreamEvent::Done {
                message_id: wire.message_id,
            },
            other => return Err(format!("unknown event type: {other}")),
        };
        Ok(event)
    }
}

/// Event stream handed to the caller of an invocation.
pub type EventStream = BoxStream<'static, StreamEvent>;

/// Sending half used by the loop.
///
/// Emitting after the receiver is gone is a no-op; the turn keeps running
/// so its results still reach the store.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl EventEmitter {
    pub fn channel() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, UnboundedReceiverStream::new(rx).boxed())
    }

    pub fn emit(&self, event: StreamEvent) {
        if let Err(err) = self.tx.send(event) {
            tracing::trace!(kind = err.0.kind(), "event receiver dropped");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
