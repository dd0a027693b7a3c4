//! Streaming types emitted by completion providers.

use serde::{Deserialize, Serialize};

use super::message::ToolCall;

/// One event from a provider completion stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ProviderEvent {
    /// Incremental assistant text.
    ContentDelta(String),
    /// A fully assembled tool call.
    ToolUse(ToolCall),
    /// The provider reported an error mid-stream.
    Error(String),
    /// The provider finished this completion.
    Done,
}
