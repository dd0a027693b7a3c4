//! Error classification for turn delivery.

use serde::{Deserialize, Serialize};

/// Broad error category, used to decide whether a failure ends a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Conversation missing or already ended. Rejected before any provider call.
    Conversation,
    /// Remote completion service failed (network, HTTP status, malformed stream).
    Provider,
    /// The model asked for a tool that is not registered.
    ToolNotFound,
    /// A registered tool failed while executing.
    ToolExecution,
    /// Resume was called with an unknown or already-resolved approval id.
    Approval,
    /// The final reply did not match the response-shape rules.
    Validation,
    /// Startup / wiring problems (bad config, duplicate tool names).
    Configuration,
    /// Persistence collaborator failures.
    Persistence,
    Internal,
}

impl ErrorCategory {
    /// Whether errors of this category abort the event stream.
    ///
    /// Tool and validation failures are absorbed into forward progress.
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            Self::ToolNotFound | Self::ToolExecution | Self::Validation
        )
    }
}
