//! Core turn types for the tool loop.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::ProviderMessage;

use super::approvals::PendingApproval;

/// Input for one turn.
#[derive(Debug, Clone)]
pub struct LoopRequest {
    pub conversation_id: Uuid,
    /// Provider-shaped history, ending with the newest user message.
    pub messages: Vec<ProviderMessage>,
    pub system_prompt: String,
}

/// Mutable state carried across iterations of one invocation.
#[derive(Debug, Clone)]
pub(crate) struct LoopState {
    pub conversation_id: Uuid,
    pub messages: Vec<ProviderMessage>,
    pub system_prompt: String,
    /// Assistant text of the current iteration only.
    pub full_text: String,
    pub iteration: usize,
}

impl LoopState {
    pub fn new(request: LoopRequest) -> Self {
        Self {
            conversation_id: request.conversation_id,
            messages: request.messages,
            system_prompt: request.system_prompt,
            full_text: String::new(),
            iteration: 0,
        }
    }
}

/// What to do after one provider round-trip.
#[derive(Debug)]
pub(crate) enum IterationOutcome {
    /// Tool results were appended; call the provider again.
    Continue,
    /// A gated call needs a human decision.
    Suspend(Box<PendingApproval>),
    /// No tool calls; finish the turn with the collected text.
    Complete,
    Fail(String),
}

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoopOutcome {
    Completed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<Uuid>,
    },
    AwaitingApproval {
        approval_id: Uuid,
    },
    Failed {
        error: String,
    },
}

impl LoopOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}
