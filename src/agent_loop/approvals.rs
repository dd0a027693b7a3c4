//! Approval gate: suspended turns waiting on a human decision.
//!
//! A pending approval carries everything needed to resume the turn later,
//! in a different request. Entries are only held in process memory; a
//! restart drops every pending approval.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::tools::RiskLevel;
use crate::types::{ContentBlock, ProviderMessage, ToolCall};

/// Approval request as shown to the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub tool_name: String,
    pub tool_input: serde_json::Value,
    pub risk_level: RiskLevel,
    pub reason: String,
}

/// A turn suspended on a gated tool call.
///
/// On resume the gated call's result is sent back in one user message,
/// after `prior_results` and before an error result per skipped call. When
/// the assistant message made a single call, that message holds exactly one
/// block.
#[derive(Debug, Clone)]
pub struct PendingApproval {
    pub id: Uuid,
    pub tool_name: String,
    pub tool_input: serde_json::Value,
    pub tool_use_id: String,
    pub risk_level: RiskLevel,
    pub conversation_id: Uuid,
    /// Full history, ending with the assistant message that made the call.
    pub messages: Vec<ProviderMessage>,
    pub system_prompt: String,
    /// Results of calls from the same assistant message that ran before the
    /// gated one.
    pub prior_results: Vec<ContentBlock>,
    /// Calls from the same assistant message after the gated one. They are
    /// never executed.
    pub skipped_calls: Vec<ToolCall>,
    pub created_at: DateTime<Utc>,
}

impl PendingApproval {
    pub fn new(
        call: &ToolCall,
        risk_level: RiskLevel,
        conversation_id: Uuid,
        messages: Vec<ProviderMessage>,
        system_prompt: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tool_name: call.name.clone(),
            tool_input: call.input.clone(),
            tool_use_id: call.id.clone(),
            risk_level,
            conversation_id,
            messages,
            system_prompt,
            prior_results: Vec::new(),
            skipped_calls: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// The gated call, rebuilt from the stored fields.
    pub fn tool_call(&self) -> ToolCall {
        ToolCall {
            id: self.tool_use_id.clone(),
            name: self.tool_name.clone(),
            input: self.tool_input.clone(),
        }
    }

    pub fn request(&self) -> ApprovalRequest {
        ApprovalRequest {
            id: self.id,
            tool_name: self.tool_name.clone(),
            tool_input: self.tool_input.clone(),
            risk_level: self.risk_level,
            reason: approval_reason(&self.tool_name, self.risk_level),
        }
    }
}

/// Human-readable reason naming the tool and its risk level.
pub fn approval_reason(tool_name: &str, risk_level: RiskLevel) -> String {
    format!(
        "Tool '{tool_name}' has risk level {} ({risk_level}) and requires confirmation before it runs.",
        risk_level.level()
    )
}

/// Message fed back to the model when the operator declines a call.
pub fn rejection_message(tool_name: &str) -> String {
    format!("The user declined to run tool '{tool_name}'. Do not retry it without asking.")
}

/// Keyed storage for pending approvals.
///
/// `take` must be atomic: exactly one resolver may observe a given entry.
pub trait ApprovalStore: Send + Sync {
    fn insert(&self, approval: PendingApproval);

    fn get(&self, id: Uuid) -> Option<PendingApproval>;

    /// Remove and return an approval.
    fn take(&self, id: Uuid) -> Option<PendingApproval>;

    /// Pending requests for one conversation, oldest first.
    fn pending_for_conversation(&self, conversation_id: Uuid) -> Vec<ApprovalRequest>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `DashMap`-backed store. Pending approvals never expire.
#[derive(Debug, Default)]
pub struct InMemoryApprovalStore {
    pending: DashMap<Uuid, PendingApproval>,
}

impl InMemoryApprovalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ApprovalStore for InMemoryApprovalStore {
    fn insert(&self, approval: PendingApproval) {
        debug!(
            approval_id = %approval.id,
            conversation_id = %approval.conversation_id,
            tool = %approval.tool_name,
            "approval pending"
        );
        self.pending.insert(approval.id, approval);
    }

    fn get(&self, id: Uuid) -> Option<PendingApproval> {
        self.pending.get(&id).map(|entry| entry.value().clone())
    }

    fn take(&self, id: Uuid) -> Option<PendingApproval> {
        self.pending.remove(&id).map(|(_, approval)| approval)
    }

    fn pending_for_conversation(&self, conversation_id: Uuid) -> Vec<ApprovalRequest> {
        let mut matching: Vec<PendingApproval> = self
            .pending
            .iter()
            .filter(|entry| entry.value().conversation_id == conversation_id)
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by_key(|a| a.created_at);
        matching.iter().map(PendingApproval::request).collect()
    }

    fn len(&self) -> usize {
        self.pending.len()
    }
}
