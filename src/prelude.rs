//! Convenience re-exports for common use.

pub use crate::agent::ChatAgent;
pub use crate::agent_loop::{
    ApprovalRequest, ApprovalStore, EventStream, InMemoryApprovalStore, LoopOutcome, LoopRequest,
    StreamEvent, ToolLoop,
};
pub use crate::config::LoopConfig;
pub use crate::conversation::{ConversationStore, InMemoryConversationStore, ResponseValidator};
pub use crate::error::{LoopError, Result};
pub use crate::provider::CompletionProvider;
pub use crate::tools::{AgentTool, RiskLevel, Tool, ToolArguments, ToolParameters, ToolRegistry};
pub use crate::types::{ProviderEvent, ProviderMessage, ToolCall};
