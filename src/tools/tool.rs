//! The `Tool` capability and a closure-backed implementation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::arguments::ToolArguments;
use super::types::{RiskLevel, ToolParameters};
use crate::error::LoopError;
use crate::provider::ToolDeclaration;
use crate::types::ToolCall;

/// Where a tool call came from.
#[derive(Debug, Clone, Default)]
pub struct ToolExecutionContext {
    pub conversation_id: Option<Uuid>,
    /// Provider-assigned id of the tool_use block.
    pub tool_use_id: Option<String>,
}

impl ToolExecutionContext {
    pub fn for_call(conversation_id: Uuid, call: &ToolCall) -> Self {
        Self {
            conversation_id: Some(conversation_id),
            tool_use_id: Some(call.id.clone()),
        }
    }
}

/// A named capability the model may invoke.
///
/// The risk level is fixed per tool; anything at [`RiskLevel::Medium`] or
/// above is held for a human decision before `execute` is called.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model calls the tool by. Unique within a registry.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the input object.
    fn parameters(&self) -> &ToolParameters;

    fn risk_level(&self) -> RiskLevel;

    /// An `Err` becomes a failed tool result for the model; it never aborts
    /// the turn.
    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, LoopError>;

    /// What the provider is told about this tool. The risk level stays local.
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.parameters().schema.clone(),
        }
    }
}

type BoxedHandler = dyn Fn(
        ToolArguments,
        ToolExecutionContext,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, LoopError>> + Send>>
    + Send
    + Sync;

/// Tool backed by an async closure. Used by the reference tools.
pub struct AgentTool {
    name: String,
    description: String,
    parameters: ToolParameters,
    risk_level: RiskLevel,
    handler: Arc<BoxedHandler>,
}

impl AgentTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        risk_level: RiskLevel,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments, ToolExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, LoopError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            risk_level,
            handler: Arc::new(move |args, ctx| Box::pin(handler(args, ctx))),
        }
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, LoopError> {
        (self.handler)(args.clone(), ctx.clone()).await
    }
}

impl std::fmt::Debug for AgentTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTool")
            .field("name", &self.name)
            .field("risk_level", &self.risk_level)
            .finish()
    }
}
