//! Process-wide tool registration table.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use futures::FutureExt;
use tracing::{debug, warn};

use super::arguments::ToolArguments;
use super::tool::{Tool, ToolExecutionContext};
use super::types::{RiskLevel, ToolResult};
use crate::error::LoopError;
use crate::provider::ToolDeclaration;

/// Maps tool names to tool implementations.
///
/// Filled at startup and read concurrently afterwards.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails if the name is already taken.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<(), LoopError> {
        let mut tools = self
            .tools
            .write()
            .map_err(|_| LoopError::Configuration("tool registry lock poisoned".into()))?;
        let name = tool.name().to_string();
        if tools.contains_key(&name) {
            return Err(LoopError::DuplicateTool(name));
        }
        debug!(tool = %name, risk = tool.risk_level().level(), "registered tool");
        tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().ok()?.get(name).cloned()
    }

    /// Risk level of a registered tool.
    pub fn risk_level(&self, name: &str) -> Option<RiskLevel> {
        self.get(name).map(|tool| tool.risk_level())
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.tools
            .read()
            .map(|tools| tools.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// All registered tools, sorted by name.
    pub fn all(&self) -> Vec<Arc<dyn Tool>> {
        self.tools
            .read()
            .map(|tools| tools.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Declarations exposed to the completion provider.
    ///
    /// Only name, description and schema leave the registry.
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.all().iter().map(|tool| tool.declaration()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().map(|tools| tools.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up and run a tool, converting every failure into a `ToolResult`.
    ///
    /// Errors and panics raised by the tool never escape this call.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: &ToolExecutionContext,
    ) -> ToolResult {
        let Some(tool) = self.get(name) else {
            return ToolResult::failure(LoopError::ToolNotFound(name.to_string()).to_string());
        };
        let args = ToolArguments::new(input);
        let outcome = AssertUnwindSafe(tool.execute(&args, ctx))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(output)) => ToolResult::success(output),
            Ok(Err(err)) => {
                debug!(tool = %name, error = %err, "tool returned error");
                ToolResult::failure(err.to_string())
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!(tool = %name, %message, "tool panicked");
                ToolResult::failure(format!("Tool '{name}' crashed: {message}"))
            }
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
