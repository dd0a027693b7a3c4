//! Tool contract, registry and reference tools.

pub mod arguments;
pub mod builtin;
pub mod registry;
pub mod tool;
pub mod types;

pub use arguments::ToolArguments;
pub use registry::ToolRegistry;
pub use tool::{AgentTool, Tool, ToolExecutionContext};
pub use types::{RiskLevel, ToolParameters, ToolResult};
