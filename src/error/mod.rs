//! Error types for loopgate.

pub mod unified;

pub use unified::ErrorCategory;

use thiserror::Error;
use uuid::Uuid;

/// Primary error type for all loopgate operations.
#[derive(Error, Debug)]
pub enum LoopError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(Uuid),

    #[error("Conversation has ended: {0}")]
    ConversationEnded(Uuid),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Provider error: {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("Tool '{0}' not found")]
    ToolNotFound(String),

    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Approval not found or already resolved: {0}")]
    ApprovalNotFound(Uuid),

    #[error("Response failed validation: {}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl LoopError {
    /// Create an API error from a status code and body.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConversationNotFound(_) | Self::ConversationEnded(_) => {
                ErrorCategory::Conversation
            }
            Self::Api { .. }
            | Self::Network(_)
            | Self::Authentication(_)
            | Self::RateLimited { .. }
            | Self::Stream(_)
            | Self::Provider { .. } => ErrorCategory::Provider,
            Self::ToolNotFound(_) => ErrorCategory::ToolNotFound,
            Self::ToolExecution { .. } | Self::InvalidArgument(_) => ErrorCategory::ToolExecution,
            Self::ApprovalNotFound(_) => ErrorCategory::Approval,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Configuration(_) | Self::DuplicateTool(_) => ErrorCategory::Configuration,
            Self::Persistence(_) => ErrorCategory::Persistence,
            Self::Io(_) | Self::Serialization(_) => ErrorCategory::Internal,
        }
    }

    /// Whether this error ends the event stream it occurs in.
    pub fn is_terminal(&self) -> bool {
        self.category().is_terminal()
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, LoopError>;
