//! Completion provider trait and implementations.

pub mod http;

#[cfg(feature = "anthropic")]
pub mod anthropic;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::LoopConfig;
use crate::error::LoopError;
use crate::types::{ProviderEvent, ProviderMessage};

/// A request sent to a completion provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ProviderMessage>,
    pub system_prompt: String,
    pub tools: Option<Vec<ToolDeclaration>>,
}

/// Tool declaration sent to the provider API.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Stream of provider events for one completion.
pub type ProviderStream = BoxStream<'static, Result<ProviderEvent, LoopError>>;

/// Core trait implemented by all completion providers.
///
/// Implementations hold no per-conversation state; every call opens a new
/// stream that cannot be restarted.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name (e.g. "anthropic").
    fn provider_name(&self) -> &str;

    /// Open a streaming completion.
    async fn stream(&self, request: &CompletionRequest) -> Result<ProviderStream, LoopError>;
}

/// Create the provider selected by `config`.
pub fn create_provider(config: &LoopConfig) -> Result<Arc<dyn CompletionProvider>, LoopError> {
    match config.provider.as_str() {
        #[cfg(feature = "anthropic")]
        "anthropic" => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| LoopError::Authentication("Missing ANTHROPIC_API_KEY".into()))?;
            Ok(Arc::new(anthropic::AnthropicProvider::new(
                config.model.clone(),
                api_key,
                config.base_url.clone(),
                config.max_tokens,
            )))
        }
        other => Err(LoopError::Configuration(format!(
            "Provider '{other}' is not enabled via feature flags"
        ))),
    }
}
