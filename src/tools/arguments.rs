//! Typed access to tool call input.

use crate::error::LoopError;

/// Wrapper around the JSON input of a tool call.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// Get the raw JSON value.
    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    pub fn get_str(&self, key: &str) -> Result<&str, LoopError> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| LoopError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    pub fn get_u64_opt(&self, key: &str) -> Option<u64> {
        self.value.get(key).and_then(|v| v.as_u64())
    }

    pub fn get_bool_opt(&self, key: &str) -> Option<bool> {
        self.value.get(key).and_then(|v| v.as_bool())
    }

    /// Deserialize the entire input into a typed struct.
    ///
    /// Providers occasionally send the input as a JSON-encoded string; that
    /// form is unwrapped first, and an empty string is treated as `{}`.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, LoopError> {
        let value = match &self.value {
            serde_json::Value::String(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    serde_json::json!({})
                } else {
                    serde_json::from_str::<serde_json::Value>(trimmed).map_err(|e| {
                        LoopError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
                    })?
                }
            }
            other => other.clone(),
        };
        serde_json::from_value(value).map_err(|e| {
            LoopError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}
