//! Tool-related types: parameter schemas, risk levels, results.

use serde::{Deserialize, Serialize};

/// JSON Schema-based parameter definition for a tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolParameters {
    /// JSON Schema object describing the parameters.
    pub schema: serde_json::Value,
}

impl ToolParameters {
    /// Create from a raw JSON Schema value.
    pub fn from_schema(schema: serde_json::Value) -> Self {
        Self { schema }
    }

    /// Create an empty parameter schema (no parameters).
    pub fn empty() -> Self {
        Self {
            schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": [],
            }),
        }
    }

    /// Builder: create an object schema with properties.
    pub fn object() -> ParameterBuilder {
        ParameterBuilder {
            properties: serde_json::Map::new(),
            required: Vec::new(),
        }
    }
}

/// Builder for constructing tool parameter schemas.
pub struct ParameterBuilder {
    properties: serde_json::Map<String, serde_json::Value>,
    required: Vec<String>,
}

impl ParameterBuilder {
    fn property(
        mut self,
        name: impl Into<String>,
        schema: serde_json::Value,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.properties.insert(name.clone(), schema);
        if required {
            self.required.push(name);
        }
        self
    }

    /// Add a string property.
    pub fn string(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        let schema = serde_json::json!({ "type": "string", "description": description.into() });
        self.property(name, schema, required)
    }

    /// Add a number property.
    pub fn number(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        let schema = serde_json::json!({ "type": "number", "description": description.into() });
        self.property(name, schema, required)
    }

    /// Add a boolean property.
    pub fn boolean(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        let schema = serde_json::json!({ "type": "boolean", "description": description.into() });
        self.property(name, schema, required)
    }

    /// Build into ToolParameters.
    pub fn build(self) -> ToolParameters {
        ToolParameters {
            schema: serde_json::json!({
                "type": "object",
                "properties": self.properties,
                "required": self.required,
            }),
        }
    }
}

/// How dangerous a tool is to run unattended.
///
/// Serialized as the bare integer `1`, `2` or `3`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::IntoStaticStr,
)]
#[serde(into = "u8", try_from = "u8")]
#[strum(serialize_all = "lowercase")]
pub enum RiskLevel {
    Low = 1,
    Medium = 2,
    High = 3,
}

impl RiskLevel {
    /// Numeric level, 1 through 3.
    pub fn level(self) -> u8 {
        self as u8
    }

    /// Level 2 and above must be confirmed by a human before executing.
    pub fn requires_approval(self) -> bool {
        self >= Self::Medium
    }
}

impl From<RiskLevel> for u8 {
    fn from(level: RiskLevel) -> Self {
        level.level()
    }
}

impl TryFrom<u8> for RiskLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Low),
            2 => Ok(Self::Medium),
            3 => Ok(Self::High),
            other => Err(format!("risk level must be 1, 2 or 3 (got {other})")),
        }
    }
}

/// Outcome of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub success: bool,
    pub output: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }

    /// JSON text fed back to the model as the tool result content.
    pub fn to_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            self.error
                .clone()
                .unwrap_or_else(|| "unserializable tool output".to_string())
        })
    }
}
