//! Tool implementations for chatloop

mod web_search;

pub use web_search::WebSearchTool;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::llm::ToolDefinition;

/// Result from tool execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
}

impl ToolOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: message.into(),
        }
    }
}

/// Trait for tools the model can call
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name
    fn name(&self) -> &str;

    /// Tool description for the model
    fn description(&self) -> String;

    /// JSON schema for the tool's parameters
    fn parameters(&self) -> Value;

    /// Execute the tool with parsed arguments
    async fn run(&self, args: Value) -> ToolOutput;
}

/// Collection of tools available to a session
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    /// Standard tool set shipped with the service
    pub fn standard() -> Self {
        Self::new(vec![Arc::new(WebSearchTool::new())])
    }

    /// Get all tool definitions for the model
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                parameters: t.parameters(),
            })
            .collect()
    }

    /// Look up a tool by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Check parsed arguments against the schema's `required` list.
    ///
    /// Presence alone is not enough: models occasionally emit an empty
    /// string or array for a parameter they were required to fill, and the
    /// run cannot proceed from that.
    pub fn validate_arguments(schema: &Value, args: &Value) -> Result<(), String> {
        let Some(object) = args.as_object() else {
            return Err("arguments must be a JSON object".to_string());
        };

        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                let missing = match object.get(key) {
                    None | Some(Value::Null) => true,
                    Some(Value::String(s)) => s.is_empty(),
                    Some(Value::Array(a)) => a.is_empty(),
                    Some(_) => false,
                };
                if missing {
                    return Err(format!("missing required parameter '{key}'"));
                }
            }
        }
        Ok(())
    }
}
