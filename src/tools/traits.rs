//! Core tool trait and result types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::mcp::{McpTool, McpToolInput, McpToolResult};

/// A tool served to the agent over MCP
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name
    fn name(&self) -> &str;

    /// Get the tool description
    fn description(&self) -> &str;

    /// Get the JSON Schema for tool parameters
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with given arguments
    async fn execute(&self, args: Value) -> Result<ToolResult>;

    /// Convert to an MCP tool advertisement
    fn to_mcp_tool(&self) -> McpTool {
        let schema = self.parameters_schema();
        McpTool {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: McpToolInput {
                schema_type: "object".to_string(),
                properties: schema.get("properties").cloned().unwrap_or(Value::Null),
                required: schema
                    .get("required")
                    .and_then(|r| r.as_array())
                    .map(|r| {
                        r.iter()
                            .filter_map(|v| v.as_str().map(String::from))
                            .collect()
                    })
                    .unwrap_or_default(),
            },
        }
    }
}

/// Result of a tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool ran. A shell command that exits non-zero still succeeds here.
    pub success: bool,
    /// Result content (for successful execution)
    pub content: Option<String>,
    /// Error message (for failed execution)
    pub error: Option<String>,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(content: impl Into<String>) -> Self {
        ToolResult {
            success: true,
            content: Some(content.into()),
            error: None,
        }
    }

    /// Create a failed result
    pub fn failure(error: impl Into<String>) -> Self {
        ToolResult {
            success: false,
            content: None,
            error: Some(error.into()),
        }
    }

    /// Convert to the text the model sees
    pub fn to_text(&self) -> String {
        if self.success {
            self.content.clone().unwrap_or_default()
        } else {
            format!("Error: {}", self.error.clone().unwrap_or_default())
        }
    }

    /// Convert to an MCP `tools/call` result
    pub fn into_mcp(self) -> McpToolResult {
        let text = self.to_text();
        if self.success {
            McpToolResult::text(text)
        } else {
            McpToolResult::error(text)
        }
    }
}

/// Required string argument
pub(crate) fn required_str<'a>(args: &'a Value, name: &str) -> Result<&'a str> {
    args.get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::InvalidInput(format!("Missing '{}' parameter", name)))
}

/// Optional string argument; JSON null and empty strings count as absent
pub(crate) fn optional_str<'a>(args: &'a Value, name: &str) -> Option<&'a str> {
    args.get(name)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

/// Optional non-negative integer argument, accepting whole floats and numeric strings
pub(crate) fn optional_usize(args: &Value, name: &str) -> Result<Option<usize>> {
    let Some(value) = args.get(name).filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let parsed = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .map(|n| Some(n as usize))
        .ok_or_else(|| Error::InvalidInput(format!("'{}' must be a non-negative integer", name)))
}
