//! Tool registry - the set of tools served by `clia-tools`

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Result;
use crate::mcp::McpTool;

use super::traits::{Tool, ToolResult};

/// Registry of available tools
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        ToolRegistry {
            tools: HashMap::new(),
        }
    }

    /// Register a tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// MCP advertisements for every tool, in name order
    pub fn definitions(&self) -> Vec<McpTool> {
        let mut tools: Vec<McpTool> = self.tools.values().map(|t| t.to_mcp_tool()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Execute a tool call. Unknown tools yield a failed result, not an error.
    pub async fn execute(&self, name: &str, args: Value) -> Result<ToolResult> {
        match self.get(name) {
            Some(tool) => {
                debug!("Executing tool {}", name);
                tool.execute(args).await
            }
            None => {
                warn!("Call to unknown tool {}", name);
                Ok(ToolResult::failure(format!("Unknown tool: {}", name)))
            }
        }
    }

    /// Get tool count
    pub fn count(&self) -> usize {
        self.tools.len()
    }

    /// List tool names
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}
