//! Read file tool
//!
//! Returns the full content of one file.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

use super::traits::{required_str, Tool, ToolResult};
use crate::error::Result;

/// Built-in tool: read file content
pub struct ReadFileTool {
    root: PathBuf,
}

impl ReadFileTool {
    pub fn new(root: PathBuf) -> Self {
        ReadFileTool { root }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file_content"
    }

    fn description(&self) -> &str {
        "Retrieves and returns the entire content of a single specified file. Useful for examining the exact contents of a file before analysing or modifying it."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The path to the file to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let path = required_str(&args, "path")?;
        let full_path = self.root.join(path);

        if !tokio::fs::metadata(&full_path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            return Ok(ToolResult::failure(format!(
                "Path is not a file or does not exist: {}",
                path
            )));
        }

        // Undecodable bytes are replaced rather than failing the read
        match tokio::fs::read(&full_path).await {
            Ok(bytes) => Ok(ToolResult::success(
                String::from_utf8_lossy(&bytes).into_owned(),
            )),
            Err(e) => Ok(ToolResult::failure(format!(
                "Error reading file {}: {}",
                path, e
            ))),
        }
    }
}
