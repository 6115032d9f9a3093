//! Delete files tool

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

use super::traits::{required_str, Tool, ToolResult};
use super::split_list;
use crate::error::Result;

/// Built-in tool: delete a comma-separated list of files
pub struct DeleteFilesTool {
    root: PathBuf,
}

impl DeleteFilesTool {
    pub fn new(root: PathBuf) -> Self {
        DeleteFilesTool { root }
    }
}

#[async_trait]
impl Tool for DeleteFilesTool {
    fn name(&self) -> &str {
        "delete_files"
    }

    fn description(&self) -> &str {
        "Deletes one or more files from the filesystem. This action is permanent. Multiple file paths can be given as a comma-separated string; directories are skipped."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "paths": {
                    "type": "string",
                    "description": "A comma-separated string of file paths to delete"
                }
            },
            "required": ["paths"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let paths = split_list(Some(required_str(&args, "paths")?));
        if paths.is_empty() {
            return Ok(ToolResult::failure("No paths provided."));
        }

        let mut report = Vec::with_capacity(paths.len());
        for path in paths {
            let full_path = self.root.join(&path);
            let line = match tokio::fs::metadata(&full_path).await {
                Ok(meta) if meta.is_dir() => format!("Skipped: {} is a directory.", path),
                Ok(_) => match tokio::fs::remove_file(&full_path).await {
                    Ok(()) => {
                        info!("Deleted {}", full_path.display());
                        format!("Successfully deleted file: {}", path)
                    }
                    Err(e) => format!("Error deleting {}: {}", path, e),
                },
                Err(_) => format!("Warning: File not found: {}", path),
            };
            report.push(line);
        }

        Ok(ToolResult::success(report.join("\n")))
    }
}
