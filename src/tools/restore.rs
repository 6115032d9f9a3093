//! Restore files from a codebase snapshot

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

use super::parse_line_commands;
use super::traits::{optional_str, required_str, Tool, ToolResult};
use crate::error::Result;

/// Built-in tool: write the files described by a snapshot
pub struct RestoreSnapshotTool {
    root: PathBuf,
}

impl RestoreSnapshotTool {
    pub fn new(root: PathBuf) -> Self {
        RestoreSnapshotTool { root }
    }
}

#[async_trait]
impl Tool for RestoreSnapshotTool {
    fn name(&self) -> &str {
        "restore_files_from_snapshot"
    }

    fn description(&self) -> &str {
        "Reconstructs files and directories from a snapshot string, creating new files or overwriting existing ones. The snapshot format is a `$filepath` header line followed by line-numbered content."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "input_snapshot_content": {
                    "type": "string",
                    "description": "The snapshot string with '$filepath' headers and line-numbered content"
                },
                "output_directory": {
                    "type": "string",
                    "description": "The directory to write files to. Defaults to '.'"
                }
            },
            "required": ["input_snapshot_content"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let snapshot = required_str(&args, "input_snapshot_content")?;
        let output_directory = optional_str(&args, "output_directory").unwrap_or(".");

        let files = parse_line_commands(snapshot);
        if files.is_empty() {
            return Ok(ToolResult::failure(
                "Input snapshot content is empty or invalid.",
            ));
        }

        let out_dir = self.root.join(output_directory);
        if let Err(e) = tokio::fs::create_dir_all(&out_dir).await {
            return Ok(ToolResult::failure(format!(
                "Failed to create {}: {}",
                output_directory, e
            )));
        }

        let mut report = Vec::with_capacity(files.len());
        let mut written = 0;
        for file in files {
            let full_path = out_dir.join(&file.path);
            if let Some(parent) = full_path.parent() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    report.push(format!("Error writing file {}: {}", file.path, e));
                    continue;
                }
            }

            let content: String = file
                .lines
                .iter()
                .map(|(_, line)| format!("{}\n", line))
                .collect();
            match tokio::fs::write(&full_path, content).await {
                Ok(()) => {
                    written += 1;
                    report.push(format!("Successfully wrote {}", file.path));
                }
                Err(e) => report.push(format!("Error writing file {}: {}", file.path, e)),
            }
        }

        info!("Restored {} file(s) into {}", written, out_dir.display());
        Ok(ToolResult::success(format!(
            "Restorer finished. Created/modified {} files.\n{}",
            written,
            report.join("\n")
        )))
    }
}
