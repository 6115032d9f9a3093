//! Codebase snapshot tool
//!
//! Produces a single text document holding every non-ignored file under a
//! directory, each introduced by a `$$relative/path` header and followed by
//! a fenced block of `n:line` entries. [`RestoreSnapshotTool`](super::RestoreSnapshotTool)
//! reads the same format back.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::traits::{optional_str, Tool, ToolResult};
use super::{ignore_patterns, is_ignored};
use crate::error::{Error, Result};

/// Built-in tool: snapshot a directory tree as line-numbered text
pub struct SnapshotTool {
    root: PathBuf,
}

impl SnapshotTool {
    pub fn new(root: PathBuf) -> Self {
        SnapshotTool { root }
    }
}

#[async_trait]
impl Tool for SnapshotTool {
    fn name(&self) -> &str {
        "generate_codebase_snapshot"
    }

    fn description(&self) -> &str {
        "Creates a text snapshot of a directory: every file path followed by its line-numbered content. Useful for capturing the state of a codebase for analysis or later restoration. Common noise is ignored by default and extra glob patterns can be excluded."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The root directory to snapshot. Defaults to '.'"
                },
                "ignore": {
                    "type": "string",
                    "description": "Optional comma-separated glob patterns to ignore"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let path = optional_str(&args, "path").unwrap_or(".").to_string();
        let patterns = ignore_patterns(optional_str(&args, "ignore"));
        let root = self.root.join(&path);

        if !root.is_dir() {
            return Ok(ToolResult::failure(format!(
                "Source directory not found: {}",
                path
            )));
        }

        let snapshot = tokio::task::spawn_blocking(move || generate_snapshot(&root, &patterns))
            .await
            .map_err(|e| Error::Internal(format!("Snapshot walk panicked: {}", e)))?;

        if snapshot.is_empty() {
            Ok(ToolResult::success("Snapshot complete. No files found."))
        } else {
            Ok(ToolResult::success(snapshot))
        }
    }
}

/// Snapshot every non-ignored file under `root`, files before subdirectories
pub fn generate_snapshot(root: &Path, patterns: &[String]) -> String {
    let walker = WalkDir::new(root)
        .sort_by(|a, b| {
            a.file_type()
                .is_dir()
                .cmp(&b.file_type().is_dir())
                .then_with(|| a.file_name().cmp(b.file_name()))
        })
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || e
                    .path()
                    .strip_prefix(root)
                    .map(|rel| !is_ignored(rel, patterns))
                    .unwrap_or(true)
        });

    let mut out = String::new();
    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");

        out.push_str(&format!("$${}\n```\n", relative));
        match std::fs::read(entry.path()) {
            Ok(bytes) => {
                for (i, line) in String::from_utf8_lossy(&bytes).lines().enumerate() {
                    out.push_str(&format!("{}:{}\n", i + 1, line.trim_end()));
                }
            }
            Err(e) => out.push_str(&format!("Error reading file: {}\n", e)),
        }
        out.push_str("```\n\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_snapshot_format() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), "ref").unwrap();
        std::fs::write(dir.path().join("README.md"), "# Demo  \n\nhello\n").unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "pub fn x() {}\n").unwrap();
        std::fs::write(dir.path().join("run.log"), "noise\n").unwrap();

        let tool = SnapshotTool::new(dir.path().to_path_buf());
        let result = tool.execute(json!({})).await.unwrap();

        assert_eq!(
            result.to_text(),
            "$$README.md\n```\n1:# Demo\n2:\n3:hello\n```\n\n$$src/lib.rs\n```\n1:pub fn x() {}\n```\n\n"
        );
    }

    #[tokio::test]
    async fn test_snapshot_empty_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let tool = SnapshotTool::new(dir.path().to_path_buf());

        let empty = tool.execute(json!({"path": "."})).await.unwrap();
        assert_eq!(empty.to_text(), "Snapshot complete. No files found.");

        let missing = tool.execute(json!({"path": "gone"})).await.unwrap();
        assert!(!missing.success);
    }
}
