//! Directory tree viewer tool

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::traits::{optional_str, optional_usize, Tool, ToolResult};
use super::{ignore_patterns, is_ignored};
use crate::error::{Error, Result};

const DEFAULT_MAX_DEPTH: usize = 3;

/// Built-in tool: tree view of a directory
pub struct DirectoryTreeTool {
    root: PathBuf,
}

impl DirectoryTreeTool {
    pub fn new(root: PathBuf) -> Self {
        DirectoryTreeTool { root }
    }
}

#[async_trait]
impl Tool for DirectoryTreeTool {
    fn name(&self) -> &str {
        "view_directory_structure"
    }

    fn description(&self) -> &str {
        "Generates a tree-like view of the files and directories under a path, drawn with `├──`, `└──` and `│` connectors. Useful for getting oriented in an unfamiliar project. Depth can be limited, and common noise such as `.git`, `node_modules` and `__pycache__` is ignored by default; extra glob patterns can be excluded with `ignore`."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The root directory to start from. Defaults to '.'"
                },
                "max_depth": {
                    "type": "integer",
                    "description": "The maximum depth to traverse. Defaults to 3"
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
        let max_depth = optional_usize(&args, "max_depth")?.unwrap_or(DEFAULT_MAX_DEPTH);
        let patterns = ignore_patterns(optional_str(&args, "ignore"));
        let root = self.root.join(&path);

        if !root.is_dir() {
            return Ok(ToolResult::failure(format!(
                "Directory not found: {}",
                path
            )));
        }

        let tree = tokio::task::spawn_blocking(move || render_tree(&root, max_depth, &patterns))
            .await
            .map_err(|e| Error::Internal(format!("Directory walk panicked: {}", e)))?;

        Ok(ToolResult::success(tree))
    }
}

/// Render `root` as a tree, `max_depth` levels deep
pub fn render_tree(root: &Path, max_depth: usize, patterns: &[String]) -> String {
    let name = std::fs::canonicalize(root)
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| root.display().to_string());

    let mut lines = vec![format!("{}/", name)];
    walk(root, root, "", 0, max_depth, patterns, &mut lines);
    lines.join("\n")
}

fn walk(
    root: &Path,
    dir: &Path,
    prefix: &str,
    depth: usize,
    max_depth: usize,
    patterns: &[String],
    lines: &mut Vec<String>,
) {
    if depth >= max_depth {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names.retain(|name| {
        let full = dir.join(name);
        let relative = full.strip_prefix(root).unwrap_or(&full);
        !is_ignored(relative, patterns)
    });

    let count = names.len();
    for (i, name) in names.into_iter().enumerate() {
        let last = i + 1 == count;
        let pointer = if last { "└── " } else { "├── " };
        lines.push(format!("{}{}{}", prefix, pointer, name));

        let full = dir.join(&name);
        if full.is_dir() {
            let extension = if last { "    " } else { "│   " };
            walk(
                root,
                &full,
                &format!("{}{}", prefix, extension),
                depth + 1,
                max_depth,
                patterns,
                lines,
            );
        }
    }
}
