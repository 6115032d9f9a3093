//! Line editor tool
//!
//! Applies `line_num:content` replacements to one or more files. Several
//! entries for the same line number are all written in place of that line,
//! which is how the model inserts lines.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

use super::traits::{required_str, Tool, ToolResult};
use super::{parse_line_commands, FileLines};
use crate::error::Result;

/// Built-in tool: modify numbered lines of existing files
pub struct LineEditorTool {
    root: PathBuf,
}

impl LineEditorTool {
    pub fn new(root: PathBuf) -> Self {
        LineEditorTool { root }
    }
}

#[async_trait]
impl Tool for LineEditorTool {
    fn name(&self) -> &str {
        "modify_file_lines"
    }

    fn description(&self) -> &str {
        "Modifies existing files line by line. Each file starts with a `$path/to/file.ext` header line, followed by `line_num:new_content` lines that replace the numbered lines. Repeating a line number inserts several lines in its place; numbers past the end of the file append."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "changes": {
                    "type": "string",
                    "description": "Changes in the format: $path/to/file.ext\\nline_num:new_content"
                }
            },
            "required": ["changes"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let changes = required_str(&args, "changes")?;
        let commands = parse_line_commands(changes);
        if commands.is_empty() {
            return Ok(ToolResult::success("No changes specified."));
        }

        let mut report = Vec::with_capacity(commands.len());
        for file in commands {
            report.push(self.apply(file).await);
        }
        Ok(ToolResult::success(report.join("\n")))
    }
}

impl LineEditorTool {
    async fn apply(&self, file: FileLines) -> String {
        let full_path = self.root.join(&file.path);
        if !tokio::fs::metadata(&full_path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            return format!("Error for {}: File not found.", file.path);
        }

        let original = match tokio::fs::read_to_string(&full_path).await {
            Ok(content) => content,
            Err(e) => return format!("Error modifying {}: {}", file.path, e),
        };

        let updated = apply_edits(&original, &file.lines);
        match tokio::fs::write(&full_path, updated).await {
            Ok(()) => {
                info!("Modified {} line(s) in {}", file.lines.len(), full_path.display());
                format!("Successfully modified {}", file.path)
            }
            Err(e) => format!("Error modifying {}: {}", file.path, e),
        }
    }
}

/// Replace numbered lines of `original`; line numbers start at 1
pub fn apply_edits(original: &str, edits: &[(usize, String)]) -> String {
    let lines: Vec<&str> = original.split_inclusive('\n').collect();

    let mut replacements: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
    for (number, content) in edits {
        if *number > 0 {
            replacements.entry(*number).or_default().push(content.as_str());
        }
    }

    let mut out = String::with_capacity(original.len());
    for (index, line) in lines.iter().enumerate() {
        match replacements.remove(&(index + 1)) {
            Some(contents) => push_lines(&mut out, &contents),
            None => out.push_str(line),
        }
    }

    // Numbers past the end append in ascending order
    for contents in replacements.values() {
        push_lines(&mut out, contents);
    }
    out
}

fn push_lines(out: &mut String, contents: &[&str]) {
    for content in contents {
        out.push_str(content);
        if !content.ends_with('\n') {
            out.push('\n');
        }
    }
}
