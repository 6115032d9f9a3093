//! Tools module - the file and shell tools served by `clia-tools`
//!
//! Each tool is a self-contained module that implements the `Tool` trait.
//! Tools are registered into a `ToolRegistry`, which the MCP server exposes
//! over stdio.
//!
//! ## Built-in Tools
//!
//! - **execute_shell_command**: Run a command line with a timeout
//! - **read_file_content**: Read one file
//! - **delete_files**: Delete a comma-separated list of files
//! - **view_directory_structure**: Tree view of a directory
//! - **modify_file_lines**: Replace numbered lines in files
//! - **generate_codebase_snapshot**: Line-numbered snapshot of a directory
//! - **restore_files_from_snapshot**: Write files back from a snapshot
//!
//! ## Adding a New Tool
//!
//! 1. Create a new file in `src/tools/` (e.g., `my_tool.rs`)
//! 2. Implement the `Tool` trait
//! 3. Add `mod my_tool;` and `pub use` in this file
//! 4. Register it in [`default_registry`]

mod delete_files;
mod directory_tree;
mod line_editor;
mod read_file;
mod registry;
mod restore;
mod shell;
mod snapshot;
mod traits;

// Core trait and types
pub use traits::{Tool, ToolResult};

// Registry
pub use registry::ToolRegistry;

// Built-in tools
pub use delete_files::DeleteFilesTool;
pub use directory_tree::{render_tree, DirectoryTreeTool};
pub use line_editor::{apply_edits, LineEditorTool};
pub use read_file::ReadFileTool;
pub use restore::RestoreSnapshotTool;
pub use shell::{format_report, ShellCommandTool, DEFAULT_SHELL_TIMEOUT};
pub use snapshot::{generate_snapshot, SnapshotTool};

use glob::Pattern;
use std::path::Path;
use std::time::Duration;

/// Patterns every directory walk skips
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git",
    ".gitignore",
    ".svn",
    "node_modules",
    "venv",
    ".venv",
    "__pycache__",
    "build",
    "dist",
    "*.log",
    ".tmp",
    ".DS_Store",
];

/// Registry holding every built-in tool, resolving relative paths against `root`
pub fn default_registry(root: &Path, shell_timeout: Duration) -> ToolRegistry {
    let root = root.to_path_buf();
    let mut registry = ToolRegistry::new();
    registry.register(ShellCommandTool::new(root.clone()).with_timeout(shell_timeout));
    registry.register(ReadFileTool::new(root.clone()));
    registry.register(DeleteFilesTool::new(root.clone()));
    registry.register(DirectoryTreeTool::new(root.clone()));
    registry.register(LineEditorTool::new(root.clone()));
    registry.register(SnapshotTool::new(root.clone()));
    registry.register(RestoreSnapshotTool::new(root));
    registry
}

/// Split a comma-separated argument, dropping blanks
pub(crate) fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

/// Default ignore patterns plus the user's comma-separated extras
pub(crate) fn ignore_patterns(extra: Option<&str>) -> Vec<String> {
    let mut patterns: Vec<String> = DEFAULT_IGNORE_PATTERNS
        .iter()
        .map(|p| p.to_string())
        .collect();
    for pattern in split_list(extra) {
        if !patterns.contains(&pattern) {
            patterns.push(pattern);
        }
    }
    patterns
}

/// Whether `relative` (or its final component) matches any glob in `patterns`
pub fn is_ignored(relative: &Path, patterns: &[String]) -> bool {
    let normalized = relative.to_string_lossy().replace('\\', "/");
    let basename = relative
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    patterns
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .any(|p| p.matches(&normalized) || p.matches(&basename))
}

/// Edits for one file parsed from a `$path` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLines {
    pub path: String,
    /// `(line_number, content)` in input order
    pub lines: Vec<(usize, String)>,
}

/// Parse `$path` header lines followed by `n:content` lines.
///
/// Input without any real newline has its literal `\n` sequences expanded,
/// so escaped single-line payloads work without corrupting code that
/// contains `\n` in string literals. Any number of leading `$` marks a
/// header and lines that are not `n:content` are skipped. Files keep the
/// order of their first header.
pub fn parse_line_commands(text: &str) -> Vec<FileLines> {
    let text = if text.contains('\n') {
        text.to_string()
    } else {
        text.replace("\\n", "\n")
    };
    let mut files: Vec<FileLines> = Vec::new();
    let mut current: Option<usize> = None;

    for line in text.trim().lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('$') {
            let path = trimmed.trim_start_matches('$').trim().to_string();
            current = Some(match files.iter().position(|f| f.path == path) {
                Some(index) => index,
                None => {
                    files.push(FileLines {
                        path,
                        lines: Vec::new(),
                    });
                    files.len() - 1
                }
            });
            continue;
        }

        let Some(index) = current else {
            continue;
        };
        let Some((number, content)) = line.split_once(':') else {
            continue;
        };
        if let Ok(number) = number.trim().parse::<usize>() {
            files[index].lines.push((number, content.to_string()));
        }
    }

    files.retain(|f| !f.path.is_empty());
    files
}
