//! System prompt construction

use crate::error::{Error, Result};
use crate::mcp::ToolCatalog;
use std::path::Path;

/// Built-in system prompt, used unless a prompt file is configured
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are CLIA, a software engineering assistant running in the user's terminal.

You work on the user's local project through the tools listed below. You can read files, view directory trees, run shell commands, edit specific lines, delete files, and take or restore codebase snapshots.

## How to work
- Inspect before you change anything: look at the directory structure and read the relevant files first.
- Prefer small, targeted edits over rewriting whole files.
- When a tool reports `Status: Failure`, read its stderr section and adjust instead of repeating the same call.
- If the user denies a tool call, do not retry it; explain what you wanted to do and ask how to proceed.
- When the task is done, answer with a short summary of what changed. Do not call a tool in your final answer.

## Formatting
Answer in Markdown. Keep explanations concise and put code in fenced blocks."#;

/// Load the system prompt from `path`, or fall back to the built-in one
pub fn load_system_prompt(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|e| {
                Error::Config(format!(
                    "Failed to load system prompt {}: {}",
                    path.display(),
                    e
                ))
            })?;
            if content.trim().is_empty() {
                return Err(Error::Config(format!(
                    "System prompt file {} is empty",
                    path.display()
                )));
            }
            Ok(content)
        }
        None => Ok(DEFAULT_SYSTEM_PROMPT.to_string()),
    }
}

/// Append the session context (working directory and available tools) to `base`
pub fn build_system_prompt(base: &str, catalog: &ToolCatalog, working_dir: &Path) -> String {
    let tools: Vec<String> = catalog
        .list()
        .map(|tool| format!("`{}`: {}", tool.name, tool.description))
        .collect();
    let tools: Vec<&str> = tools.iter().map(String::as_str).collect();

    PromptBuilder::new()
        .text(base)
        .section(
            "Session",
            &format!("Working directory: {}", working_dir.display()),
        )
        .section("Available tools", "")
        .list(&tools)
        .build()
}

/// Prompt builder for constructing complex prompts
#[derive(Default)]
pub struct PromptBuilder {
    parts: Vec<String>,
}

impl PromptBuilder {
    /// Create a new prompt builder
    pub fn new() -> Self {
        PromptBuilder { parts: Vec::new() }
    }

    /// Add a section with a header
    pub fn section(mut self, header: &str, content: &str) -> Self {
        if content.is_empty() {
            self.parts.push(format!("## {}", header));
        } else {
            self.parts.push(format!("## {}\n{}", header, content));
        }
        self
    }

    /// Add raw text
    pub fn text(mut self, text: &str) -> Self {
        self.parts.push(text.to_string());
        self
    }

    /// Add a list of items
    pub fn list(mut self, items: &[&str]) -> Self {
        if items.is_empty() {
            return self;
        }
        let list = items
            .iter()
            .map(|item| format!("- {}", item))
            .collect::<Vec<_>>()
            .join("\n");
        self.parts.push(list);
        self
    }

    /// Build the final prompt
    pub fn build(self) -> String {
        self.parts.join("\n\n")
    }
}
