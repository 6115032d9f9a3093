//! Agent module - conversation state, permission gate and the turn loop
//!
//! This module handles everything between the user's request and the
//! provider/tool-server boundaries:
//! - Conversation history as role-tagged turns
//! - The permission gate that approves tool calls
//! - The agent loop that alternates model turns and tool execution
//! - System prompt construction

pub mod agentic_loop;
mod conversation;
pub mod permission;
pub mod prompts;
pub mod types;

pub use agentic_loop::{
    run_agentic_loop, AgentLoopInput, AgentLoopOutput, LoopCallback, LoopConfig, LoopOutcome,
    LoopStep, LoopTrace, NoOpCallback, ToolAction, ToolDisposition, BUDGET_ADVISORY,
    UNNAMED_TOOL,
};
pub use conversation::Conversation;
pub use permission::{
    Authorization, DenialReason, PermissionCheck, PermissionDecision, PermissionGate,
    PermissionPrompt, PermissionRecord, PermissionRequest,
};
pub use prompts::{build_system_prompt, load_system_prompt, DEFAULT_SYSTEM_PROMPT};
pub use types::*;
