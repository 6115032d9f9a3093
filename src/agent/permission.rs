//! Permission gate for tool calls
//!
//! Tools the user has marked "always allow" run unattended; anything else
//! waits on an interactive decision. The approved set is persisted in a
//! small JSON file (`{"always_allowed": [...]}`) that is rewritten whole on
//! every change.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::agent::types::ToolArguments;
use crate::error::{Error, Result};

/// Attempts made to persist an "always allow" decision
const SAVE_ATTEMPTS: u32 = 3;

#[derive(Debug, Default, Serialize, Deserialize)]
struct PermissionFile {
    #[serde(default)]
    always_allowed: Vec<String>,
}

/// Durable set of tool names approved for unattended execution
#[derive(Debug, Clone)]
pub struct PermissionRecord {
    path: PathBuf,
    always_allowed: Vec<String>,
}

impl PermissionRecord {
    /// Load the record. A missing or corrupt file yields an empty set.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let always_allowed = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<PermissionFile>(&raw) {
                Ok(file) => {
                    let mut tools = Vec::with_capacity(file.always_allowed.len());
                    for tool in file.always_allowed {
                        if !tools.contains(&tool) {
                            tools.push(tool);
                        }
                    }
                    tools
                }
                Err(e) => {
                    warn!("Ignoring corrupt permission file {}: {}", path.display(), e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!("Could not read permission file {}: {}", path.display(), e);
                Vec::new()
            }
        };

        debug!("Loaded {} always-allowed tools from {}", always_allowed.len(), path.display());
        PermissionRecord { path, always_allowed }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, tool: &str) -> bool {
        self.always_allowed.iter().any(|t| t == tool)
    }

    /// Add a tool; returns false if it was already present
    pub fn insert(&mut self, tool: &str) -> bool {
        if self.contains(tool) {
            return false;
        }
        self.always_allowed.push(tool.to_string());
        true
    }

    /// Drop a tool; returns false if it was absent
    pub fn remove(&mut self, tool: &str) -> bool {
        let before = self.always_allowed.len();
        self.always_allowed.retain(|t| t != tool);
        self.always_allowed.len() != before
    }

    /// Approved tools in approval order
    pub fn tools(&self) -> &[String] {
        &self.always_allowed
    }

    /// Rewrite the whole file via a temporary sibling and a rename
    pub fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&PermissionFile {
            always_allowed: self.always_allowed.clone(),
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Outcome of a silent lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionCheck {
    Allowed,
    NeedsPrompt,
}

/// The user's answer to a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDecision {
    AllowOnce,
    AllowAlways,
    Deny,
}

impl PermissionDecision {
    /// Map the prompt's `1`/`2`/`3` choices
    pub fn from_choice(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(PermissionDecision::AllowOnce),
            "2" => Some(PermissionDecision::AllowAlways),
            "3" => Some(PermissionDecision::Deny),
            _ => None,
        }
    }
}

/// What the prompt shows the user
#[derive(Debug, Clone)]
pub struct PermissionRequest {
    pub tool: String,
    pub description: String,
    pub arguments: ToolArguments,
}

/// Asks a human whether a tool call may run
#[async_trait]
pub trait PermissionPrompt: Send + Sync {
    async fn ask(&self, request: &PermissionRequest) -> Result<PermissionDecision>;
}

/// Why a call was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    User,
    TimedOut,
}

/// Final verdict for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Allowed,
    Denied(DenialReason),
}

impl Authorization {
    /// Message folded back to the model for a refused call
    pub fn denial_message(reason: DenialReason, tool: &str) -> String {
        match reason {
            DenialReason::User => format!("Tool call for `{}` was denied by the user.", tool),
            DenialReason::TimedOut => format!(
                "Permission request for `{}` timed out; the tool was not executed.",
                tool
            ),
        }
    }
}

/// Approval checkpoint between a requested tool call and its execution
pub struct PermissionGate {
    record: PermissionRecord,
    prompt: Box<dyn PermissionPrompt>,
    timeout: Option<Duration>,
}

impl PermissionGate {
    pub fn new(record: PermissionRecord, prompt: Box<dyn PermissionPrompt>) -> Self {
        PermissionGate {
            record,
            prompt,
            timeout: None,
        }
    }

    /// Treat prompts unanswered after `timeout` as denied
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn record(&self) -> &PermissionRecord {
        &self.record
    }

    pub fn check(&self, tool: &str) -> PermissionCheck {
        if self.record.contains(tool) {
            PermissionCheck::Allowed
        } else {
            PermissionCheck::NeedsPrompt
        }
    }

    /// Decide whether `request` may run, prompting when needed.
    ///
    /// An "always allow" answer is persisted before the verdict is returned.
    /// If every save attempt fails the call still runs this once and the
    /// tool is prompted for again on its next call.
    pub async fn authorize(&mut self, request: PermissionRequest) -> Authorization {
        if self.check(&request.tool) == PermissionCheck::Allowed {
            debug!("Tool {} is always allowed", request.tool);
            return Authorization::Allowed;
        }

        let answer = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.prompt.ask(&request)).await {
                Ok(answer) => answer,
                Err(_) => {
                    warn!("Permission prompt for {} timed out after {:?}", request.tool, limit);
                    return Authorization::Denied(DenialReason::TimedOut);
                }
            },
            None => self.prompt.ask(&request).await,
        };

        let decision = match answer {
            Ok(decision) => decision,
            Err(Error::PermissionTimeout(_)) => return Authorization::Denied(DenialReason::TimedOut),
            Err(e) => {
                warn!("Permission prompt failed for {}: {}; denying", request.tool, e);
                PermissionDecision::Deny
            }
        };

        match decision {
            PermissionDecision::AllowOnce => Authorization::Allowed,
            PermissionDecision::AllowAlways => {
                if self.record.insert(&request.tool) && !self.persist(&request.tool) {
                    self.record.remove(&request.tool);
                }
                Authorization::Allowed
            }
            PermissionDecision::Deny => Authorization::Denied(DenialReason::User),
        }
    }

    fn persist(&self, tool: &str) -> bool {
        for attempt in 1..=SAVE_ATTEMPTS {
            match self.record.save() {
                Ok(()) => {
                    info!("Tool {} is now always allowed", tool);
                    return true;
                }
                Err(e) => warn!(
                    "Saving permission file {} failed (attempt {}/{}): {}",
                    self.record.path().display(),
                    attempt,
                    SAVE_ATTEMPTS,
                    e
                ),
            }
        }
        warn!("Approval for {} is not persisted; it applies to this call only", tool);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    struct Scripted {
        decision: PermissionDecision,
        asked: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PermissionPrompt for Scripted {
        async fn ask(&self, _request: &PermissionRequest) -> Result<PermissionDecision> {
            self.asked.fetch_add(1, Ordering::SeqCst);
            Ok(self.decision)
        }
    }

    struct NeverAnswers;

    #[async_trait]
    impl PermissionPrompt for NeverAnswers {
        async fn ask(&self, _request: &PermissionRequest) -> Result<PermissionDecision> {
            futures::future::pending().await
        }
    }

    fn request(tool: &str) -> PermissionRequest {
        PermissionRequest {
            tool: tool.to_string(),
            description: "test tool".to_string(),
            arguments: ToolArguments::new(),
        }
    }

    fn gate(path: &Path, decision: PermissionDecision) -> (PermissionGate, Arc<AtomicUsize>) {
        let asked = Arc::new(AtomicUsize::new(0));
        let prompt = Scripted {
            decision,
            asked: asked.clone(),
        };
        (PermissionGate::new(PermissionRecord::load(path), Box::new(prompt)), asked)
    }

    #[test]
    fn test_missing_and_corrupt_files_are_empty() {
        let dir = tempdir().unwrap();
        let missing = PermissionRecord::load(dir.path().join("nope.json"));
        assert!(missing.tools().is_empty());

        let corrupt = dir.path().join("corrupt.json");
        std::fs::write(&corrupt, "{ not json").unwrap();
        assert!(PermissionRecord::load(&corrupt).tools().is_empty());
    }

    #[test]
    fn test_insert_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("permissions.json");
        let mut record = PermissionRecord::load(&path);
        assert!(record.insert("read_file_content"));
        assert!(!record.insert("read_file_content"));
        record.save().unwrap();

        let reloaded = PermissionRecord::load(&path);
        assert_eq!(reloaded.tools(), &["read_file_content".to_string()]);
    }

    #[test]
    fn test_save_writes_expected_shape() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("permissions.json");
        let mut record = PermissionRecord::load(&path);
        record.insert("delete_files");
        record.save().unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({"always_allowed": ["delete_files"]}));
        assert!(!dir.path().join("nested").join("permissions.json.tmp").exists());
    }

    #[test]
    fn test_choice_mapping() {
        assert_eq!(PermissionDecision::from_choice("1"), Some(PermissionDecision::AllowOnce));
        assert_eq!(PermissionDecision::from_choice(" 2\n"), Some(PermissionDecision::AllowAlways));
        assert_eq!(PermissionDecision::from_choice("3"), Some(PermissionDecision::Deny));
        assert_eq!(PermissionDecision::from_choice("yes"), None);
    }

    #[tokio::test]
    async fn test_allow_always_persists_and_skips_next_prompt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("permissions.json");
        let (mut gate, asked) = gate(&path, PermissionDecision::AllowAlways);

        assert_eq!(gate.check("execute_shell_command"), PermissionCheck::NeedsPrompt);
        assert_eq!(gate.authorize(request("execute_shell_command")).await, Authorization::Allowed);
        assert_eq!(gate.authorize(request("execute_shell_command")).await, Authorization::Allowed);
        assert_eq!(asked.load(Ordering::SeqCst), 1);

        // Survives a new session
        assert!(PermissionRecord::load(&path).contains("execute_shell_command"));
    }

    #[tokio::test]
    async fn test_unsaved_allow_always_prompts_again() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let (mut gate, asked) = gate(&blocker.join("permissions.json"), PermissionDecision::AllowAlways);

        assert_eq!(gate.authorize(request("delete_files")).await, Authorization::Allowed);
        assert!(!gate.record().contains("delete_files"));
        assert_eq!(gate.check("delete_files"), PermissionCheck::NeedsPrompt);

        assert_eq!(gate.authorize(request("delete_files")).await, Authorization::Allowed);
        assert_eq!(asked.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_allow_once_prompts_every_time() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("permissions.json");
        let (mut gate, asked) = gate(&path, PermissionDecision::AllowOnce);

        gate.authorize(request("delete_files")).await;
        gate.authorize(request("delete_files")).await;
        assert_eq!(asked.load(Ordering::SeqCst), 2);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_deny() {
        let dir = tempdir().unwrap();
        let (mut gate, _) = gate(&dir.path().join("p.json"), PermissionDecision::Deny);
        assert_eq!(
            gate.authorize(request("delete_files")).await,
            Authorization::Denied(DenialReason::User)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_denial() {
        let dir = tempdir().unwrap();
        let record = PermissionRecord::load(dir.path().join("p.json"));
        let mut gate = PermissionGate::new(record, Box::new(NeverAnswers))
            .with_timeout(Some(Duration::from_secs(300)));

        assert_eq!(
            gate.authorize(request("execute_shell_command")).await,
            Authorization::Denied(DenialReason::TimedOut)
        );
    }
}
