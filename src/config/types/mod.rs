//! Configuration types module

pub mod provider;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Agent loop configuration
    #[serde(default)]
    pub agent: AgentConfig,

    /// Provider configuration (Gemini, Groq)
    #[serde(default)]
    pub provider: provider::ProviderConfig,

    /// How to launch the tool server
    #[serde(default)]
    pub tool_server: ToolServerConfig,

    /// Permission record configuration
    #[serde(default)]
    pub permissions: PermissionsConfig,
}

impl Config {
    /// Load configuration from defaults, the config file and the environment
    pub fn from_env() -> crate::error::Result<Self> {
        crate::config::load_config()
    }
}

/// Agent loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model-inference-then-tool cycles allowed per user request
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Replaces the built-in system prompt when set
    pub system_prompt_file: Option<PathBuf>,
    /// Backoff used when a rate-limited provider gives no delay
    #[serde(with = "humantime_serde", default = "default_rate_limit_fallback")]
    pub rate_limit_fallback: Duration,
    /// Consecutive rate-limit retries before giving up on a turn
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            max_turns: default_max_turns(),
            system_prompt_file: None,
            rate_limit_fallback: default_rate_limit_fallback(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
        }
    }
}

fn default_max_turns() -> u32 {
    15
}

fn default_rate_limit_fallback() -> Duration {
    Duration::from_secs(60)
}

fn default_max_rate_limit_retries() -> u32 {
    5
}

/// Tool server launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    /// Executable speaking MCP over stdio
    #[serde(default = "default_tool_server_command")]
    pub command: PathBuf,
    /// Extra arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Upper bound on a single shell command
    #[serde(with = "humantime_serde", default = "default_shell_timeout")]
    pub shell_timeout: Duration,
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        ToolServerConfig {
            command: default_tool_server_command(),
            args: Vec::new(),
            shell_timeout: default_shell_timeout(),
        }
    }
}

/// `clia-tools` next to the running executable, or on PATH
fn default_tool_server_command() -> PathBuf {
    let name = format!("clia-tools{}", std::env::consts::EXE_SUFFIX);
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&name)))
        .filter(|candidate| candidate.exists())
        .unwrap_or_else(|| PathBuf::from(name))
}

fn default_shell_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Permission record configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionsConfig {
    /// File holding the always-allowed tool names
    #[serde(default = "default_permissions_file")]
    pub file: PathBuf,
    /// Treat an unanswered permission prompt as denied after this long
    #[serde(with = "humantime_serde", default)]
    pub prompt_timeout: Option<Duration>,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        PermissionsConfig {
            file: default_permissions_file(),
            prompt_timeout: None,
        }
    }
}

fn default_permissions_file() -> PathBuf {
    PathBuf::from("permissions.json")
}
