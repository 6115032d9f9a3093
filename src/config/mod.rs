//! Configuration module
//!
//! - types/mod.rs: Core configuration types (Config, AgentConfig, etc.)
//! - types/provider.rs: LLM provider configuration
//! - io.rs: Configuration loading and saving
//! - validation.rs: Configuration validation
//! - paths.rs: Configuration file paths

mod io;
mod paths;
mod types;
mod validation;

// Re-export core config types
pub use types::{AgentConfig, Config, PermissionsConfig, ToolServerConfig};

// Re-export provider types
pub use types::provider::{GeminiConfig, GroqConfig, ProviderConfig, ProviderKind};

// Re-export IO and utilities
pub use io::{apply_env_overrides, apply_overrides_from, load_config, load_config_from_path, save_config};
pub use paths::{config_dir, config_path, ensure_dir, state_dir};
pub use validation::{validate_config, ConfigValidationResult, ValidationIssue};
