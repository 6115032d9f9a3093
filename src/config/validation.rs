//! Configuration validation
//!
//! Validates configuration and reports issues.

use super::types::provider::ProviderKind;
use super::types::Config;

/// Result of configuration validation
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    /// Whether the config is valid
    pub valid: bool,
    /// Validation errors (critical)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (non-critical)
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }
}

/// A validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the config field
    pub path: String,
    /// Issue message
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create a new issue
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    result = validate_provider_config(config, result);
    result = validate_agent_config(config, result);
    result = validate_tool_server_config(config, result);

    result
}

fn validate_provider_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    let kind = config.provider.default;

    if !config.provider.has_api_key(kind) {
        let (path, var) = match kind {
            ProviderKind::Gemini => ("provider.gemini.api_key", "GOOGLE_API_KEY"),
            ProviderKind::Groq => ("provider.groq.api_key", "GROQ_API_KEY"),
        };
        result = result.with_error(
            ValidationIssue::new(path, format!("No API key configured for provider '{}'", kind))
                .with_suggestion(format!("Set {} in the environment or run `clia setup`", var)),
        );
    }

    let base_url = match kind {
        ProviderKind::Gemini => &config.provider.gemini.base_url,
        ProviderKind::Groq => &config.provider.groq.base_url,
    };
    if url::Url::parse(base_url).is_err() {
        result = result.with_error(ValidationIssue::new(
            format!("provider.{}.base_url", kind),
            format!("Not a valid URL: {}", base_url),
        ));
    }

    result
}

fn validate_agent_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.agent.max_turns == 0 {
        result = result.with_error(
            ValidationIssue::new("agent.max_turns", "Turn budget must be at least 1")
                .with_suggestion("Use a value between 9 and 15"),
        );
    }

    if let Some(ref file) = config.agent.system_prompt_file {
        if !file.exists() {
            result = result.with_warning(ValidationIssue::new(
                "agent.system_prompt_file",
                format!(
                    "System prompt file does not exist: {}; the built-in prompt will be used",
                    file.display()
                ),
            ));
        }
    }

    result
}

fn validate_tool_server_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.tool_server.shell_timeout.is_zero() {
        result = result.with_warning(ValidationIssue::new(
            "tool_server.shell_timeout",
            "A zero shell timeout makes every shell command fail immediately",
        ));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn test_validate_default_config() {
        let config = Config::default();
        let result = validate_config(&config);

        // No API key in the defaults
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].path, "provider.groq.api_key");
    }

    #[test]
    fn test_validate_configured() {
        let mut config = Config::default();
        config.provider.default = ProviderKind::Gemini;
        config.provider.gemini.api_key = SecretString::from("key".to_string());

        let result = validate_config(&config);
        assert!(result.valid, "{:?}", result.errors);
    }

    #[test]
    fn test_zero_turn_budget_rejected() {
        let mut config = Config::default();
        config.provider.groq.api_key = SecretString::from("key".to_string());
        config.agent.max_turns = 0;

        let result = validate_config(&config);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.path == "agent.max_turns"));
    }
}
