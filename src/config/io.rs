//! Configuration I/O - Loading and saving configuration
//!
//! Handles reading configuration from files and environment variables.

use std::path::Path;

use secrecy::SecretString;

use super::types::Config;
use crate::error::{Error, Result};

/// Load configuration with layered precedence:
/// 1. Config file if it exists, otherwise defaults
/// 2. Environment variable overrides (includes .env)
///
/// Command-line flags are applied on top by the binary.
pub fn load_config() -> Result<Config> {
    let config_path = super::paths::config_path();

    let mut config = if config_path.exists() {
        load_config_from_path(&config_path)?
    } else {
        Config::default()
    };

    // Load .env file if it exists
    dotenvy::dotenv().ok();

    // Apply environment variable overrides (highest precedence)
    apply_env_overrides(&mut config);

    Ok(config)
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    // Detect format by extension
    let config: Config = if path.extension().map_or(false, |ext| ext == "json") {
        // Parse as JSON5 (more lenient than strict JSON)
        json5::from_str(&content).map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))?
    } else if path.extension().map_or(false, |ext| ext == "toml") {
        toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))?
    } else {
        // Try JSON5 first, then TOML
        json5::from_str(&content)
            .or_else(|_| toml::from_str(&content).map_err(|e| Error::Config(e.to_string())))
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?
    };

    Ok(config)
}

/// Apply environment variable overrides to an existing config.
///
/// Env vars have the highest precedence among the file-backed layers:
/// defaults < file < env.
pub fn apply_env_overrides(config: &mut Config) {
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

/// Same as [`apply_env_overrides`] with an explicit variable lookup
pub fn apply_overrides_from<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(provider) = lookup("DEFAULT_PROVIDER") {
        match provider.parse() {
            Ok(kind) => config.provider.default = kind,
            Err(e) => tracing::warn!("Ignoring DEFAULT_PROVIDER: {}", e),
        }
    }

    // Gemini overrides
    if let Some(api_key) = lookup("GOOGLE_API_KEY") {
        config.provider.gemini.api_key = SecretString::from(api_key);
    }
    if let Some(model) = lookup("GOOGLE_MODEL_NAME") {
        config.provider.gemini.model = model;
    }
    if let Some(url) = lookup("GOOGLE_BASE_URL") {
        config.provider.gemini.base_url = url;
    }

    // Groq overrides
    if let Some(api_key) = lookup("GROQ_API_KEY") {
        config.provider.groq.api_key = SecretString::from(api_key);
    }
    if let Some(model) = lookup("GROQ_MODEL_NAME") {
        config.provider.groq.model = model;
    }
    if let Some(url) = lookup("GROQ_BASE_URL") {
        config.provider.groq.base_url = url;
    }

    // Agent overrides
    if let Some(turns) = lookup("CLIA_MAX_TURNS") {
        if let Ok(v) = turns.parse() {
            config.agent.max_turns = v;
        }
    }

    // Permission record
    if let Some(file) = lookup("CLIA_PERMISSIONS_FILE") {
        config.permissions.file = std::path::PathBuf::from(file);
    }

    // Tool server
    if let Some(command) = lookup("CLIA_TOOL_SERVER") {
        config.tool_server.command = std::path::PathBuf::from(command);
    }
}

/// Save configuration to a file
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    let content = if path.extension().map_or(false, |ext| ext == "toml") {
        toml::to_string_pretty(config).map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    } else {
        serde_json::to_string_pretty(config).map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test_config.json");

        let mut config = Config::default();
        config.agent.max_turns = 9;
        config.provider.groq.api_key = SecretString::from("gsk-secret".to_string());
        save_config(&config, &path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("gsk-secret"), "API keys are never written");

        let loaded = load_config_from_path(&path).unwrap();
        assert_eq!(loaded.agent.max_turns, 9);
        assert_eq!(loaded.provider.groq.model, config.provider.groq.model);
    }

    #[test]
    fn test_save_and_load_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.tool_server.shell_timeout = Duration::from_secs(45);
        save_config(&config, &path).unwrap();

        let loaded = load_config_from_path(&path).unwrap();
        assert_eq!(loaded.tool_server.shell_timeout, Duration::from_secs(45));
    }

    #[test]
    fn test_json5_comments_accepted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            "{\n  // switch backends here\n  provider: { default: 'gemini' },\n}\n",
        )
        .unwrap();

        let loaded = load_config_from_path(&path).unwrap();
        assert_eq!(loaded.provider.default, ProviderKind::Gemini);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DEFAULT_PROVIDER", "gemini"),
            ("GOOGLE_API_KEY", "g-key"),
            ("GOOGLE_MODEL_NAME", "gemini-2.5-pro"),
            ("GROQ_BASE_URL", "http://localhost:9999/v1"),
            ("CLIA_PERMISSIONS_FILE", "/tmp/perms.json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        apply_overrides_from(&mut config, |k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.provider.default, ProviderKind::Gemini);
        assert_eq!(config.provider.gemini.api_key.expose_secret(), "g-key");
        assert_eq!(config.provider.gemini.model, "gemini-2.5-pro");
        assert_eq!(config.provider.groq.base_url, "http://localhost:9999/v1");
        assert_eq!(config.permissions.file, std::path::PathBuf::from("/tmp/perms.json"));
    }

    #[test]
    fn test_invalid_default_provider_ignored() {
        let mut config = Config::default();
        apply_overrides_from(&mut config, |k| {
            (k == "DEFAULT_PROVIDER").then(|| "mystery".to_string())
        });
        assert_eq!(config.provider.default, ProviderKind::Groq);
    }
}
