//! Provider configuration types
//!
//! Configuration for the two supported LLM backends (Gemini and Groq).

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Which backend drives the agent loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google Gemini (structured turns, typed thought parts)
    Gemini,
    /// Groq, or any OpenAI-compatible chat completions endpoint
    #[default]
    Groq,
}

impl std::str::FromStr for ProviderKind {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "groq" => Ok(ProviderKind::Groq),
            _ => Err(crate::error::Error::Config(format!(
                "Invalid provider: {}. Valid: gemini, groq",
                s
            ))),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Gemini => write!(f, "gemini"),
            ProviderKind::Groq => write!(f, "groq"),
        }
    }
}

/// Provider configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider used when none is given on the command line
    #[serde(default)]
    pub default: ProviderKind,
    /// Gemini configuration
    #[serde(default)]
    pub gemini: GeminiConfig,
    /// Groq configuration
    #[serde(default)]
    pub groq: GroqConfig,
}

impl ProviderConfig {
    /// Whether an API key is present for `kind`
    pub fn has_api_key(&self, kind: ProviderKind) -> bool {
        use secrecy::ExposeSecret;
        match kind {
            ProviderKind::Gemini => !self.gemini.api_key.expose_secret().is_empty(),
            ProviderKind::Groq => !self.groq.api_key.expose_secret().is_empty(),
        }
    }
}

fn default_secret() -> SecretString {
    SecretString::from(String::new())
}

fn default_timeout() -> u64 {
    300
}

/// Gemini configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// API key
    #[serde(skip_serializing, default = "default_secret")]
    pub api_key: SecretString,
    /// Model name
    #[serde(default = "default_gemini_model")]
    pub model: String,
    /// Base URL
    #[serde(default = "default_gemini_url")]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Ask the model to stream its reasoning as thought parts
    #[serde(default = "default_true")]
    pub include_thoughts: bool,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        GeminiConfig {
            api_key: default_secret(),
            model: default_gemini_model(),
            base_url: default_gemini_url(),
            timeout_secs: default_timeout(),
            include_thoughts: true,
        }
    }
}

fn default_gemini_model() -> String {
    "gemini-flash-latest".to_string()
}

fn default_gemini_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_true() -> bool {
    true
}

/// Groq configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroqConfig {
    /// API key
    #[serde(skip_serializing, default = "default_secret")]
    pub api_key: SecretString,
    /// Model name
    #[serde(default = "default_groq_model")]
    pub model: String,
    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_groq_url")]
    pub base_url: String,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Completion token cap per request
    #[serde(default = "default_max_completion_tokens")]
    pub max_completion_tokens: u32,
    /// Nucleus sampling
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for GroqConfig {
    fn default() -> Self {
        GroqConfig {
            api_key: default_secret(),
            model: default_groq_model(),
            base_url: default_groq_url(),
            temperature: default_temperature(),
            max_completion_tokens: default_max_completion_tokens(),
            top_p: default_top_p(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_groq_model() -> String {
    "moonshotai/kimi-k2-instruct-0905".to_string()
}

fn default_groq_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_temperature() -> f64 {
    0.6
}

fn default_max_completion_tokens() -> u32 {
    4096
}

fn default_top_p() -> f64 {
    1.0
}
