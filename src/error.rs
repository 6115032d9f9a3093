//! Error types for CLIA

use std::time::Duration;
use thiserror::Error;

/// Result type alias using CLIA's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for CLIA
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The tool server was unreachable or advertised no tools
    #[error("Tool discovery failed: {0}")]
    ToolDiscovery(String),

    /// Transport-level failure talking to the tool server
    #[error("Connection error: {0}")]
    Connection(String),

    /// Provider request or stream failed (non-retryable)
    #[error("Provider error: {0}")]
    ProviderTransport(String),

    /// Provider asked us to slow down
    #[error("Rate limit exceeded: {message}")]
    RateLimited {
        message: String,
        /// Backoff indicated by the provider, if any
        retry_after: Option<Duration>,
    },

    /// Provider rejected the credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Tool-call arguments could not be decoded into a mapping
    #[error("Could not decode arguments for tool '{name}': {reason}")]
    ToolArgumentDecode {
        call_id: String,
        name: String,
        reason: String,
    },

    /// Nobody answered a permission prompt in time
    #[error("Permission request for tool '{0}' timed out")]
    PermissionTimeout(String),

    /// The in-flight request was interrupted by the user
    #[error("Request cancelled")]
    Cancelled,

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if error is retryable
    ///
    /// Only rate-limit responses are retried; every other provider failure
    /// aborts the current request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }

    /// Check if error ends the whole session rather than one request
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ToolDiscovery(_))
    }

    /// Short user-facing label for the error class
    pub fn label(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::ToolDiscovery(_) => "Tool Discovery Error",
            Error::Connection(_) => "Tool Server Connection Error",
            Error::ProviderTransport(_) | Error::Http(_) => "Provider Error",
            Error::RateLimited { .. } => "Rate Limited",
            Error::Unauthorized(_) => "Authentication Error",
            Error::ToolArgumentDecode { .. } => "Tool Argument Error",
            Error::PermissionTimeout(_) => "Permission Timeout",
            Error::Cancelled => "Cancelled",
            Error::Json(_) => "Serialization Error",
            Error::Io(_) => "I/O Error",
            Error::InvalidInput(_) => "Invalid Input",
            Error::Internal(_) => "Internal Error",
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Config(format!("Invalid URL: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limits_are_retryable() {
        let limited = Error::RateLimited {
            message: "slow down".into(),
            retry_after: Some(Duration::from_secs(5)),
        };
        assert!(limited.is_retryable());
        assert!(!Error::ProviderTransport("boom".into()).is_retryable());
        assert!(!Error::Unauthorized("bad key".into()).is_retryable());
    }

    #[test]
    fn discovery_is_the_only_fatal_class() {
        assert!(Error::ToolDiscovery("no tools".into()).is_fatal());
        assert!(!Error::ProviderTransport("x".into()).is_fatal());
        assert!(!Error::PermissionTimeout("t".into()).is_fatal());
    }

    #[test]
    fn labels_are_distinct() {
        let errors = [
            Error::ToolDiscovery(String::new()),
            Error::ProviderTransport(String::new()),
            Error::RateLimited { message: String::new(), retry_after: None },
            Error::ToolArgumentDecode {
                call_id: String::new(),
                name: String::new(),
                reason: String::new(),
            },
            Error::PermissionTimeout(String::new()),
            Error::Cancelled,
        ];
        let mut labels: Vec<_> = errors.iter().map(|e| e.label()).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), errors.len());
    }
}
