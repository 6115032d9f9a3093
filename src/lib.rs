//! # CLIA
//!
//! A terminal chat agent that drives a Gemini or Groq model against a local
//! MCP tool server.
//!
//! ## Features
//!
//! - **One agent loop, two providers:** Gemini and Groq (OpenAI-compatible)
//!   streams are normalized into a single event vocabulary
//! - **MCP tool server:** tools are discovered once per session and invoked
//!   over stdio JSON-RPC
//! - **Permission gate:** every tool call is approved once, always, or denied,
//!   with "always" decisions persisted to disk
//! - **Bounded:** a per-request turn budget, rate-limit backoff and
//!   cancellable requests

pub mod agent;
pub mod config;
pub mod error;
pub mod mcp;
pub mod providers;
pub mod tools;

pub use config::Config;
pub use error::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
