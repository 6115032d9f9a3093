//! LLM provider adapters
//!
//! Each adapter turns one backend's streaming wire format into the shared
//! [`NormalizedEvent`] vocabulary, so the agent loop never sees
//! provider-specific shapes.

mod gemini;
mod groq;
mod sse;

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::agent::types::{NormalizedEvent, Turn};
use crate::config::ProviderConfig;
use crate::error::Result;
use crate::mcp::ToolCatalog;

pub use crate::config::ProviderKind;
pub use gemini::GeminiAdapter;
pub use groq::GroqAdapter;

/// Lazily consumed sequence of normalized events for one model turn.
///
/// An `Err` item of class `ToolArgumentDecode` is per-call and the stream
/// continues after it; any other `Err` ends the turn. Dropping the stream
/// closes the underlying HTTP response.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<NormalizedEvent>> + Send>>;

/// A model backend able to generate with tools and history
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Backend family
    fn kind(&self) -> ProviderKind;

    /// Model name sent with each request
    fn model(&self) -> &str;

    /// Start one streamed generation over the full conversation.
    ///
    /// HTTP-level failures (rate limits, bad credentials) are returned
    /// here, before any event is produced.
    async fn generate(&self, turns: &[Turn], system_prompt: &str) -> Result<EventStream>;
}

/// Build the adapter for `kind`, declaring every tool in `catalog`
pub fn build_adapter(
    config: &ProviderConfig,
    kind: ProviderKind,
    catalog: &ToolCatalog,
) -> Result<Box<dyn ProviderAdapter>> {
    let declarations = catalog.declarations(kind);
    Ok(match kind {
        ProviderKind::Gemini => Box::new(GeminiAdapter::new(config.gemini.clone(), declarations)?),
        ProviderKind::Groq => Box::new(GroqAdapter::new(config.groq.clone(), declarations)?),
    })
}
