//! Groq adapter (OpenAI-compatible chat completions)
//!
//! Reasoning arrives as a per-chunk `reasoning` field. Tool-call arguments
//! arrive as JSON text split across chunks; fragments are accumulated per
//! call index and decoded once the stream ends.

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

use super::sse::{self, SseEvent};
use super::{EventStream, ProviderAdapter, ProviderKind};
use crate::agent::types::{
    ContentUnit, NormalizedEvent, Role, ToolArguments, ToolCallRequest, Turn, TurnContent,
};
use crate::config::GroqConfig;
use crate::error::{Error, Result};

/// Adapter for Groq's OpenAI-compatible API
pub struct GroqAdapter {
    client: reqwest::Client,
    config: GroqConfig,
    tools: Vec<Value>,
}

impl GroqAdapter {
    /// Create a new adapter declaring the given tools
    pub fn new(config: GroqConfig, tools: Vec<Value>) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", config.api_key.expose_secret()))
                .map_err(|e| Error::Config(format!("Invalid API key format: {}", e)))?,
        );

        let client = sse::build_client(config.timeout_secs, headers)?;
        Ok(GroqAdapter {
            client,
            config,
            tools,
        })
    }

    fn request_body(&self, turns: &[Turn], system_prompt: &str) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "messages": messages(turns, system_prompt),
            "stream": true,
            "temperature": self.config.temperature,
            "max_completion_tokens": self.config.max_completion_tokens,
            "top_p": self.config.top_p,
        });
        if !self.tools.is_empty() {
            body["tools"] = json!(self.tools);
            body["tool_choice"] = json!("auto");
        }
        body
    }
}

/// Render the conversation as role/content records
fn messages(turns: &[Turn], system_prompt: &str) -> Vec<Value> {
    let mut messages = Vec::with_capacity(turns.len() + 1);
    messages.push(json!({"role": "system", "content": system_prompt}));

    for turn in turns {
        match turn.role {
            Role::User => messages.push(json!({"role": "user", "content": turn.text()})),
            Role::Model => {
                let mut message = json!({"role": "assistant"});
                let text = turn.text();
                let calls: Vec<Value> = turn
                    .tool_calls()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": call.arguments.to_json().to_string(),
                            }
                        })
                    })
                    .collect();
                message["content"] = if text.is_empty() && !calls.is_empty() {
                    Value::Null
                } else {
                    json!(text)
                };
                if !calls.is_empty() {
                    message["tool_calls"] = json!(calls);
                }
                messages.push(message);
            }
            Role::Tool => {
                if let TurnContent::Units(ref units) = turn.content {
                    for unit in units {
                        if let ContentUnit::ToolResult(result) = unit {
                            messages.push(json!({
                                "role": "tool",
                                "tool_call_id": result.call_id,
                                "name": result.name,
                                "content": result.content,
                            }));
                        }
                    }
                }
            }
        }
    }
    messages
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Accumulates one streamed completion
#[derive(Debug, Default)]
struct StreamAccumulator {
    tool_calls: BTreeMap<u64, PartialToolCall>,
}

impl StreamAccumulator {
    /// Handle one chunk's delta, returning the text events it carried
    fn process_delta(&mut self, delta: &Value) -> Vec<NormalizedEvent> {
        let mut events = Vec::new();

        if let Some(reasoning) = delta.get("reasoning").and_then(Value::as_str) {
            if !reasoning.is_empty() {
                events.push(NormalizedEvent::ThoughtDelta(reasoning.to_string()));
            }
        }

        if let Some(content) = delta.get("content").and_then(Value::as_str) {
            if !content.is_empty() {
                events.push(NormalizedEvent::TextDelta(content.to_string()));
            }
        }

        if let Some(tool_calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for (position, tool_call) in tool_calls.iter().enumerate() {
                let index = tool_call
                    .get("index")
                    .and_then(Value::as_u64)
                    .unwrap_or(position as u64);
                let partial = self.tool_calls.entry(index).or_default();

                if let Some(id) = tool_call.get("id").and_then(Value::as_str) {
                    partial.id = Some(id.to_string());
                }
                if let Some(function) = tool_call.get("function") {
                    if let Some(name) = function.get("name").and_then(Value::as_str) {
                        partial.name = Some(name.to_string());
                    }
                    match function.get("arguments") {
                        Some(Value::String(args)) => partial.arguments.push_str(args),
                        // Some compatible servers send the object already decoded
                        Some(obj @ Value::Object(_)) => partial.arguments.push_str(&obj.to_string()),
                        _ => {}
                    }
                }
            }
        }

        events
    }

    /// Decode every accumulated call, in index order
    fn finish(self) -> Vec<Result<NormalizedEvent>> {
        self.tool_calls
            .into_iter()
            .map(|(index, partial)| {
                let id = partial.id.unwrap_or_else(|| format!("call_{}", index));
                let Some(name) = partial.name else {
                    return Err(Error::ToolArgumentDecode {
                        call_id: id,
                        name: String::new(),
                        reason: "tool call carried no function name".to_string(),
                    });
                };
                match ToolArguments::parse(&partial.arguments) {
                    Ok(arguments) => Ok(NormalizedEvent::ToolCall(ToolCallRequest::new(id, name, arguments))),
                    Err(reason) => Err(Error::ToolArgumentDecode {
                        call_id: id,
                        name,
                        reason,
                    }),
                }
            })
            .collect()
    }
}

#[async_trait]
impl ProviderAdapter for GroqAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Groq
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, turns: &[Turn], system_prompt: &str) -> Result<EventStream> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = self.request_body(turns, system_prompt);
        debug!("Sending request to Groq: model={}, turns={}", self.config.model, turns.len());

        let response = self.client.post(&url).json(&body).send().await?;
        let response = sse::check_status(response).await?;

        let stream = stream! {
            let mut events = Box::pin(sse::json_events(response));
            let mut accumulator = StreamAccumulator::default();
            let mut failed = false;

            while let Some(event) = events.next().await {
                let chunk = match event {
                    Ok(SseEvent::Message(chunk)) => chunk,
                    Ok(SseEvent::Done) => break,
                    Err(e) => {
                        yield Err(e);
                        failed = true;
                        break;
                    }
                };

                if let Some(err) = sse::stream_error(&chunk) {
                    yield Err(err);
                    failed = true;
                    break;
                }

                if let Some(delta) = chunk.pointer("/choices/0/delta") {
                    for event in accumulator.process_delta(delta) {
                        yield Ok(event);
                    }
                }
            }

            if !failed {
                for item in accumulator.finish() {
                    yield item;
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
