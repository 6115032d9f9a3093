//! Gemini adapter
//!
//! Streams `streamGenerateContent` over SSE. Each chunk carries an ordered
//! list of parts; text parts flagged `thought` are reasoning, and a
//! `functionCall` part ends the turn's streaming.

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use tracing::debug;

use super::sse::{self, SseEvent};
use super::{EventStream, ProviderAdapter, ProviderKind};
use crate::agent::types::{
    ContentUnit, NormalizedEvent, Role, ToolArguments, ToolCallRequest, Turn, TurnContent,
};
use crate::config::GeminiConfig;
use crate::error::{Error, Result};

/// Adapter for the Gemini `generativelanguage` API
pub struct GeminiAdapter {
    client: reqwest::Client,
    config: GeminiConfig,
    declarations: Vec<Value>,
}

impl GeminiAdapter {
    /// Create a new adapter declaring the given function declarations
    pub fn new(config: GeminiConfig, declarations: Vec<Value>) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            header::HeaderValue::from_str(config.api_key.expose_secret())
                .map_err(|e| Error::Config(format!("Invalid API key format: {}", e)))?,
        );

        let client = sse::build_client(config.timeout_secs, headers)?;
        Ok(GeminiAdapter {
            client,
            config,
            declarations,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn request_body(&self, turns: &[Turn], system_prompt: &str) -> Value {
        let mut body = json!({
            "contents": contents(turns),
            "systemInstruction": {"parts": [{"text": system_prompt}]},
            "generationConfig": {
                "thinkingConfig": {"includeThoughts": self.config.include_thoughts}
            }
        });
        if !self.declarations.is_empty() {
            body["tools"] = json!([{"functionDeclarations": self.declarations}]);
        }
        body
    }
}

/// Render the conversation as Gemini `Content` objects.
///
/// Tool results go back as `functionResponse` parts under the user role;
/// consecutive results are merged into one content so they answer the
/// preceding model turn together.
fn contents(turns: &[Turn]) -> Vec<Value> {
    let mut contents: Vec<Value> = Vec::with_capacity(turns.len());
    let mut pending_responses: Vec<Value> = Vec::new();

    for turn in turns {
        if turn.role != Role::Tool && !pending_responses.is_empty() {
            contents.push(json!({"role": "user", "parts": std::mem::take(&mut pending_responses)}));
        }

        match turn.role {
            Role::Tool => {
                for result in turn.tool_results() {
                    pending_responses.push(json!({
                        "functionResponse": {
                            "name": result.name,
                            "response": {"result": result.content},
                        }
                    }));
                }
            }
            Role::User => {
                contents.push(json!({"role": "user", "parts": [{"text": turn.text()}]}));
            }
            Role::Model => {
                let parts: Vec<Value> = match &turn.content {
                    TurnContent::Text(text) => vec![json!({"text": text})],
                    TurnContent::Units(units) => units
                        .iter()
                        .filter_map(|unit| match unit {
                            ContentUnit::Text(text) => Some(json!({"text": text})),
                            ContentUnit::ToolCall(call) => {
                                let mut part = json!({
                                    "functionCall": {
                                        "name": call.name,
                                        "args": call.arguments.to_json(),
                                    }
                                });
                                if let Some(ref signature) = call.signature {
                                    part["thoughtSignature"] = json!(signature);
                                }
                                Some(part)
                            }
                            ContentUnit::ToolResult(_) => None,
                        })
                        .collect(),
                };
                contents.push(json!({"role": "model", "parts": parts}));
            }
        }
    }

    if !pending_responses.is_empty() {
        contents.push(json!({"role": "user", "parts": pending_responses}));
    }
    contents
}

/// Demultiplex one chunk's parts, in order. Returns whether a function
/// call was seen.
fn chunk_events(chunk: &Value, next_call: &mut usize, out: &mut Vec<Result<NormalizedEvent>>) -> bool {
    let parts = chunk
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array);
    let Some(parts) = parts else {
        return false;
    };

    let mut saw_call = false;
    for part in parts {
        if let Some(call) = part.get("functionCall") {
            saw_call = true;
            let id = format!("call_{}", *next_call);
            *next_call += 1;
            let name = call
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let args = call.get("args").cloned().unwrap_or(Value::Null);

            match ToolArguments::from_json(args) {
                Ok(arguments) => {
                    let mut request = ToolCallRequest::new(id, name, arguments);
                    request.signature = part
                        .get("thoughtSignature")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    out.push(Ok(NormalizedEvent::ToolCall(request)));
                }
                Err(reason) => out.push(Err(Error::ToolArgumentDecode {
                    call_id: id,
                    name,
                    reason,
                })),
            }
            continue;
        }

        if let Some(text) = part.get("text").and_then(Value::as_str) {
            if text.is_empty() {
                continue;
            }
            if part.get("thought").and_then(Value::as_bool).unwrap_or(false) {
                out.push(Ok(NormalizedEvent::ThoughtDelta(text.to_string())));
            } else {
                out.push(Ok(NormalizedEvent::TextDelta(text.to_string())));
            }
        }
    }
    saw_call
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, turns: &[Turn], system_prompt: &str) -> Result<EventStream> {
        let body = self.request_body(turns, system_prompt);
        debug!("Sending request to Gemini: model={}, turns={}", self.config.model, turns.len());

        let response = self.client.post(self.endpoint()).json(&body).send().await?;
        let response = sse::check_status(response).await?;

        let stream = stream! {
            let mut events = Box::pin(sse::json_events(response));
            let mut next_call = 0usize;

            while let Some(event) = events.next().await {
                let chunk = match event {
                    Ok(SseEvent::Message(chunk)) => chunk,
                    Ok(SseEvent::Done) => break,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                };

                if let Some(err) = sse::stream_error(&chunk) {
                    yield Err(err);
                    break;
                }

                let mut out = Vec::new();
                let saw_call = chunk_events(&chunk, &mut next_call, &mut out);
                for item in out {
                    yield item;
                }
                if saw_call {
                    debug!("Gemini chunk carried a function call; ending stream");
                    break;
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
