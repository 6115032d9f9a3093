//! Type definitions for the agent module

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Role of a turn in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message
    User,
    /// Model (assistant) response
    Model,
    /// Tool result
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Model => write!(f, "model"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A single decoded tool argument value
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    String(String),
    Number(Number),
    Boolean(bool),
    List(Vec<ArgValue>),
    Object(ToolArguments),
}

impl ArgValue {
    /// Decode a JSON value. `null` has no counterpart and yields `None`.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(ArgValue::Boolean(b)),
            Value::Number(n) => Some(ArgValue::Number(n)),
            Value::String(s) => Some(ArgValue::String(s)),
            Value::Array(items) => Some(ArgValue::List(
                items.into_iter().filter_map(ArgValue::from_json).collect(),
            )),
            Value::Object(map) => Some(ArgValue::Object(ToolArguments::from_map(map))),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ArgValue::String(s) => Value::String(s.clone()),
            ArgValue::Number(n) => Value::Number(n.clone()),
            ArgValue::Boolean(b) => Value::Bool(*b),
            ArgValue::List(items) => Value::Array(items.iter().map(ArgValue::to_json).collect()),
            ArgValue::Object(args) => args.to_json(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for ArgValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgValue::String(s) => write!(f, "{:?}", s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

/// Argument mapping of a tool call, keyed by parameter name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments(BTreeMap<String, ArgValue>);

impl ToolArguments {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_map(map: Map<String, Value>) -> Self {
        ToolArguments(
            map.into_iter()
                .filter_map(|(k, v)| ArgValue::from_json(v).map(|v| (k, v)))
                .collect(),
        )
    }

    /// Decode an already-parsed JSON value; anything but an object is rejected.
    pub fn from_json(value: Value) -> std::result::Result<Self, String> {
        match value {
            Value::Object(map) => Ok(Self::from_map(map)),
            Value::Null => Ok(Self::new()),
            other => Err(format!("expected a JSON object, got `{}`", other)),
        }
    }

    /// Decode arguments delivered as serialized JSON text.
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        if raw.trim().is_empty() {
            return Ok(Self::new());
        }
        let value: Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        Self::from_json(value)
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ArgValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ArgValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ToolArguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{}", rendered.join(", "))
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    /// Invocation id; tool results reference it
    pub id: String,
    pub name: String,
    pub arguments: ToolArguments,
    /// Opaque provider token that must be echoed back with the call
    pub signature: Option<String>,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: ToolArguments) -> Self {
        ToolCallRequest {
            id: id.into(),
            name: name.into(),
            arguments,
            signature: None,
        }
    }
}

/// Result of one tool invocation, as folded back into the conversation
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocationResult {
    /// Id of the request this answers
    pub call_id: String,
    pub name: String,
    /// Free-form payload returned by the tool server
    pub content: String,
    /// Set when the tool server flagged the call as an error
    pub is_error: bool,
}

impl ToolInvocationResult {
    pub fn new(call: &ToolCallRequest, content: impl Into<String>, is_error: bool) -> Self {
        ToolInvocationResult {
            call_id: call.id.clone(),
            name: call.name.clone(),
            content: content.into(),
            is_error,
        }
    }

    /// Synthetic payload for a call the user refused
    pub fn denied(call: &ToolCallRequest, message: &str) -> Self {
        let payload = serde_json::json!({
            "status": "denied",
            "message": message,
        });
        Self::new(call, payload.to_string(), true)
    }

    /// Whether the call succeeded, reading the embedded `Status:` line when present.
    pub fn succeeded(&self) -> bool {
        if self.is_error {
            return false;
        }
        !self
            .content
            .lines()
            .any(|line| line.trim() == "Status: Failure")
    }
}

/// One typed piece of a structured turn
#[derive(Debug, Clone, PartialEq)]
pub enum ContentUnit {
    Text(String),
    ToolCall(ToolCallRequest),
    ToolResult(ToolInvocationResult),
}

/// Turn content: plain text or an ordered sequence of units
#[derive(Debug, Clone, PartialEq)]
pub enum TurnContent {
    Text(String),
    Units(Vec<ContentUnit>),
}

/// One role-tagged entry of the conversation history
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: TurnContent,
}

impl Turn {
    /// Create a user turn
    pub fn user(text: impl Into<String>) -> Self {
        Turn {
            role: Role::User,
            content: TurnContent::Text(text.into()),
        }
    }

    /// Create a plain-text model turn
    pub fn model(text: impl Into<String>) -> Self {
        Turn {
            role: Role::Model,
            content: TurnContent::Text(text.into()),
        }
    }

    /// Create a structured model turn, units in emission order
    pub fn model_units(units: Vec<ContentUnit>) -> Self {
        Turn {
            role: Role::Model,
            content: TurnContent::Units(units),
        }
    }

    /// Create a tool-result turn
    pub fn tool_result(result: ToolInvocationResult) -> Self {
        Turn {
            role: Role::Tool,
            content: TurnContent::Units(vec![ContentUnit::ToolResult(result)]),
        }
    }

    /// Concatenated text of the turn
    pub fn text(&self) -> String {
        match &self.content {
            TurnContent::Text(text) => text.clone(),
            TurnContent::Units(units) => units
                .iter()
                .filter_map(|u| match u {
                    ContentUnit::Text(t) => Some(t.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }

    pub fn units(&self) -> &[ContentUnit] {
        match &self.content {
            TurnContent::Text(_) => &[],
            TurnContent::Units(units) => units,
        }
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCallRequest> {
        self.units().iter().filter_map(|u| match u {
            ContentUnit::ToolCall(call) => Some(call),
            _ => None,
        })
    }

    pub fn tool_results(&self) -> impl Iterator<Item = &ToolInvocationResult> {
        self.units().iter().filter_map(|u| match u {
            ContentUnit::ToolResult(result) => Some(result),
            _ => None,
        })
    }
}

/// Provider-neutral incremental event
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedEvent {
    /// Answer text
    TextDelta(String),
    /// Reasoning text; display-only
    ThoughtDelta(String),
    /// Complete tool invocation request
    ToolCall(ToolCallRequest),
}
