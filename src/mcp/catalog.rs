//! Tool catalog
//!
//! Holds the tool descriptors discovered from the tool server for the
//! lifetime of a session and renders them into each provider's
//! function-declaration format.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::client::ToolServer;
use super::protocol::McpTool;
use crate::agent::types::{ArgValue, ToolArguments};
use crate::config::ProviderKind;
use crate::error::{Error, Result};

/// Semantic parameter type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Object,
}

impl ParamType {
    /// Map a JSON-schema type name; anything unrecognised is a string
    pub fn from_schema(schema_type: Option<&str>) -> Self {
        match schema_type.map(|t| t.to_ascii_lowercase()).as_deref() {
            Some("number") | Some("integer") => ParamType::Number,
            Some("boolean") => ParamType::Boolean,
            Some("object") => ParamType::Object,
            _ => ParamType::String,
        }
    }

    /// Lowercase JSON-schema name
    pub fn as_schema_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
        }
    }
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
}

/// A tool advertised by the tool server
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// Parameters in name order
    pub params: Vec<ParamSpec>,
    /// The schema's `required` list, verbatim
    pub required: Vec<String>,
}

impl ToolDescriptor {
    /// Build a descriptor from a discovered tool. Total over any input.
    pub fn from_mcp(tool: &McpTool) -> Self {
        let required = tool.input_schema.required.clone();

        let mut params: Vec<ParamSpec> = match tool.input_schema.properties.as_object() {
            Some(props) => props
                .iter()
                .map(|(name, details)| ParamSpec {
                    name: name.clone(),
                    param_type: ParamType::from_schema(details.get("type").and_then(Value::as_str)),
                    description: details
                        .get("description")
                        .and_then(Value::as_str)
                        .filter(|d| !d.is_empty())
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("Parameter {}", name)),
                    required: required.iter().any(|r| r == name),
                })
                .collect(),
            None => Vec::new(),
        };
        params.sort_by(|a, b| a.name.cmp(&b.name));

        ToolDescriptor {
            name: tool.name.clone(),
            description: tool.description.clone(),
            params,
            required,
        }
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Render as a provider-native declaration
    pub fn to_provider_format(&self, kind: ProviderKind) -> Value {
        match kind {
            ProviderKind::Gemini => {
                let properties: Map<String, Value> = self
                    .params
                    .iter()
                    .map(|p| {
                        (
                            p.name.clone(),
                            json!({
                                "type": p.param_type.as_schema_str().to_ascii_uppercase(),
                                "description": p.description,
                            }),
                        )
                    })
                    .collect();
                json!({
                    "name": self.name,
                    "description": self.description,
                    "parameters": {
                        "type": "OBJECT",
                        "properties": properties,
                        "required": self.required,
                    }
                })
            }
            ProviderKind::Groq => {
                let properties: Map<String, Value> = self
                    .params
                    .iter()
                    .map(|p| {
                        (
                            p.name.clone(),
                            json!({
                                "type": p.param_type.as_schema_str(),
                                "description": p.description,
                            }),
                        )
                    })
                    .collect();
                json!({
                    "type": "function",
                    "function": {
                        "name": self.name,
                        "description": self.description,
                        "parameters": {
                            "type": "object",
                            "properties": properties,
                            "required": self.required,
                        }
                    }
                })
            }
        }
    }
}

/// Immutable set of tools for one session
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: BTreeMap<String, ToolDescriptor>,
}

impl ToolCatalog {
    /// Fetch the tool list once. Zero tools or an unreachable server is fatal.
    pub async fn discover(server: &dyn ToolServer) -> Result<Self> {
        let tools = server
            .discover()
            .await
            .map_err(|e| Error::ToolDiscovery(format!("tool server unreachable: {}", e)))?;

        if tools.is_empty() {
            return Err(Error::ToolDiscovery(
                "tool server advertised no tools".to_string(),
            ));
        }

        let catalog = Self::from_tools(&tools);
        info!("Discovered {} tools", catalog.len());
        Ok(catalog)
    }

    /// Build from an already-fetched list
    pub fn from_tools(tools: &[McpTool]) -> Self {
        let tools = tools
            .iter()
            .map(|t| (t.name.clone(), ToolDescriptor::from_mcp(t)))
            .collect();
        ToolCatalog { tools }
    }

    pub fn list(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.values()
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// Description shown in permission prompts
    pub fn description(&self, name: &str) -> &str {
        self.tools
            .get(name)
            .map(|t| t.description.as_str())
            .unwrap_or("No description available.")
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Declarations for every tool, in name order
    pub fn declarations(&self, kind: ProviderKind) -> Vec<Value> {
        self.tools
            .values()
            .map(|t| t.to_provider_format(kind))
            .collect()
    }

    /// Coerce argument values to the declared parameter types.
    ///
    /// Unknown tools and undeclared parameters pass through untouched; a
    /// value that cannot be coerced is left as-is for the tool to reject.
    pub fn coerce_arguments(&self, tool: &str, args: ToolArguments) -> ToolArguments {
        let Some(descriptor) = self.tools.get(tool) else {
            return args;
        };

        let mut coerced = ToolArguments::new();
        for (name, value) in args.iter() {
            let value = match descriptor.param(name) {
                Some(spec) => coerce_value(spec.param_type, value.clone()),
                None => value.clone(),
            };
            coerced.insert(name.clone(), value);
        }
        if coerced != args {
            debug!("Coerced arguments for {}: {}", tool, coerced);
        }
        coerced
    }
}

fn coerce_value(param_type: ParamType, value: ArgValue) -> ArgValue {
    match (param_type, value) {
        (ParamType::Number, ArgValue::String(s)) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                ArgValue::Number(i.into())
            } else if let Some(n) = trimmed
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
            {
                ArgValue::Number(n)
            } else {
                ArgValue::String(s)
            }
        }
        (ParamType::Boolean, ArgValue::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => ArgValue::Boolean(true),
            "false" => ArgValue::Boolean(false),
            _ => ArgValue::String(s),
        },
        (ParamType::String, ArgValue::Number(n)) => ArgValue::String(n.to_string()),
        (ParamType::String, ArgValue::Boolean(b)) => ArgValue::String(b.to_string()),
        // Gemini reports integers as floats
        (ParamType::Number, ArgValue::Number(n)) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && n.is_f64() && f.abs() < i64::MAX as f64 => {
                ArgValue::Number((f as i64).into())
            }
            _ => ArgValue::Number(n),
        },
        (_, other) => other,
    }
}
