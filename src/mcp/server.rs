//! MCP server implementation.
//!
//! Wraps a [`ToolRegistry`] and exposes its tools over newline-delimited
//! JSON-RPC on any reader/writer pair (stdin/stdout for `clia-tools`).

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use super::protocol::{error_codes, McpRequest, McpResponse, McpToolResult, PROTOCOL_VERSION};
use crate::error::Result;
use crate::tools::ToolRegistry;

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// MCP server that bridges a `ToolRegistry` to MCP clients.
pub struct McpServer {
    registry: ToolRegistry,
    server_name: String,
    server_version: String,
}

impl McpServer {
    /// Create a new MCP server wrapping the given tool registry.
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            server_name: "clia-tools".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Set the server name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Serve on the process's stdin/stdout until stdin closes.
    pub async fn serve_stdio(&self) -> Result<()> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Process requests from `reader` until EOF, writing one response line per request.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("MCP server {} starting", self.server_name);
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            debug!("Received message: {}", line);

            if let Some(response) = self.handle_line(line).await {
                let json = serde_json::to_string(&response)?;
                debug!("Sending response: {}", json);
                writer.write_all(json.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        info!("Input closed, shutting down");
        Ok(())
    }

    /// Handle one raw message. Notifications produce no response.
    pub async fn handle_line(&self, line: &str) -> Option<McpResponse> {
        let raw: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to parse JSON: {}", e);
                return Some(McpResponse::failure(
                    None,
                    error_codes::PARSE_ERROR,
                    format!("Parse error: {}", e),
                ));
            }
        };

        let id = raw.get("id").cloned();
        let request: McpRequest = match serde_json::from_value(raw) {
            Ok(request) => request,
            Err(e) => {
                warn!("Invalid JSON-RPC request: {}", e);
                return Some(McpResponse::failure(
                    id,
                    error_codes::INVALID_REQUEST,
                    format!("Invalid request: {}", e),
                ));
            }
        };

        if request.is_notification() {
            self.handle_notification(&request);
            return None;
        }

        Some(self.handle_request(request).await)
    }

    /// Handle a single JSON-RPC request and produce a response.
    pub async fn handle_request(&self, request: McpRequest) -> McpResponse {
        let id = request.id.clone();

        match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "ping" => McpResponse::success(id, serde_json::json!({})),
            "tools/list" => self.handle_list_tools(id),
            "tools/call" => self.handle_call_tool(id, request.params).await,
            method => {
                warn!("Unknown method {}", method);
                McpResponse::failure(
                    id,
                    error_codes::METHOD_NOT_FOUND,
                    format!("Method not found: {}", method),
                )
            }
        }
    }

    fn handle_notification(&self, notification: &McpRequest) {
        match notification.method.as_str() {
            "notifications/initialized" => info!("Client confirmed initialization"),
            method => debug!("Ignoring notification {}", method),
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> McpResponse {
        info!("Handling initialize");
        McpResponse::success(
            id,
            serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": { "listChanged": false } },
                "serverInfo": {
                    "name": self.server_name,
                    "version": self.server_version,
                }
            }),
        )
    }

    fn handle_list_tools(&self, id: Option<Value>) -> McpResponse {
        debug!("Handling tools/list");
        match serde_json::to_value(self.registry.definitions()) {
            Ok(tools) => McpResponse::success(id, serde_json::json!({ "tools": tools })),
            Err(e) => McpResponse::failure(id, error_codes::INVALID_REQUEST, e.to_string()),
        }
    }

    async fn handle_call_tool(&self, id: Option<Value>, params: Option<Value>) -> McpResponse {
        let params: CallToolParams = match params.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                return McpResponse::failure(id, error_codes::INVALID_PARAMS, e.to_string())
            }
            None => {
                return McpResponse::failure(id, error_codes::INVALID_PARAMS, "missing params")
            }
        };

        let arguments = if params.arguments.is_null() {
            serde_json::json!({})
        } else {
            params.arguments
        };

        info!("Handling tools/call {}", params.name);
        // Tool failures travel as isError results, never as JSON-RPC errors
        let result = match self.registry.execute(&params.name, arguments).await {
            Ok(result) => result.into_mcp(),
            Err(e) => {
                warn!("Tool {} failed: {}", params.name, e);
                McpToolResult::error(format!("Error: {}", e))
            }
        };

        match serde_json::to_value(result) {
            Ok(value) => McpResponse::success(id, value),
            Err(e) => McpResponse::failure(id, error_codes::INVALID_REQUEST, e.to_string()),
        }
    }
}
