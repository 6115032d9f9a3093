//! MCP client for connecting to MCP servers
//!
//! Supports stdio transport (spawning a subprocess).

use async_trait::async_trait;
use serde_json::Value;
use std::ffi::OsStr;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::protocol::{McpRequest, McpResponse, McpTool, McpToolResult};
use crate::error::{Error, Result};

/// The tool-server operations the agent depends on
#[async_trait]
pub trait ToolServer: Send + Sync {
    /// List every tool the server exposes
    async fn discover(&self) -> Result<Vec<McpTool>>;

    /// Invoke one tool with a JSON argument object
    async fn invoke(&self, name: &str, arguments: Value) -> Result<McpToolResult>;
}

/// MCP client for communicating with an MCP server
pub struct McpClient {
    /// Server process; killed when the client is dropped
    #[allow(dead_code)]
    child: Mutex<Child>,
    /// Stdin writer
    stdin: Mutex<ChildStdin>,
    /// Stdout reader
    stdout: Mutex<BufReader<ChildStdout>>,
    /// Request ID counter
    next_id: AtomicU64,
    /// Server name
    name: String,
}

impl McpClient {
    /// Connect to an MCP server via stdio transport
    ///
    /// Spawns the given command as a subprocess and communicates via stdin/stdout.
    pub async fn connect_stdio(command: impl AsRef<OsStr>) -> Result<Self> {
        Self::connect_stdio_with_args(command, &[] as &[&str]).await
    }

    /// Connect to an MCP server via stdio with arguments
    pub async fn connect_stdio_with_args<S: AsRef<OsStr>>(
        command: impl AsRef<OsStr>,
        args: &[S],
    ) -> Result<Self> {
        let command = command.as_ref();
        let name = command.to_string_lossy().into_owned();
        debug!("Connecting to MCP server: {}", name);

        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Connection(format!("Failed to spawn MCP server '{}': {}", name, e)))?;

        let stdin = child.stdin.take()
            .ok_or_else(|| Error::Connection("Failed to capture MCP server stdin".to_string()))?;
        let stdout = child.stdout.take()
            .ok_or_else(|| Error::Connection("Failed to capture MCP server stdout".to_string()))?;

        // Drain the server's log output so a full pipe never stalls it
        if let Some(stderr) = child.stderr.take() {
            let server = name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "clia::mcp::server_log", "[{}] {}", server, line);
                }
            });
        }

        let client = McpClient {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            next_id: AtomicU64::new(1),
            name,
        };

        // Initialize the connection
        client.initialize().await?;

        Ok(client)
    }

    async fn write_message(&self, message: &McpRequest) -> Result<()> {
        let json = serde_json::to_string(message)
            .map_err(|e| Error::InvalidInput(format!("Failed to serialize MCP request: {}", e)))?;

        debug!("MCP request -> {}: {}", self.name, json);

        let mut stdin = self.stdin.lock().await;
        stdin.write_all(json.as_bytes()).await
            .map_err(|e| Error::Connection(format!("Failed to write to MCP server: {}", e)))?;
        stdin.write_all(b"\n").await
            .map_err(|e| Error::Connection(format!("Failed to write newline to MCP server: {}", e)))?;
        stdin.flush().await
            .map_err(|e| Error::Connection(format!("Failed to flush MCP server stdin: {}", e)))?;
        Ok(())
    }

    /// Send a request and read the matching response
    async fn send_request(&self, request: McpRequest) -> Result<McpResponse> {
        let expected_id = request.id.clone();
        self.write_message(&request).await?;

        let mut stdout = self.stdout.lock().await;
        loop {
            let mut line = String::new();
            let read = stdout.read_line(&mut line).await
                .map_err(|e| Error::Connection(format!("Failed to read from MCP server: {}", e)))?;
            if read == 0 {
                return Err(Error::Connection(format!("MCP server {} closed its output", self.name)));
            }

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            debug!("MCP response <- {}: {}", self.name, line);

            let response: McpResponse = match serde_json::from_str(line) {
                Ok(response) => response,
                Err(e) => {
                    warn!("Skipping unparseable line from MCP server {}: {}", self.name, e);
                    continue;
                }
            };

            // Server-initiated notifications and stale replies
            if response.id != expected_id {
                continue;
            }

            if let Some(ref err) = response.error {
                return Err(Error::Connection(format!(
                    "MCP error from {}: {} (code {})",
                    self.name, err.message, err.code
                )));
            }

            return Ok(response);
        }
    }

    /// Initialize the MCP connection
    async fn initialize(&self) -> Result<()> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = McpRequest::initialize(id);
        let response = self.send_request(request).await?;

        if let Some(result) = response.result {
            debug!("MCP server {} initialized: {:?}", self.name, result);
        }

        self.write_message(&McpRequest::initialized()).await
    }

    /// List available tools from the MCP server
    pub async fn list_tools(&self) -> Result<Vec<McpTool>> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = McpRequest::list_tools(id);
        let response = self.send_request(request).await?;

        let result = response.result.unwrap_or_default();
        let tools: Vec<McpTool> = match result.get("tools") {
            Some(tools) => serde_json::from_value(tools.clone())
                .map_err(|e| Error::InvalidInput(format!("Failed to parse MCP tool list: {}", e)))?,
            None => Vec::new(),
        };

        debug!("MCP server {} has {} tools", self.name, tools.len());
        Ok(tools)
    }

    /// Call a tool on the MCP server
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<McpToolResult> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = McpRequest::call_tool(id, name, arguments);
        let response = self.send_request(request).await?;

        let result = response.result.unwrap_or_default();
        let tool_result: McpToolResult = serde_json::from_value(result)
            .map_err(|e| Error::InvalidInput(format!("Failed to parse MCP tool result: {}", e)))?;

        if tool_result.is_error {
            warn!("MCP tool {} returned error", name);
        }

        Ok(tool_result)
    }

    /// Get the server name
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl ToolServer for McpClient {
    async fn discover(&self) -> Result<Vec<McpTool>> {
        self.list_tools().await
    }

    async fn invoke(&self, name: &str, arguments: Value) -> Result<McpToolResult> {
        self.call_tool(name, arguments).await
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        debug!("Dropping MCP client for {}", self.name);
    }
}
