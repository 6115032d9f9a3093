//! MCP (Model Context Protocol) module
//!
//! The agent talks to its tool server over MCP; the same wire types back
//! the bundled `clia-tools` server.
//!
//! ## Architecture
//!
//! - **client**: MCP client for connecting to MCP servers
//! - **protocol**: Wire protocol types (JSON-RPC based)
//! - **catalog**: Discovered tool descriptors and provider declarations
//! - **server**: Stdio MCP server over a [`ToolRegistry`](crate::tools::ToolRegistry)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use clia::mcp::{McpClient, ToolCatalog};
//!
//! # async fn example() -> clia::Result<()> {
//! // Connect to a local MCP server
//! let client = McpClient::connect_stdio("clia-tools").await?;
//!
//! // Discover its tools
//! let catalog = ToolCatalog::discover(&client).await?;
//!
//! // Call a tool
//! let result = client.call_tool("read_file_content", serde_json::json!({"path": "Cargo.toml"})).await?;
//! # Ok(())
//! # }
//! ```

mod catalog;
mod client;
mod protocol;
mod server;

pub use catalog::{ParamSpec, ParamType, ToolCatalog, ToolDescriptor};
pub use client::{McpClient, ToolServer};
pub use protocol::{
    error_codes, McpContent, McpError, McpRequest, McpResponse, McpTool, McpToolInput,
    McpToolResult, PROTOCOL_VERSION,
};
pub use server::McpServer;
