//! `sa-mcp-client` — MCP (Model Context Protocol) client for SerialAgent.
//!
//! This crate provides:
//! - JSON-RPC 2.0 protocol types for communicating with MCP servers.
//! - A stdio transport that spawns child processes and communicates over stdin/stdout.
//! - An `McpManager` that manages connections to multiple MCP servers and
//!   orchestrates tool discovery and dispatch, and implements
//!   `sa_core::providers::ToolProvider` so it plugs straight into the Tool Router.
//!
//! # Usage
//!
//! ```rust,ignore
//! use sa_mcp_client::{McpServerConfig, McpManager};
//!
//! let servers: Vec<McpServerConfig> = /* from config */;
//! let manager = McpManager::from_config(&servers, 120).await;
//!
//! // List all discovered tools.
//! for (server_id, tool) in manager.list_tools() {
//!     println!("mcp:{server_id}:{}", tool.name);
//! }
//!
//! // Call a tool.
//! let result = manager.call_tool("filesystem", "read_file", json!({"path": "/tmp/test.txt"})).await?;
//! ```

pub mod config;
pub mod manager;
pub mod protocol;
pub mod transport;

// Re-exports for convenience.
pub use config::McpServerConfig;
pub use manager::{McpError, McpManager};
pub use protocol::McpToolDef;
