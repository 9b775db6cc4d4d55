//! Shared MCP types used across the remote client and dispatcher.

use serde_json::Value;

/// A tool advertised by a remote MCP server's `tools/list`.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Option<Value>,
}
