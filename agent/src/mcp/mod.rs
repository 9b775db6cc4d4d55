//! Remote MCP client (C2): one JSON-RPC 2.0 Streamable-HTTP client per
//! remote security-tool provider (Wazuh, Falcon, Velociraptor).

mod client;
pub mod types;

pub use client::RemoteMcpClient;
pub use types::ToolDescriptor;
