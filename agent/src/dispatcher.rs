//! Tool Dispatcher (C4): routes a `tool_name` to one of the internal
//! executors (C3) or to the right remote MCP client, and assembles the
//! merged tool catalog the reasoning loop (C5) sees.
//!
//! Routing precedence mirrors the reference dispatcher: internal names
//! first, then a `falcon_` prefix, then the closed Velociraptor set,
//! and everything else falls through to Wazuh. Remote clients are
//! registered lazily against well-known in-cluster URLs on first use.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::db::Database;
use crate::errors::{ExecutorError, McpError};
use crate::executors;
use crate::mcp::RemoteMcpClient;

/// Tool names handled by the collector/forensics backend rather than
/// falling through to Wazuh by default.
const VELOCIRAPTOR_TOOLS: &[&str] = &[
    "client_info",
    "linux_pslist",
    "linux_groups",
    "linux_mounts",
    "linux_netstat_enriched",
    "linux_users",
    "windows_pslist",
    "windows_netstat_enriched",
    "windows_scheduled_tasks",
    "windows_services",
    "windows_recentdocs",
    "windows_shellbags",
    "windows_mounted_mass_storage_usb",
    "windows_evidence_of_download",
    "windows_mountpoints2",
    "windows_execution_amcache",
    "windows_execution_bam",
    "windows_execution_activitiesCache",
    "windows_execution_userassist",
    "windows_execution_shimcache",
    "windows_execution_prefetch",
    "windows_ntfs_mft",
    "get_collection_results",
    "collect_artifact",
    "collect_forensic_triage",
    "list_windows_artifacts",
    "list_linux_artifacts",
];

const INTERNAL_TOOLS: &[&str] = &[
    "deploy_monitoring_task",
    "execute_host_command",
    "upload_file_to_host",
    "search_web",
];

fn provider_url(provider: &str) -> Option<&'static str> {
    match provider {
        "wazuh" => Some("http://mcp-wazuh:3000/mcp"),
        "falcon" => Some("http://mcp-falcon:9000/mcp"),
        "velociraptor" => Some("http://mcp-velociraptor:8000/mcp"),
        _ => None,
    }
}

fn provider_display(provider: &str) -> &'static str {
    match provider {
        "wazuh" => "Wazuh",
        "falcon" => "Falcon",
        "velociraptor" => "Velociraptor",
        _ => "Unknown",
    }
}

/// Which remote provider a non-internal tool name routes to.
fn remote_provider_for(tool_name: &str) -> &'static str {
    if tool_name.starts_with("falcon_") {
        "falcon"
    } else if VELOCIRAPTOR_TOOLS.contains(&tool_name) {
        "velociraptor"
    } else {
        "wazuh"
    }
}

pub struct ToolDispatcher {
    db: Database,
    clients: Mutex<HashMap<String, RemoteMcpClient>>,
}

impl ToolDispatcher {
    pub fn new(db: Database) -> Self {
        Self { db, clients: Mutex::new(HashMap::new()) }
    }

    /// Execute a tool call, dispatching to an internal executor or the
    /// appropriate remote MCP client, registering that client on first use.
    pub async fn execute(&self, tool_name: &str, arguments: Value) -> Result<Value, McpError> {
        if INTERNAL_TOOLS.contains(&tool_name) {
            return self.execute_internal(tool_name, arguments).await;
        }

        let provider = remote_provider_for(tool_name);
        let client = self.client_for(provider);
        client.call_tool(tool_name, arguments).await
    }

    async fn execute_internal(&self, tool_name: &str, arguments: Value) -> Result<Value, McpError> {
        let result = match tool_name {
            "deploy_monitoring_task" => executors::deploy_monitoring_task(&self.db, &arguments),
            "execute_host_command" => executors::execute_host_command(&self.db, &arguments).await,
            "upload_file_to_host" => executors::upload_file_to_host(&self.db, &arguments).await,
            "search_web" => executors::search_web(&self.db, &arguments).await,
            other => return Err(McpError::UnknownTool(other.to_string())),
        };

        result.map_err(|e| match e {
            ExecutorError::SearchDisabled => McpError::ToolValidation(e.to_string()),
            other => McpError::ToolValidation(other.to_string()),
        })
    }

    /// Fetch (registering if necessary) the client for a well-known provider.
    fn client_for(&self, provider: &str) -> std::sync::MutexGuard<'_, HashMap<String, RemoteMcpClient>> {
        let mut clients = self.clients.lock().unwrap();
        if !clients.contains_key(provider) {
            let url = provider_url(provider).expect("well-known provider");
            clients.insert(provider.to_string(), RemoteMcpClient::new(url));
        }
        clients
    }

    /// Merge internal tool descriptors with every enabled remote
    /// provider's catalog, per §4.4. Remote providers that fail to
    /// answer surface as a single `_offline_<provider>` placeholder
    /// rather than failing the whole listing.
    pub async fn list_tools(&self) -> Vec<Value> {
        let mcp_enabled = self.enabled_flags();
        let mut all_tools = Vec::new();

        if mcp_enabled.get("ssh_exec").copied().unwrap_or(true) {
            all_tools.extend(internal_ssh_tool_descriptors());
        }
        if mcp_enabled.get("tavily").copied().unwrap_or(true) {
            all_tools.push(internal_search_tool_descriptor());
        }

        for provider in ["wazuh", "falcon", "velociraptor"] {
            if !mcp_enabled.get(provider).copied().unwrap_or(true) {
                continue;
            }

            let display = provider_display(provider);
            let client_guard = self.client_for(provider);
            // Clone the Arc-free client reference's call out of the guard's
            // scope isn't possible (RemoteMcpClient isn't Clone), so the
            // listing call happens while holding the registration lock.
            let outcome = client_guard.get(provider).unwrap().list_tools().await;
            drop(client_guard);

            match outcome {
                Ok(tools) if !tools.is_empty() => {
                    for tool in tools {
                        all_tools.push(json!({
                            "name": tool.name,
                            "description": tool.description,
                            "inputSchema": tool.input_schema,
                            "provider": display,
                        }));
                    }
                }
                Ok(_) => all_tools.push(offline_placeholder(provider, display, "No tools available from this service.")),
                Err(e) => all_tools.push(offline_placeholder(provider, display, &format!("Service unreachable: {e}"))),
            }
        }

        all_tools
    }

    fn enabled_flags(&self) -> HashMap<String, bool> {
        let mut flags: HashMap<String, bool> = [
            ("wazuh", true),
            ("falcon", true),
            ("velociraptor", true),
            ("tavily", true),
            ("ssh_exec", true),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        if let Ok(config) = crate::db::config_store::ConfigStore::new(&self.db).get_config() {
            for key in flags.clone().keys() {
                flags.insert(key.clone(), config.mcp_enabled(key));
            }
        }

        flags
    }
}

fn offline_placeholder(provider: &str, display: &str, message: &str) -> Value {
    json!({
        "name": format!("_offline_{provider}"),
        "provider": display,
        "description": message.chars().take(120).collect::<String>(),
        "_offline": true,
    })
}

fn internal_ssh_tool_descriptors() -> Vec<Value> {
    vec![
        json!({
            "name": "deploy_monitoring_task",
            "description": "Deploy a new monitoring task to the background runner.",
            "provider": "SSH Exec",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "title": {"type": "string", "description": "Task title"},
                    "tool_name": {"type": "string", "description": "MCP tool to run"},
                    "tool_args": {"type": "object", "description": "Arguments for the tool"},
                    "threshold_condition": {"type": "string", "description": "Criteria for status (JSON string)"},
                    "interval_minutes": {"type": "integer", "description": "Running interval"}
                }
            }
        }),
        json!({
            "name": "execute_host_command",
            "description": "Execute a shell command on a target host via SSH.",
            "provider": "SSH Exec",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "target": {"type": "string", "description": "IP address or name of the target asset"},
                    "command": {"type": "string", "description": "The shell command to execute"}
                }
            }
        }),
        json!({
            "name": "upload_file_to_host",
            "description": "Upload a file to a remote host via SFTP.",
            "provider": "SSH Exec",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "target": {"type": "string", "description": "IP address or name of the target asset"},
                    "remote_path": {"type": "string", "description": "Full remote path including filename"},
                    "content_b64": {"type": "string", "description": "Base64-encoded file content"}
                },
                "required": ["target", "remote_path", "content_b64"]
            }
        }),
    ]
}

fn internal_search_tool_descriptor() -> Value {
    json!({
        "name": "search_web",
        "description": "Search the web for up-to-date information (CVE details, vulnerability advisories, version info). Requires a web search API key.",
        "provider": "Web Search",
        "inputSchema": {
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query string"}
            },
            "required": ["query"]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falcon_prefix_routes_to_falcon() {
        assert_eq!(remote_provider_for("falcon_get_detections"), "falcon");
    }

    #[test]
    fn closed_set_routes_to_velociraptor() {
        assert_eq!(remote_provider_for("windows_pslist"), "velociraptor");
        assert_eq!(remote_provider_for("collect_forensic_triage"), "velociraptor");
    }

    #[test]
    fn unmatched_tool_falls_back_to_wazuh() {
        assert_eq!(remote_provider_for("get_wazuh_alerts"), "wazuh");
    }

    #[test]
    fn velociraptor_closed_set_has_expected_size() {
        assert_eq!(VELOCIRAPTOR_TOOLS.len(), 27);
    }

    #[tokio::test]
    async fn unknown_internal_tool_rejected() {
        let db = Database::open_in_memory().unwrap();
        let dispatcher = ToolDispatcher::new(db);
        let result = dispatcher.execute_internal("not_a_tool", json!({})).await;
        assert!(result.is_err());
    }
}
