//! Remote MCP Client (C2): JSON-RPC 2.0 over Streamable-HTTP for one
//! remote MCP server endpoint.
//!
//! Performs a lazy, idempotent `initialize` → `notifications/initialized`
//! handshake, tracks the `Mcp-Session-Id` the server hands back, and
//! transparently handles both plain-JSON and SSE response bodies. Any
//! failure on `list_tools` clears the session id so the next call
//! re-handshakes (§4.2).

use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;

use crate::errors::McpError;

use super::types::ToolDescriptor;

const PROTOCOL_VERSION: &str = "2024-11-05";
const CLIENT_NAME: &str = "sentinel-dispatcher";
const CLIENT_VERSION: &str = "1.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RemoteMcpClient {
    base_url: String,
    host_header: String,
    http: reqwest::Client,
    session_id: Mutex<Option<String>>,
}

impl RemoteMcpClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let host_header = host_header_for(&base_url);
        Self {
            base_url,
            host_header,
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("reqwest client builder"),
            session_id: Mutex::new(None),
        }
    }

    fn headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Content-Type", "application/json".parse().unwrap());
        headers.insert("Accept", "application/json, text/event-stream".parse().unwrap());
        headers.insert("Host", self.host_header.parse().unwrap());
        if let Some(session_id) = self.session_id.lock().unwrap().clone() {
            if let Ok(value) = session_id.parse() {
                headers.insert("Mcp-Session-Id", value);
            }
        }
        headers
    }

    /// Idempotent, lazy handshake: only runs `initialize` once per
    /// session-id lifetime.
    async fn ensure_session(&self) -> Result<(), McpError> {
        if self.session_id.lock().unwrap().is_some() {
            return Ok(());
        }

        let init_body = json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "initialize",
            "params": {
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": { "name": CLIENT_NAME, "version": CLIENT_VERSION },
            },
        });

        let response = self
            .http
            .post(&self.base_url)
            .headers(self.headers())
            .json(&init_body)
            .send()
            .await
            .map_err(|source| McpError::Transport { url: self.base_url.clone(), source })?;

        if let Some(session_id) = response
            .headers()
            .get("Mcp-Session-Id")
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock().unwrap() = Some(session_id.to_string());
        }

        // Fire-and-forget notification, no id, no response body expected.
        let notify_body = json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized",
            "params": {},
        });
        let _ = self
            .http
            .post(&self.base_url)
            .headers(self.headers())
            .json(&notify_body)
            .send()
            .await;

        Ok(())
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value, McpError> {
        self.ensure_session().await?;

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.base_url)
            .headers(self.headers())
            .json(&body)
            .send()
            .await
            .map_err(|source| McpError::Transport { url: self.base_url.clone(), source })?;

        let content_type = response
            .headers()
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let text = response
            .text()
            .await
            .map_err(|source| McpError::Transport { url: self.base_url.clone(), source })?;

        if content_type.contains("text/event-stream") {
            Ok(parse_sse(&text))
        } else {
            serde_json::from_str(&text)
                .map_err(|e| McpError::InvalidResponse(format!("{e}: {text}")))
        }
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, McpError> {
        let result = self.rpc("tools/list", json!({})).await;
        let value = match result {
            Ok(v) => v,
            Err(e) => {
                // any exception on list_tools clears the session id
                *self.session_id.lock().unwrap() = None;
                return Err(e);
            }
        };

        let tools = value
            .get("result")
            .and_then(|r| r.get("tools"))
            .and_then(|t| t.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(tools
            .into_iter()
            .filter_map(|t| {
                Some(ToolDescriptor {
                    name: t.get("name")?.as_str()?.to_string(),
                    description: t.get("description").and_then(|d| d.as_str()).map(String::from),
                    input_schema: t.get("inputSchema").cloned(),
                })
            })
            .collect())
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, McpError> {
        let params = json!({ "name": name, "arguments": arguments });
        let value = self.rpc("tools/call", params).await?;

        if let Some(error) = value.get("error") {
            return Err(McpError::ToolValidation(error.to_string()));
        }

        Ok(value.get("result").cloned().unwrap_or(Value::Null))
    }
}

/// Parse an `text/event-stream` body: each `data: ...` line is a candidate
/// JSON payload; return the first one that decodes, skipping `[DONE]`
/// sentinels. Falls back to an empty tools envelope if none decode.
fn parse_sse(body: &str) -> Value {
    for line in body.lines() {
        let Some(data) = line.strip_prefix("data: ") else { continue };
        let data = data.trim();
        if data == "[DONE]" {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(data) {
            return value;
        }
    }
    json!({ "result": { "tools": [] } })
}

/// DNS-rebinding protection on remote MCP servers allow-lists
/// `localhost:*`, so every request sends `Host: localhost:<port>`
/// regardless of the URL's actual hostname. Port is derived from the
/// URL, defaulting to 80/443 by scheme.
fn host_header_for(base_url: &str) -> String {
    let parsed = url::Url::parse(base_url).ok();
    let port = parsed.as_ref().and_then(|u| u.port()).unwrap_or_else(|| {
        match parsed.as_ref().map(|u| u.scheme()) {
            Some("https") => 443,
            _ => 80,
        }
    });
    format!("localhost:{port}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_header_uses_explicit_port() {
        assert_eq!(host_header_for("http://wazuh.internal:8080/mcp"), "localhost:8080");
    }

    #[test]
    fn host_header_defaults_by_scheme() {
        assert_eq!(host_header_for("https://wazuh.internal/mcp"), "localhost:443");
        assert_eq!(host_header_for("http://wazuh.internal/mcp"), "localhost:80");
    }

    #[test]
    fn sse_parsing_takes_first_decodable_data_line() {
        let body = "event: message\ndata: not json\n\ndata: {\"result\":{\"tools\":[]}}\n\n";
        let value = parse_sse(body);
        assert_eq!(value["result"]["tools"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn sse_parsing_skips_done_sentinel() {
        let body = "data: [DONE]\ndata: {\"ok\":true}\n";
        let value = parse_sse(body);
        assert_eq!(value["ok"], true);
    }

    #[test]
    fn sse_parsing_falls_back_to_empty_tools() {
        let value = parse_sse("data: garbage\n");
        assert_eq!(value["result"]["tools"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn new_client_has_no_session_yet() {
        let client = RemoteMcpClient::new("http://localhost:9000/mcp");
        assert!(client.session_id.lock().unwrap().is_none());
    }
}
