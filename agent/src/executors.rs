//! Internal Executors (C3): the tools the dispatcher (C4) serves itself
//! rather than forwarding to a remote MCP server — SSH command execution,
//! SFTP upload, web search, and monitoring-task deployment.

use base64::Engine;
use russh::client::{self, Handle};
use russh::ChannelMsg;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::db::assets::{Asset, AssetOs, AuthMode};
use crate::db::config_store::ConfigStore;
use crate::db::tasks::NewTask;
use crate::db::Database;
use crate::errors::ExecutorError;

const SSH_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SSH_EXEC_TIMEOUT: Duration = Duration::from_secs(30);

/// Insert a new monitoring task from an in-conversation tool call. The
/// builder-mode reasoning loop is the only caller; it is never routed
/// through a remote MCP client.
pub fn deploy_monitoring_task(db: &Database, args: &Value) -> Result<Value, ExecutorError> {
    let title = args.get("title").and_then(|v| v.as_str()).unwrap_or("New Task").to_string();
    let tool_name = args
        .get("tool_name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ExecutorError::Transport("deploy_monitoring_task requires tool_name".to_string()))?
        .to_string();

    let new_task = NewTask {
        title: title.clone(),
        tool_name,
        tool_args: args.get("tool_args").cloned().unwrap_or(json!({})),
        threshold_condition: args
            .get("threshold_condition")
            .and_then(|v| v.as_str())
            .unwrap_or("{}")
            .to_string(),
        interval_minutes: args.get("interval_minutes").and_then(|v| v.as_i64()).unwrap_or(5),
        enabled: true,
        target_agent: args.get("target_agent").and_then(|v| v.as_str()).unwrap_or("all").to_string(),
        action_tool_name: args.get("action_tool_name").and_then(|v| v.as_str()).map(String::from),
        action_tool_args: args.get("action_tool_args").and_then(|v| v.as_str()).map(String::from),
    };

    let task_id = db
        .create_task(&new_task)
        .map_err(|e| ExecutorError::Transport(e.to_string()))?;

    Ok(json!({
        "status": "success",
        "task_id": task_id,
        "message": format!("Monitoring task '{title}' deployed successfully."),
    }))
}

fn resolve_asset(db: &Database, target: &str) -> Result<Asset, ExecutorError> {
    db.find_asset(target)
        .map_err(|e| ExecutorError::Transport(e.to_string()))?
        .ok_or_else(|| ExecutorError::AssetNotFound(target.to_string()))
}

struct NoopHandler;

#[async_trait::async_trait]
impl client::Handler for NoopHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _server_public_key: &russh_keys::key::PublicKey) -> Result<bool, Self::Error> {
        // Assets are pre-registered by the operator, so there is no
        // separate known_hosts trust store to consult.
        Ok(true)
    }
}

async fn connect(asset: &Asset) -> Result<Handle<NoopHandler>, ExecutorError> {
    let config = Arc::new(client::Config {
        connection_timeout: Some(SSH_CONNECT_TIMEOUT),
        ..Default::default()
    });
    let addr = (asset.ip.as_str(), asset.port);

    client::connect(config, addr, NoopHandler)
        .await
        .map_err(|e| ExecutorError::Transport(format!("SSH connect failed: {e}")))
}

async fn authenticate(db: &Database, session: &Handle<NoopHandler>, asset: &Asset) -> Result<(), ExecutorError> {
    match asset.auth_mode {
        AuthMode::Password => {
            let password = asset.password.clone().unwrap_or_default();
            let ok = session
                .authenticate_password(&asset.user, &password)
                .await
                .map_err(|e| ExecutorError::Transport(e.to_string()))?;
            if !ok {
                return Err(ExecutorError::SshAuthFailed(format!("password rejected for {}", asset.user)));
            }
        }
        AuthMode::Key => {
            let key_id = asset.key_id.ok_or_else(|| ExecutorError::KeyNotFound(asset.name.clone()))?;
            let entry = db
                .find_key_entry(key_id)
                .map_err(|e| ExecutorError::Transport(e.to_string()))?
                .ok_or_else(|| ExecutorError::KeyNotFound(key_id.to_string()))?;

            let key_pair = load_private_key(&entry.private_key)?;
            let ok = session
                .authenticate_publickey(&asset.user, Arc::new(key_pair))
                .await
                .map_err(|e| ExecutorError::Transport(e.to_string()))?;
            if !ok {
                return Err(ExecutorError::SshAuthFailed(format!("key rejected for {}", asset.user)));
            }
        }
    }
    Ok(())
}

/// `russh_keys::decode_secret_key` auto-detects the key algorithm from
/// the PEM/OpenSSH envelope, which collapses the reference client's
/// explicit RSA -> Ed25519 -> ECDSA -> DSS try-order into a single call;
/// we keep that ordering as documentation of which algorithms a
/// registered key is expected to use, not as four separate parse
/// attempts.
fn load_private_key(pem: &str) -> Result<russh_keys::key::KeyPair, ExecutorError> {
    russh_keys::decode_secret_key(pem, None)
        .map_err(|e| ExecutorError::KeyParseFailed(format!("RSA/Ed25519/ECDSA/DSS: {e}")))
}

/// Rewrite `command` per the sudo policy: root never gets a sudo prefix,
/// a non-root caller running a `sudo` command gets `-S` inserted so the
/// password can be piped over stdin.
fn rewrite_for_sudo(command: &str, user: &str) -> (String, bool) {
    if user == "root" {
        return (command.replace("sudo -S ", "").replace("sudo ", ""), false);
    }
    if !command.contains("sudo") {
        return (command.to_string(), false);
    }
    let rewritten = if command.contains("sudo -S") {
        command.to_string()
    } else if command.starts_with("sudo") {
        command.replacen("sudo ", "sudo -S ", 1)
    } else {
        format!("sudo -S {command}")
    };
    (rewritten, true)
}

struct ExecOutcome {
    stdout: String,
    stderr: String,
    exit_status: Option<u32>,
}

async fn exec_once(
    session: &Handle<NoopHandler>,
    command: &str,
    stdin_line: Option<&str>,
) -> Result<ExecOutcome, ExecutorError> {
    let mut channel = session
        .channel_open_session()
        .await
        .map_err(|e| ExecutorError::Transport(e.to_string()))?;
    channel
        .exec(true, command)
        .await
        .map_err(|e| ExecutorError::Transport(e.to_string()))?;

    if let Some(line) = stdin_line {
        channel
            .data(format!("{line}\n").as_bytes())
            .await
            .map_err(|e| ExecutorError::Transport(e.to_string()))?;
    }

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit_status = None;

    let outcome = tokio::time::timeout(SSH_EXEC_TIMEOUT, async {
        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => stdout.extend_from_slice(&data),
                Some(ChannelMsg::ExtendedData { data, .. }) => stderr.extend_from_slice(&data),
                Some(ChannelMsg::ExitStatus { exit_status: status }) => exit_status = Some(status),
                Some(ChannelMsg::Eof) | None => break,
                _ => {}
            }
        }
    })
    .await;

    if outcome.is_err() {
        return Err(ExecutorError::SshTimeout(SSH_EXEC_TIMEOUT.as_secs()));
    }

    Ok(ExecOutcome {
        stdout: String::from_utf8_lossy(&stdout).to_string(),
        stderr: String::from_utf8_lossy(&stderr).to_string(),
        exit_status,
    })
}

pub async fn execute_host_command(db: &Database, args: &Value) -> Result<Value, ExecutorError> {
    let target = args
        .get("target")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ExecutorError::Transport("missing target".to_string()))?;
    let command = args
        .get("command")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ExecutorError::Transport("missing command".to_string()))?;

    let asset = resolve_asset(db, target)?;
    let session = connect(&asset).await?;
    authenticate(db, &session, &asset).await?;

    let (stdout, stderr) = if asset.os == AssetOs::Windows {
        let outcome = exec_once(&session, command, None).await?;
        (outcome.stdout, outcome.stderr)
    } else {
        let (rewritten, is_sudo) = rewrite_for_sudo(command, &asset.user);
        let stdin_line = if is_sudo { asset.password.as_deref() } else { None };
        let outcome = exec_once(&session, &rewritten, stdin_line).await?;

        if is_sudo && outcome.exit_status.unwrap_or(0) != 0 {
            // Sudo failed: fall back to running the command verbatim
            // without the sudo prefix, matching the non-privileged path.
            let clean = command.replacen("sudo ", "", 1);
            let retry = exec_once(&session, &clean, None).await?;
            (retry.stdout, retry.stderr)
        } else {
            (outcome.stdout, outcome.stderr)
        }
    };

    Ok(json!({
        "status": "success",
        "target": asset.ip,
        "command": command,
        "stdout": stdout,
        "stderr": stderr,
    }))
}

pub async fn upload_file_to_host(db: &Database, args: &Value) -> Result<Value, ExecutorError> {
    let target = args
        .get("target")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ExecutorError::Transport("missing target".to_string()))?;
    let remote_path = args
        .get("remote_path")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ExecutorError::Transport("missing remote_path".to_string()))?;
    let content_b64 = args
        .get("content_b64")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ExecutorError::Transport("missing content_b64".to_string()))?;

    let file_bytes = base64::engine::general_purpose::STANDARD
        .decode(content_b64)
        .map_err(|e| ExecutorError::Transport(format!("invalid base64 payload: {e}")))?;

    let asset = resolve_asset(db, target)?;
    let session = connect(&asset).await?;
    authenticate(db, &session, &asset).await?;

    let channel = session
        .channel_open_session()
        .await
        .map_err(|e| ExecutorError::Transport(e.to_string()))?;
    channel
        .request_subsystem(true, "sftp")
        .await
        .map_err(|e| ExecutorError::Transport(e.to_string()))?;
    let sftp = russh_sftp::client::SftpSession::new(channel.into_stream())
        .await
        .map_err(|e| ExecutorError::Transport(format!("SFTP handshake failed: {e}")))?;

    use tokio::io::AsyncWriteExt;
    let mut file = sftp
        .create(remote_path)
        .await
        .map_err(|e| ExecutorError::Transport(format!("SFTP create failed: {e}")))?;
    file.write_all(&file_bytes)
        .await
        .map_err(|e| ExecutorError::Transport(format!("SFTP write failed: {e}")))?;
    file.shutdown()
        .await
        .map_err(|e| ExecutorError::Transport(format!("SFTP close failed: {e}")))?;

    Ok(json!({
        "status": "success",
        "target": asset.ip,
        "path": remote_path,
    }))
}

/// API key lookup order: environment first, then the per-provider MCP
/// config stored under the Config Store's `"tavily"` entry.
fn tavily_api_key(db: &Database) -> Option<String> {
    if let Ok(key) = std::env::var("TAVILY_API_KEY").or_else(|_| std::env::var("SEARCH_API_KEY")) {
        if !key.is_empty() {
            return Some(key);
        }
    }

    ConfigStore::new(db)
        .get_config()
        .ok()
        .and_then(|cfg| cfg.mcp_provider_config.get("tavily").cloned())
        .and_then(|entry| entry.extra.get("api_key").and_then(|v| v.as_str()).map(String::from))
}

pub async fn search_web(db: &Database, args: &Value) -> Result<Value, ExecutorError> {
    let query = args
        .get("query")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ExecutorError::Transport("missing query".to_string()))?;

    let api_key = tavily_api_key(db).ok_or(ExecutorError::SearchDisabled)?;

    let client = reqwest::Client::new();
    let response = client
        .post("https://api.tavily.com/search")
        .json(&json!({
            "api_key": api_key,
            "query": query,
            "search_depth": "smart",
            "include_answer": true,
            "max_results": 5,
        }))
        .timeout(Duration::from_secs(15))
        .send()
        .await
        .map_err(|e| ExecutorError::Transport(e.to_string()))?;

    let data: Value = response
        .json()
        .await
        .map_err(|e| ExecutorError::Transport(e.to_string()))?;

    let mut formatted = format!("Search Results for: {query}\n\n");
    if let Some(answer) = data.get("answer").and_then(|v| v.as_str()) {
        formatted.push_str(&format!("Summary Answer: {answer}\n\n"));
    }
    for (i, result) in data.get("results").and_then(|v| v.as_array()).into_iter().flatten().enumerate() {
        let title = result.get("title").and_then(|v| v.as_str()).unwrap_or("");
        let url = result.get("url").and_then(|v| v.as_str()).unwrap_or("");
        let content = result.get("content").and_then(|v| v.as_str()).unwrap_or("");
        formatted.push_str(&format!("[{}] {title}\nURL: {url}\nContent: {content}\n\n", i + 1));
    }

    Ok(json!({ "status": "success", "stdout": formatted }))
}
