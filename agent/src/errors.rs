//! Error taxonomy for the control plane.
//!
//! One `thiserror` enum per component family, matching the kinds laid out
//! in the error-handling design: executors and the remote MCP client never
//! let these escape as panics, they get folded into a `{status:"error", ..}`
//! tool result or a persisted execution log instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("system not onboarded: no config record found")]
    NotFound,
    #[error("config store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("malformed config payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum McpError {
    #[error("transport error talking to MCP server at {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("MCP server returned invalid response: {0}")]
    InvalidResponse(String),
    #[error("tool validation error: {0}")]
    ToolValidation(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("asset not found: {0}")]
    AssetNotFound(String),
    #[error("key entry not found: {0}")]
    KeyNotFound(String),
    #[error("failed to parse private key with any supported algorithm: {0}")]
    KeyParseFailed(String),
    #[error("SSH authentication failed: {0}")]
    SshAuthFailed(String),
    #[error("SSH command timed out after {0}s")]
    SshTimeout(u64),
    #[error("SSH/SFTP transport error: {0}")]
    Transport(String),
    #[error("web search is currently disabled: no API key configured")]
    SearchDisabled,
}

#[derive(Debug, Error)]
pub enum ThresholdError {
    #[error("threshold condition is not valid JSON and no legacy expression evaluator is provided: {0}")]
    InvalidCondition(String),
    #[error("unsupported threshold mode: {0}")]
    UnsupportedMode(String),
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("action args did not parse as JSON after substitution: {0}")]
    InvalidJson(String),
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("monitoring task not found: {0}")]
    TaskNotFound(i64),
    #[error(transparent)]
    Mcp(#[from] McpError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Threshold(#[from] ThresholdError),
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("system not onboarded")]
    ConfigMissing,
    #[error("API key for {0} not found")]
    ProviderKeyMissing(String),
    #[error(transparent)]
    Mcp(#[from] McpError),
    #[error("provider transport error: {0}")]
    Provider(String),
}
