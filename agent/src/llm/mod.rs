//! LLM provider abstraction (supports C5's reasoning loop): one
//! streaming adapter per provider, all speaking the same
//! `ChatMessage`/`LlmStreaming` surface so the reasoning loop never
//! branches on which backend is configured.
//!
//! Tool-call detection does NOT happen here — every adapter just
//! streams text tokens and hands back the full accumulated content;
//! the reasoning loop scans that content for an embedded tool-call
//! JSON object once the turn completes.

pub mod anthropic;
pub mod google;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::events::AgentEventSender;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StreamUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone, Default)]
pub struct StreamingResult {
    pub content: String,
    pub usage: Option<StreamUsage>,
}

/// A provider-agnostic streaming chat backend. `stream_chat` emits a
/// token event through `event_tx` as text arrives and returns once the
/// provider signals completion.
#[async_trait]
pub trait LlmStreaming: Send + Sync {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        event_tx: &AgentEventSender,
    ) -> anyhow::Result<StreamingResult>;

    fn model(&self) -> &str;
}

/// Construct the adapter for a configured provider name. Provider names
/// match the Config Store's `provider_config` keys (`ollama`, `openai`,
/// `anthropic`, `google`).
pub fn build(
    provider: &str,
    model: &str,
    api_key: Option<&str>,
    endpoint: Option<&str>,
) -> anyhow::Result<Box<dyn LlmStreaming>> {
    match provider {
        "ollama" => Ok(Box::new(ollama::OllamaStreamer::new(
            endpoint.unwrap_or("http://localhost:11434"),
            model,
        ))),
        "openai" => Ok(Box::new(openai::OpenAiStreamer::new(
            api_key.ok_or_else(|| anyhow::anyhow!("openai requires an API key"))?,
            model,
            endpoint,
        ))),
        "anthropic" => Ok(Box::new(anthropic::AnthropicStreamer::new(
            api_key.ok_or_else(|| anyhow::anyhow!("anthropic requires an API key"))?,
            model,
            endpoint,
        ))),
        "google" => Ok(Box::new(google::GoogleStreamer::new(
            api_key.ok_or_else(|| anyhow::anyhow!("google requires an API key"))?,
            model,
            endpoint,
        ))),
        other => anyhow::bail!("unknown LLM provider: {other}"),
    }
}

/// Split a growing byte buffer into complete newline-terminated lines,
/// leaving any trailing partial line in `buffer` for the next chunk.
/// Shared by every provider's SSE/NDJSON stream reader.
pub(crate) fn drain_lines(buffer: &mut String, chunk: &[u8]) -> Vec<String> {
    buffer.push_str(&String::from_utf8_lossy(chunk));
    let mut lines = Vec::new();
    while let Some(pos) = buffer.find('\n') {
        let line = buffer[..pos].trim_end_matches('\r').to_string();
        *buffer = buffer[pos + 1..].to_string();
        lines.push(line);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_lines_splits_on_newline_and_keeps_partial_tail() {
        let mut buf = String::new();
        let lines = drain_lines(&mut buf, b"line one\nline two\npartial");
        assert_eq!(lines, vec!["line one", "line two"]);
        assert_eq!(buf, "partial");
    }

    #[test]
    fn drain_lines_strips_carriage_return() {
        let mut buf = String::new();
        let lines = drain_lines(&mut buf, b"abc\r\n");
        assert_eq!(lines, vec!["abc"]);
    }

    #[test]
    fn build_rejects_unknown_provider() {
        assert!(build("not-a-provider", "m", None, None).is_err());
    }

    #[test]
    fn build_requires_api_key_for_hosted_providers() {
        assert!(build("openai", "gpt-4o", None, None).is_err());
        assert!(build("ollama", "llama3.1", None, None).is_ok());
    }
}
