//! Ollama streaming adapter, speaking the flat-prompt `/api/generate`
//! endpoint rather than `/api/chat` — local models served this way are
//! frequently older builds without native chat-message support, and the
//! flat prompt works across all of them uniformly.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use crate::events::AgentEventSender;

use super::{drain_lines, ChatMessage, LlmStreaming, Role, StreamUsage, StreamingResult};

pub struct OllamaStreamer {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaStreamer {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), model: model.into(), client: reqwest::Client::new() }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    response: Option<String>,
    done: bool,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

/// Collapse a chat transcript into the `"ROLE: content\n"` flat prompt
/// Ollama's `/api/generate` expects, ending with an open `ASSISTANT:`
/// turn for the model to complete.
pub fn flatten_prompt(messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();
    for message in messages {
        let role = match message.role {
            Role::System => "SYSTEM",
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
        };
        prompt.push_str(role);
        prompt.push_str(": ");
        prompt.push_str(&message.content);
        prompt.push('\n');
    }
    prompt.push_str("ASSISTANT: ");
    prompt
}

#[async_trait]
impl LlmStreaming for OllamaStreamer {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        event_tx: &AgentEventSender,
    ) -> anyhow::Result<StreamingResult> {
        let prompt = flatten_prompt(messages);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": true,
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama request failed: {status} - {text}");
        }

        let mut content = String::new();
        let mut usage = None;
        let mut buffer = String::new();
        let mut bytes_stream = response.bytes_stream();

        while let Some(chunk) = bytes_stream.next().await {
            for line in drain_lines(&mut buffer, &chunk?) {
                if line.trim().is_empty() {
                    continue;
                }
                let parsed: GenerateChunk = serde_json::from_str(&line)?;
                if let Some(text) = parsed.response {
                    if !text.is_empty() {
                        content.push_str(&text);
                        event_tx.token(text);
                    }
                }
                if parsed.done {
                    if let (Some(p), Some(c)) = (parsed.prompt_eval_count, parsed.eval_count) {
                        usage = Some(StreamUsage { prompt_tokens: p, completion_tokens: c });
                    }
                }
            }
        }

        Ok(StreamingResult { content, usage })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_prompt_ends_with_open_assistant_turn() {
        let messages = vec![ChatMessage::system("be terse"), ChatMessage::user("hi")];
        let prompt = flatten_prompt(&messages);
        assert_eq!(prompt, "SYSTEM: be terse\nUSER: hi\nASSISTANT: ");
    }
}
