//! Anthropic Messages API streaming adapter (`/v1/messages`, SSE).

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use crate::events::AgentEventSender;

use super::{drain_lines, ChatMessage, LlmStreaming, Role, StreamUsage, StreamingResult};

const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicStreamer {
    api_key: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
}

impl AnthropicStreamer {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, endpoint: Option<&str>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            endpoint: endpoint.unwrap_or(DEFAULT_ENDPOINT).to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StreamEvent {
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: Delta },
    #[serde(rename = "message_delta")]
    MessageDelta { usage: Option<PartialUsage> },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PartialUsage {
    output_tokens: Option<u32>,
}

#[async_trait]
impl LlmStreaming for AnthropicStreamer {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        event_tx: &AgentEventSender,
    ) -> anyhow::Result<StreamingResult> {
        // Anthropic takes the system prompt out-of-band; everything else
        // goes in the `messages` array as user/assistant turns.
        let system: String = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let wire_messages: Vec<_> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = if m.role == Role::User { "user" } else { "assistant" };
                json!({ "role": role, "content": m.content })
            })
            .collect();

        let body = json!({
            "model": self.model,
            "system": system,
            "messages": wire_messages,
            "max_tokens": 4096,
            "stream": true,
        });

        let response = self
            .client
            .post(format!("{}/messages", self.endpoint))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Anthropic request failed: {status} - {text}");
        }

        let mut content = String::new();
        let mut usage = None;
        let mut buffer = String::new();
        let mut bytes_stream = response.bytes_stream();

        while let Some(chunk) = bytes_stream.next().await {
            for line in drain_lines(&mut buffer, &chunk?) {
                let Some(data) = line.strip_prefix("data: ") else { continue };
                let data = data.trim();
                if data.is_empty() {
                    continue;
                }
                let Ok(event) = serde_json::from_str::<StreamEvent>(data) else { continue };
                match event {
                    StreamEvent::ContentBlockDelta { delta } => {
                        if let Some(text) = delta.text {
                            if !text.is_empty() {
                                content.push_str(&text);
                                event_tx.token(text);
                            }
                        }
                    }
                    StreamEvent::MessageDelta { usage: Some(u) } => {
                        if let Some(out) = u.output_tokens {
                            usage = Some(StreamUsage { prompt_tokens: 0, completion_tokens: out });
                        }
                    }
                    _ => {}
                }
            }
        }

        Ok(StreamingResult { content, usage })
    }

    fn model(&self) -> &str {
        &self.model
    }
}
