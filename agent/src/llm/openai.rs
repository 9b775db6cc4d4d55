//! OpenAI-compatible streaming adapter (`/v1/chat/completions`, SSE).
//! Also usable for any OpenAI-wire-compatible endpoint by overriding
//! the base URL.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use crate::events::AgentEventSender;

use super::{drain_lines, ChatMessage, LlmStreaming, Role, StreamUsage, StreamingResult};

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

pub struct OpenAiStreamer {
    api_key: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
}

impl OpenAiStreamer {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, endpoint: Option<&str>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            endpoint: endpoint.unwrap_or(DEFAULT_ENDPOINT).to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn wire_role(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Deserialize)]
struct Chunk {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    delta: Delta,
}

#[derive(Debug, Deserialize, Default)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait]
impl LlmStreaming for OpenAiStreamer {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        event_tx: &AgentEventSender,
    ) -> anyhow::Result<StreamingResult> {
        let wire_messages: Vec<_> = messages
            .iter()
            .map(|m| json!({ "role": Self::wire_role(m.role), "content": m.content }))
            .collect();

        let body = json!({
            "model": self.model,
            "messages": wire_messages,
            "stream": true,
            "stream_options": { "include_usage": true },
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI request failed: {status} - {text}");
        }

        let mut content = String::new();
        let mut usage = None;
        let mut buffer = String::new();
        let mut bytes_stream = response.bytes_stream();

        while let Some(chunk) = bytes_stream.next().await {
            for line in drain_lines(&mut buffer, &chunk?) {
                let Some(data) = line.strip_prefix("data: ") else { continue };
                let data = data.trim();
                if data.is_empty() || data == "[DONE]" {
                    continue;
                }
                let parsed: Chunk = serde_json::from_str(data)?;
                if let Some(choice) = parsed.choices.first() {
                    if let Some(text) = &choice.delta.content {
                        if !text.is_empty() {
                            content.push_str(text);
                            event_tx.token(text.clone());
                        }
                    }
                }
                if let Some(u) = parsed.usage {
                    usage = Some(StreamUsage { prompt_tokens: u.prompt_tokens, completion_tokens: u.completion_tokens });
                }
            }
        }

        Ok(StreamingResult { content, usage })
    }

    fn model(&self) -> &str {
        &self.model
    }
}
