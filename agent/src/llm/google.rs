//! Google Gemini streaming adapter (`streamGenerateContent`, SSE via
//! `alt=sse`).

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use crate::events::AgentEventSender;

use super::{drain_lines, ChatMessage, LlmStreaming, Role, StreamUsage, StreamingResult};

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GoogleStreamer {
    api_key: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
}

impl GoogleStreamer {
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
struct GenerateResponse {
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<u32>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<u32>,
}

#[async_trait]
impl LlmStreaming for GoogleStreamer {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        event_tx: &AgentEventSender,
    ) -> anyhow::Result<StreamingResult> {
        // Gemini takes the system prompt as a separate field too.
        let system_instruction: String = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let contents: Vec<_> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = if m.role == Role::User { "user" } else { "model" };
                json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();

        let mut body = json!({ "contents": contents });
        if !system_instruction.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": system_instruction }] });
        }

        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.endpoint, self.model, self.api_key
        );

        let response = self.client.post(url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Google request failed: {status} - {text}");
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
                let Ok(parsed) = serde_json::from_str::<GenerateResponse>(data) else { continue };
                if let Some(candidate) = parsed.candidates.first() {
                    if let Some(parts) = candidate.content.as_ref().map(|c| &c.parts) {
                        for part in parts {
                            if let Some(text) = &part.text {
                                if !text.is_empty() {
                                    content.push_str(text);
                                    event_tx.token(text.clone());
                                }
                            }
                        }
                    }
                }
                if let Some(meta) = parsed.usage_metadata {
                    if let (Some(p), Some(c)) = (meta.prompt_token_count, meta.candidates_token_count) {
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
