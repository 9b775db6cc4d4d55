//! Event stream emitted by the reasoning loop.
//!
//! Mirrors the delimiter protocol of the external interface: each
//! [`AgentEvent`] variant renders to one line (or block) of the wire
//! format a caller drains. The channel is unbounded so a slow consumer
//! never blocks the loop; dropping the receiver is how a caller cancels
//! an in-flight reasoning invocation.

use serde::Serialize;
use tokio::sync::mpsc;

/// One step of the reasoning loop, serialized with an internal tag so
/// a caller can `match` on `"type"` without a wrapper enum.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// `[SYSTEM] ...` status line emitted by the loop itself.
    SystemMessage { message: String },
    /// A streamed token of assistant text, passed through verbatim.
    Token { content: String },
    /// `[THOUGHT] ... [/THOUGHT]` model scratchpad, passed through.
    Thought { content: String },
    /// Tool call about to be dispatched.
    ToolStart { name: String, arguments: serde_json::Value },
    /// `[MCP_TOOL_CALL]{tool,args,result}[/MCP_TOOL_CALL]` — completed call.
    ToolCallRecorded {
        name: String,
        arguments: serde_json::Value,
        result: serde_json::Value,
        is_error: bool,
    },
    /// One reasoning step boundary (for metrics/logging).
    Iteration { number: usize },
    /// `[AUDIT_RESULT:confirmed|clear|needs_review]` terminal marker.
    AuditResult { verdict: String },
    /// Reasoning invocation finished normally.
    ResponseComplete { content: String, iterations: usize },
    /// Terminal error; loop stops after this event.
    Error { message: String },
    /// A `[FILE_UPLOAD: <filename>]` marker was recognised in the user's
    /// message; the remaining text is that file's content.
    FileUpload { filename: String },
}

pub type EventSender = mpsc::UnboundedSender<AgentEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<AgentEvent>;

/// Create a fresh event channel for one reasoning invocation.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Null-object wrapper so callers that don't care about events can pass
/// one uniformly without `Option<EventSender>` checks at every call site.
#[derive(Clone)]
pub struct AgentEventSender {
    sender: Option<EventSender>,
}

impl AgentEventSender {
    pub fn new(sender: EventSender) -> Self {
        Self { sender: Some(sender) }
    }

    pub fn none() -> Self {
        Self { sender: None }
    }

    pub fn is_active(&self) -> bool {
        self.sender.is_some()
    }

    pub fn send(&self, event: AgentEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }

    pub fn system_message(&self, message: impl Into<String>) {
        self.send(AgentEvent::SystemMessage { message: message.into() });
    }

    pub fn token(&self, content: impl Into<String>) {
        self.send(AgentEvent::Token { content: content.into() });
    }

    pub fn tool_start(&self, name: impl Into<String>, arguments: serde_json::Value) {
        self.send(AgentEvent::ToolStart { name: name.into(), arguments });
    }

    pub fn tool_call_recorded(
        &self,
        name: impl Into<String>,
        arguments: serde_json::Value,
        result: serde_json::Value,
        is_error: bool,
    ) {
        self.send(AgentEvent::ToolCallRecorded {
            name: name.into(),
            arguments,
            result,
            is_error,
        });
    }

    pub fn iteration(&self, number: usize) {
        self.send(AgentEvent::Iteration { number });
    }

    pub fn audit_result(&self, verdict: impl Into<String>) {
        self.send(AgentEvent::AuditResult { verdict: verdict.into() });
    }

    pub fn response_complete(&self, content: impl Into<String>, iterations: usize) {
        self.send(AgentEvent::ResponseComplete { content: content.into(), iterations });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.send(AgentEvent::Error { message: message.into() });
    }

    pub fn file_upload(&self, filename: impl Into<String>) {
        self.send(AgentEvent::FileUpload { filename: filename.into() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_snake_case_tag() {
        let event = AgentEvent::ToolStart {
            name: "execute_host_command".to_string(),
            arguments: serde_json::json!({"command": "uptime"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"tool_start\""));
    }

    #[test]
    fn null_sender_never_panics() {
        let sender = AgentEventSender::none();
        assert!(!sender.is_active());
        sender.token("hello");
        sender.error("boom");
    }

    #[test]
    fn active_sender_delivers() {
        let (tx, mut rx) = event_channel();
        let sender = AgentEventSender::new(tx);
        sender.system_message("booting");
        let event = rx.try_recv().unwrap();
        matches!(event, AgentEvent::SystemMessage { .. });
    }
}
