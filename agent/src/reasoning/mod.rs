//! Agentic Reasoning Loop (C5): a streaming, tool-calling driver over
//! whichever LLM provider the operator has configured. Generalises the
//! host crate's single-model tool-calling loop (`agent::Agent::chat`)
//! into a mode-driven loop that talks JSON tool calls over plain text
//! rather than native function-calling, since not every provider here
//! exposes the same tool-call wire format.

pub mod prompts;

use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::db::config_store::ConfigStore;
use crate::db::Database;
use crate::dispatcher::ToolDispatcher;
use crate::errors::ReasoningError;
use crate::events::AgentEventSender;
use crate::llm::{self, ChatMessage};
use crate::streaming;

const MAX_STEPS_DEFAULT: usize = 10;
const MAX_STEPS_AUDIT: usize = 20;
const MAX_CONSECUTIVE_TOOL_FAILURES: usize = 3;

/// Closed set of reasoning modes. Each selects a system prompt and an
/// output-suppression policy; see `prompts.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Ops,
    Builder,
    BuilderSelection,
    BuilderThreshold,
    BuilderAction,
    AuditRead,
    AuditAnalysis,
    AuditVerify,
}

impl Mode {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "ops" => Mode::Ops,
            "builder" => Mode::Builder,
            "builder_selection" => Mode::BuilderSelection,
            "builder_threshold" => Mode::BuilderThreshold,
            "builder_action" => Mode::BuilderAction,
            "audit_read" => Mode::AuditRead,
            "audit_analysis" => Mode::AuditAnalysis,
            "audit_verify" => Mode::AuditVerify,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Ops => "ops",
            Mode::Builder => "builder",
            Mode::BuilderSelection => "builder_selection",
            Mode::BuilderThreshold => "builder_threshold",
            Mode::BuilderAction => "builder_action",
            Mode::AuditRead => "audit_read",
            Mode::AuditAnalysis => "audit_analysis",
            Mode::AuditVerify => "audit_verify",
        }
    }

    fn system_prompt(&self) -> &'static str {
        match self {
            Mode::Ops => prompts::OPS_PROMPT,
            Mode::Builder => prompts::BUILDER_PROMPT,
            Mode::BuilderSelection => prompts::BUILDER_SELECTION_PROMPT,
            Mode::BuilderThreshold => prompts::BUILDER_THRESHOLD_PROMPT,
            Mode::BuilderAction => prompts::BUILDER_ACTION_PROMPT,
            Mode::AuditRead => prompts::AUDIT_READ_PROMPT,
            Mode::AuditAnalysis => prompts::AUDIT_ANALYSIS_PROMPT,
            Mode::AuditVerify => prompts::AUDIT_VERIFY_PROMPT,
        }
    }

    /// Builder modes and `audit_analysis` propose designs but never
    /// execute a tool, even if the model emits a tool-call JSON.
    fn is_design_only(&self) -> bool {
        matches!(
            self,
            Mode::Builder
                | Mode::BuilderSelection
                | Mode::BuilderThreshold
                | Mode::BuilderAction
                | Mode::AuditAnalysis
        )
    }

    /// `deploy_monitoring_task` only belongs in the catalog handed to a
    /// builder-family mode.
    fn is_builder(&self) -> bool {
        matches!(
            self,
            Mode::Builder | Mode::BuilderSelection | Mode::BuilderThreshold | Mode::BuilderAction
        )
    }

    /// `audit_verify` buffers model output and only forwards
    /// human-readable narrative, never raw tool-call JSON.
    fn buffers_output(&self) -> bool {
        matches!(self, Mode::AuditVerify)
    }

    fn max_steps(&self) -> usize {
        match self {
            Mode::AuditRead | Mode::AuditVerify => MAX_STEPS_AUDIT,
            _ => MAX_STEPS_DEFAULT,
        }
    }

    fn tool_follow_up(&self) -> &'static str {
        match self {
            Mode::Ops => "Continue the investigation using this result. Call another tool or give your answer.",
            Mode::AuditRead => "Continue gathering evidence using this result, or summarise your finding if you have enough.",
            Mode::AuditVerify => "Continue verifying using this result. End with an [AUDIT_RESULT:confirmed|clear|needs_review] tag once you're confident.",
            _ => "Continue.",
        }
    }
}

fn audit_result_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[AUDIT_RESULT:(confirmed|clear|needs_review)\]").unwrap())
}

fn file_upload_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[FILE_UPLOAD:\s*([^\]]+)\]").unwrap())
}

/// Build the tool catalog the model is shown: the merged dispatcher
/// catalog, with `deploy_monitoring_task` hidden outside builder modes.
async fn tools_for_mode(dispatcher: &ToolDispatcher, mode: Mode) -> Vec<Value> {
    dispatcher
        .list_tools()
        .await
        .into_iter()
        .filter(|tool| {
            mode.is_builder() || tool.get("name").and_then(|n| n.as_str()) != Some("deploy_monitoring_task")
        })
        .collect()
}

fn catalog_text(tools: &[Value]) -> String {
    if tools.is_empty() {
        return "(no tools available)".to_string();
    }
    tools
        .iter()
        .map(|tool| {
            let name = tool.get("name").and_then(|v| v.as_str()).unwrap_or("?");
            let description = tool.get("description").and_then(|v| v.as_str()).unwrap_or("");
            format!("- `{name}`: {description}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strip the embedded tool-call JSON object out of `text`, returning
/// whatever narrative surrounds it. Used by `audit_verify` so the
/// caller never sees raw tool-call JSON.
fn narrative_only(text: &str) -> String {
    match streaming::extract_tool_call(text) {
        Some(_) => {
            let start = text.find('{');
            match start {
                Some(i) => text[..i].trim().to_string(),
                None => String::new(),
            }
        }
        None => text.trim().to_string(),
    }
}

/// Run the reasoning loop to completion, streaming progress through
/// `event_tx` and returning the final assistant text.
pub async fn reason(
    db: &Database,
    dispatcher: &Arc<ToolDispatcher>,
    mode: Mode,
    provider_override: Option<&str>,
    model_override: Option<&str>,
    user_input: &str,
    history: &[ChatMessage],
    event_tx: &AgentEventSender,
) -> Result<String, ReasoningError> {
    let config = ConfigStore::new(db).get_config().map_err(|_| ReasoningError::ConfigMissing)?;

    let provider = provider_override
        .map(str::to_string)
        .or_else(|| config.llm_provider.clone())
        .ok_or(ReasoningError::ConfigMissing)?;

    let provider_entry = config.provider_config.get(&provider);

    let model = model_override
        .map(str::to_string)
        .or_else(|| provider_entry.and_then(|e| e.model.clone()))
        .or_else(|| config.llm_model.clone())
        .ok_or(ReasoningError::ConfigMissing)?;

    let api_key = provider_entry.and_then(|e| e.api_key.clone());
    let endpoint = provider_entry.and_then(|e| e.endpoint.clone());

    if provider != "ollama" && api_key.is_none() {
        event_tx.error(format!("API key for {provider} not found"));
        return Err(ReasoningError::ProviderKeyMissing(provider));
    }

    let client = llm::build(&provider, &model, api_key.as_deref(), endpoint.as_deref())
        .map_err(|e| ReasoningError::Provider(e.to_string()))?;

    let tools = tools_for_mode(dispatcher, mode).await;
    let system_prompt = format!(
        "{}\n\n## Available tools\n{}\n{}",
        mode.system_prompt(),
        catalog_text(&tools),
        prompts::TOOL_CALL_CONVENTION,
    );

    if let Some(captures) = file_upload_marker().captures(user_input) {
        event_tx.file_upload(captures[1].trim().to_string());
    }

    let mut messages = vec![ChatMessage::system(system_prompt)];
    if let Some((_, rest)) = history.split_last() {
        messages.extend(rest.iter().cloned());
    }
    messages.push(ChatMessage::user(user_input));

    let stream_sink = if mode.buffers_output() { AgentEventSender::none() } else { event_tx.clone() };

    let mut last_content = String::new();
    let mut consecutive_failures = 0usize;
    let mut last_failed_tool: Option<String> = None;

    for step in 0..mode.max_steps() {
        event_tx.iteration(step + 1);

        let result = client
            .stream_chat(&messages, &stream_sink)
            .await
            .map_err(|e| ReasoningError::Provider(e.to_string()))?;

        last_content = result.content.clone();
        messages.push(ChatMessage::assistant(last_content.clone()));

        if mode.buffers_output() {
            let narrative = narrative_only(&last_content);
            if !narrative.is_empty() {
                event_tx.token(narrative);
            }
            if let Some(captures) = audit_result_tag().captures(&last_content) {
                let verdict = captures[1].to_string();
                event_tx.audit_result(verdict);
                break;
            }
        }

        let Some(call) = streaming::extract_tool_call(&last_content) else { break };
        if mode.is_design_only() {
            break;
        }

        event_tx.system_message(format!("Executing tool: {}", call.tool_name));
        event_tx.tool_start(call.tool_name.clone(), call.args.clone());

        match dispatcher.execute(&call.tool_name, call.args.clone()).await {
            Ok(tool_result) => {
                consecutive_failures = 0;
                last_failed_tool = None;
                event_tx.tool_call_recorded(call.tool_name.clone(), call.args.clone(), tool_result.clone(), false);
                messages.push(ChatMessage::user(format!(
                    "TOOL RESULT ({}): {}\n\n{}",
                    call.tool_name,
                    tool_result,
                    mode.tool_follow_up(),
                )));
            }
            Err(e) => {
                if last_failed_tool.as_deref() == Some(call.tool_name.as_str()) {
                    consecutive_failures += 1;
                } else {
                    consecutive_failures = 1;
                    last_failed_tool = Some(call.tool_name.clone());
                }

                let error_value = json!({ "error": e.to_string() });
                event_tx.tool_call_recorded(call.tool_name.clone(), call.args.clone(), error_value, true);

                if consecutive_failures >= MAX_CONSECUTIVE_TOOL_FAILURES {
                    event_tx.system_message(format!(
                        "Tool {} failed {consecutive_failures} times in a row, stopping.",
                        call.tool_name,
                    ));
                    break;
                }

                messages.push(ChatMessage::user(format!(
                    "TOOL RESULT ({}): error: {e}\n\nAnalyze the validation/syntax error above and immediately attempt to fix it by calling the tool again with corrected parameters.",
                    call.tool_name,
                )));
            }
        }

        if step + 1 == mode.max_steps() {
            event_tx.system_message("Maximum tool-execution steps reached, stopping.");
        }
    }

    event_tx.response_complete(last_content.clone(), messages.len());
    Ok(last_content)
}
