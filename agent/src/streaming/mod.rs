//! Tool-call extraction (C5 support): every `LlmStreaming` adapter
//! just returns accumulated text; this module finds the embedded tool
//! call, if any, once a turn finishes.
//!
//! Models are asked to answer with a single JSON object identifying the
//! tool to call. We strip any ```json / ``` fence the model wrapped it
//! in, then scan for the first brace-balanced top-level object and
//! check it looks like a call (`tool` or `tool_name` key present).

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ExtractedToolCall {
    pub tool_name: String,
    pub args: Value,
}

/// Strip a leading/trailing ```json or ``` fence, if present.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else { return trimmed };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches(['\n', '\r']);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Find the first brace-balanced top-level `{ ... }` substring.
fn find_top_level_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    for (i, c) in text[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract an embedded tool call from completed assistant text, if any.
pub fn extract_tool_call(text: &str) -> Option<ExtractedToolCall> {
    let cleaned = strip_code_fence(text);
    let candidate = find_top_level_object(cleaned)?;
    let value: Value = serde_json::from_str(candidate).ok()?;

    let tool_name = value
        .get("tool")
        .or_else(|| value.get("tool_name"))
        .and_then(|v| v.as_str())?
        .to_string();

    let args = value.get("args").or_else(|| value.get("arguments")).cloned().unwrap_or(Value::Object(Default::default()));

    Some(ExtractedToolCall { tool_name, args })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_json_tool_call() {
        let call = extract_tool_call(r#"{"tool": "execute_host_command", "args": {"target": "10.0.0.1"}}"#).unwrap();
        assert_eq!(call.tool_name, "execute_host_command");
        assert_eq!(call.args["target"], "10.0.0.1");
    }

    #[test]
    fn extracts_from_fenced_json() {
        let text = "```json\n{\"tool_name\": \"search_web\", \"arguments\": {\"query\": \"cve\"}}\n```";
        let call = extract_tool_call(text).unwrap();
        assert_eq!(call.tool_name, "search_web");
        assert_eq!(call.args["query"], "cve");
    }

    #[test]
    fn ignores_prose_with_no_tool_call() {
        assert!(extract_tool_call("Here's a summary of the findings.").is_none());
    }

    #[test]
    fn ignores_json_without_tool_key() {
        assert!(extract_tool_call(r#"{"status": "green", "note": "all clear"}"#).is_none());
    }

    #[test]
    fn finds_object_after_leading_prose() {
        let text = "I'll check the host.\n{\"tool\": \"execute_host_command\", \"args\": {}}";
        let call = extract_tool_call(text).unwrap();
        assert_eq!(call.tool_name, "execute_host_command");
    }
}
