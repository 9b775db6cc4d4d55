//! Action Templater (C7): substitutes `{{dotted.path}}` placeholders in
//! a monitoring task's action arguments with values read out of the
//! triggering tool result.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::errors::TemplateError;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{([a-zA-Z0-9_.]+)\}\}").expect("valid static regex"))
}

/// Walk `path` against `value`: dict lookup by key, list lookup by
/// integer index. Returns `None` if any segment doesn't resolve.
fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(list) => list.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn value_to_template_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replace every `{{dotted.path}}` in `template` with the value it
/// resolves to against `result`. A placeholder that doesn't resolve is
/// left exactly as written, so the eventual tool call fails loudly
/// instead of silently sending a blank value.
pub fn substitute(template: &str, result: &Value) -> String {
    placeholder_pattern()
        .replace_all(template, |caps: &regex::Captures| {
            let path = &caps[1];
            match resolve_path(result, path) {
                Some(value) => value_to_template_text(value),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Substitute, parse as JSON, then inject `agent_id` when there is
/// exactly one target and the args don't already carry one.
pub fn render_action_args(template: &str, result: &Value, targets: &[String]) -> Result<Value, TemplateError> {
    let substituted = substitute(template, result);
    let mut args: Value = serde_json::from_str(&substituted)
        .map_err(|e| TemplateError::InvalidJson(format!("{e}: {substituted}")))?;

    if let (Value::Object(map), [only_target]) = (&mut args, targets) {
        if !map.contains_key("agent_id") {
            map.insert("agent_id".to_string(), Value::String(only_target.clone()));
        }
    }

    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_nested_dict_path() {
        let result = json!({"stdout": "ok", "meta": {"pid": 4821}});
        let rendered = substitute(r#"{"pid": {{meta.pid}}}"#, &result);
        assert_eq!(rendered, r#"{"pid": 4821}"#);
    }

    #[test]
    fn substitutes_list_index_path() {
        let result = json!({"procs": ["sshd", "nginx"]});
        let rendered = substitute("kill {{procs.1}}", &result);
        assert_eq!(rendered, "kill nginx");
    }

    #[test]
    fn unresolved_placeholder_is_left_literal() {
        let result = json!({"a": 1});
        let rendered = substitute("value: {{a.b.c}}", &result);
        assert_eq!(rendered, "value: {{a.b.c}}");
    }

    #[test]
    fn render_action_args_injects_single_target_agent_id() {
        let result = json!({"stdout": "done"});
        let args = render_action_args(r#"{"command": "restart"}"#, &result, &["10.0.0.5".to_string()]).unwrap();
        assert_eq!(args["agent_id"], "10.0.0.5");
        assert_eq!(args["command"], "restart");
    }

    #[test]
    fn render_action_args_skips_injection_for_multiple_targets() {
        let result = json!({"stdout": "done"});
        let args = render_action_args(
            r#"{"command": "restart"}"#,
            &result,
            &["10.0.0.5".to_string(), "10.0.0.6".to_string()],
        )
        .unwrap();
        assert!(args.get("agent_id").is_none());
    }

    #[test]
    fn render_action_args_rejects_non_json_after_substitution() {
        let result = json!({"a": 1});
        let err = render_action_args("not json {{a}}", &result, &[]).unwrap_err();
        assert!(matches!(err, TemplateError::InvalidJson(_)));
    }
}
