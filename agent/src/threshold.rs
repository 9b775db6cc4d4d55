//! Parser + Threshold Evaluator (C6): pulls named variables out of a
//! raw tool result, then decides whether the result is `green`,
//! `amber`, or `red`.
//!
//! There is no legacy expression-evaluator fallback here: a
//! `threshold_condition` that isn't one of the JSON shapes below is a
//! hard [`ThresholdError::InvalidCondition`], not a code-eval escape
//! hatch.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::db::tasks::ResultStatus;
use crate::errors::ThresholdError;

/// Serialise a tool result to text the way both parser kinds and the
/// `contains` mode expect: `stdout` if present, else the whole value.
pub fn serialize_result(result: &Value) -> String {
    match result.get("stdout").and_then(|v| v.as_str()) {
        Some(stdout) => stdout.to_string(),
        None => result.to_string(),
    }
}

/// Resolve a dotted-key path against a JSON value. No array indexing,
/// no filters — just `a.b.c` key traversal. Missing keys yield `null`.
fn jsonpath_subset(value: &Value, path: &str) -> Value {
    let mut current = value;
    for key in path.trim_start_matches("$.").split('.') {
        match current.get(key) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}

/// Apply a single regex rule: `regex("<pattern>", <group>)`. Matches
/// once against the serialised text. No multiline flags, no
/// lookaround — the pattern is used exactly as written.
fn regex_rule(text: &str, pattern: &str, group: usize) -> Option<String> {
    let re = Regex::new(pattern).ok()?;
    let captures = re.captures(text)?;
    captures.get(group).map(|m| m.as_str().to_string())
}

static REGEX_RULE_SYNTAX: &str = r#"^regex\("((?:[^"\\]|\\.)*)",\s*(\d+)\)$"#;

/// Apply every `parser_rules` entry to a tool result, returning each
/// rule's name mapped to the extracted (string) value, or `null` if
/// unresolved.
pub fn apply_parser_rules(result: &Value, parser_rules: &std::collections::HashMap<String, String>) -> std::collections::HashMap<String, Value> {
    let text = serialize_result(result);
    let regex_syntax = Regex::new(REGEX_RULE_SYNTAX).expect("valid static regex");

    parser_rules
        .iter()
        .map(|(name, rule)| {
            let extracted = if rule.starts_with("$.") {
                jsonpath_subset(result, rule)
            } else if let Some(caps) = regex_syntax.captures(rule) {
                let pattern = caps[1].replace("\\\"", "\"");
                let group: usize = caps[2].parse().unwrap_or(0);
                match regex_rule(&text, &pattern, group) {
                    Some(v) => Value::String(v),
                    None => Value::Null,
                }
            } else {
                Value::Null
            };
            (name.clone(), extracted)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "==")]
    Eq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmberOrRed {
    Amber,
    Red,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariableRule {
    pub var: String,
    pub op: ComparisonOp,
    pub value: f64,
    pub level: AmberOrRed,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ThresholdSpec {
    Variable {
        #[serde(default, alias = "parserRules")]
        parser_rules: std::collections::HashMap<String, String>,
        #[serde(default)]
        rules: Vec<VariableRule>,
    },
    Contains {
        #[serde(default)]
        contains: Vec<String>,
        #[serde(default)]
        not_contains: Vec<String>,
        #[serde(default = "default_match_level")]
        match_level: AmberOrRed,
    },
    #[serde(rename = "structured")]
    Structured,
    Ai,
    Binary,
}

fn default_match_level() -> AmberOrRed {
    AmberOrRed::Red
}

pub struct ThresholdEvaluation {
    pub status: ResultStatus,
    pub extracted: std::collections::HashMap<String, Value>,
}

fn compare(op: ComparisonOp, lhs: f64, rhs: f64) -> bool {
    match op {
        ComparisonOp::Gt => lhs > rhs,
        ComparisonOp::Gte => lhs >= rhs,
        ComparisonOp::Lt => lhs < rhs,
        ComparisonOp::Lte => lhs <= rhs,
        ComparisonOp::Eq => (lhs - rhs).abs() < f64::EPSILON,
    }
}

/// Parse `threshold_condition` as JSON and dispatch on `mode`. Any
/// non-JSON condition is the one hard failure case this evaluator
/// recognises — by design, there is nowhere else for it to go.
pub fn evaluate(threshold_condition: &str, result: &Value) -> Result<ThresholdEvaluation, ThresholdError> {
    let spec: ThresholdSpec = serde_json::from_str(threshold_condition)
        .map_err(|e| ThresholdError::InvalidCondition(format!("{e}: {threshold_condition}")))?;

    match spec {
        ThresholdSpec::Variable { parser_rules, rules } => {
            let extracted = apply_parser_rules(result, &parser_rules);
            let mut status = ResultStatus::Green;
            for rule in &rules {
                let Some(raw) = extracted.get(&rule.var) else { continue };
                let Some(value) = raw.as_f64().or_else(|| raw.as_str().and_then(|s| s.parse().ok())) else { continue };
                if compare(rule.op, value, rule.value) {
                    match rule.level {
                        AmberOrRed::Red => return Ok(ThresholdEvaluation { status: ResultStatus::Red, extracted }),
                        AmberOrRed::Amber => status = ResultStatus::Amber,
                    }
                }
            }
            Ok(ThresholdEvaluation { status, extracted })
        }
        ThresholdSpec::Contains { contains, not_contains, match_level } => {
            let text = serialize_result(result).to_lowercase();
            if not_contains.iter().any(|s| text.contains(&s.to_lowercase())) {
                return Ok(ThresholdEvaluation { status: ResultStatus::Green, extracted: Default::default() });
            }
            if contains.iter().any(|s| text.contains(&s.to_lowercase())) {
                let status = match match_level {
                    AmberOrRed::Red => ResultStatus::Red,
                    AmberOrRed::Amber => ResultStatus::Amber,
                };
                return Ok(ThresholdEvaluation { status, extracted: Default::default() });
            }
            Ok(ThresholdEvaluation { status: ResultStatus::Green, extracted: Default::default() })
        }
        ThresholdSpec::Structured | ThresholdSpec::Ai | ThresholdSpec::Binary => {
            Ok(ThresholdEvaluation { status: ResultStatus::Amber, extracted: Default::default() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn jsonpath_subset_walks_dotted_keys() {
        let value = json!({"a": {"b": {"c": 42}}});
        assert_eq!(jsonpath_subset(&value, "$.a.b.c"), json!(42));
    }

    #[test]
    fn jsonpath_subset_missing_key_is_null() {
        let value = json!({"a": 1});
        assert_eq!(jsonpath_subset(&value, "$.a.b"), Value::Null);
    }

    #[test]
    fn variable_mode_red_short_circuits_over_amber() {
        let condition = json!({
            "mode": "variable",
            "parserRules": {"cpu": "$.cpu_pct"},
            "rules": [
                {"var": "cpu", "op": ">", "value": 50.0, "level": "amber"},
                {"var": "cpu", "op": ">", "value": 90.0, "level": "red"}
            ]
        })
        .to_string();
        let result = json!({"cpu_pct": 95.0});
        let evaluation = evaluate(&condition, &result).unwrap();
        assert_eq!(evaluation.status, ResultStatus::Red);
    }

    #[test]
    fn variable_mode_amber_when_only_amber_rule_fires() {
        let condition = json!({
            "mode": "variable",
            "parserRules": {"cpu": "$.cpu_pct"},
            "rules": [{"var": "cpu", "op": ">", "value": 50.0, "level": "amber"}]
        })
        .to_string();
        let result = json!({"cpu_pct": 60.0});
        let evaluation = evaluate(&condition, &result).unwrap();
        assert_eq!(evaluation.status, ResultStatus::Amber);
    }

    #[test]
    fn variable_mode_missing_value_skips_rule() {
        let condition = json!({
            "mode": "variable",
            "parserRules": {"cpu": "$.missing"},
            "rules": [{"var": "cpu", "op": ">", "value": 50.0, "level": "red"}]
        })
        .to_string();
        let result = json!({"cpu_pct": 99.0});
        let evaluation = evaluate(&condition, &result).unwrap();
        assert_eq!(evaluation.status, ResultStatus::Green);
    }

    #[test]
    fn variable_mode_accepts_spec_canonical_camel_case_key() {
        // spec.md §8 scenario 1 and the original server's
        // `cond.get("parserRules", {})` both use camelCase.
        let condition = json!({
            "mode": "variable",
            "parserRules": {"loss": "regex(\"(\\\\d+)% packet loss\", 1)"},
            "rules": [
                {"var": "loss", "op": ">=", "value": 10.0, "level": "amber"},
                {"var": "loss", "op": ">=", "value": 50.0, "level": "red"}
            ]
        })
        .to_string();

        let amber_result = json!({"stdout": "4 packets transmitted, 10% packet loss"});
        assert_eq!(evaluate(&condition, &amber_result).unwrap().status, ResultStatus::Amber);

        let red_result = json!({"stdout": "4 packets transmitted, 50% packet loss"});
        assert_eq!(evaluate(&condition, &red_result).unwrap().status, ResultStatus::Red);
    }

    #[test]
    fn contains_mode_not_contains_wins() {
        let condition = json!({
            "mode": "contains",
            "contains": ["error"],
            "not_contains": ["no errors found"],
            "match_level": "red"
        })
        .to_string();
        let result = json!({"stdout": "scan complete: no errors found, 0 warnings"});
        let evaluation = evaluate(&condition, &result).unwrap();
        assert_eq!(evaluation.status, ResultStatus::Green);
    }

    #[test]
    fn contains_mode_matches_at_configured_level() {
        let condition = json!({"mode": "contains", "contains": ["CRITICAL"], "match_level": "red"}).to_string();
        let result = json!({"stdout": "CRITICAL: disk full"});
        let evaluation = evaluate(&condition, &result).unwrap();
        assert_eq!(evaluation.status, ResultStatus::Red);
    }

    #[test]
    fn structured_and_ai_modes_always_need_review() {
        let result = json!({"stdout": "anything"});
        assert_eq!(evaluate(r#"{"mode":"structured"}"#, &result).unwrap().status, ResultStatus::Amber);
        assert_eq!(evaluate(r#"{"mode":"ai"}"#, &result).unwrap().status, ResultStatus::Amber);
        assert_eq!(evaluate(r#"{"mode":"binary"}"#, &result).unwrap().status, ResultStatus::Amber);
    }

    #[test]
    fn non_json_condition_is_invalid_not_evaluated() {
        let result = json!({"stdout": "x"});
        let err = evaluate("cpu_pct > 90", &result).unwrap_err();
        assert!(matches!(err, ThresholdError::InvalidCondition(_)));
    }

    #[test]
    fn regex_rule_extracts_specified_group() {
        let mut rules = std::collections::HashMap::new();
        rules.insert("cpu".to_string(), r#"regex("cpu:(\d+)", 1)"#.to_string());
        let result = json!({"stdout": "cpu:87 mem:40"});
        let extracted = apply_parser_rules(&result, &rules);
        assert_eq!(extracted["cpu"], json!("87"));
    }
}
