//! Monitor Runner (C8): executes a single monitoring task end to end —
//! dispatch the tool (possibly fanned out across targets), evaluate the
//! threshold, fire the remediation action on red, and persist the full
//! execution log as a Monitoring Result.
//!
//! Failures anywhere past target resolution are caught and persisted as
//! an `error`-status result rather than propagated, and `last_run`
//! always advances — a broken task can't hot-loop the scheduler.

use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::db::tasks::{MonitoringTask, ResultStatus};
use crate::db::Database;
use crate::dispatcher::ToolDispatcher;
use crate::errors::RunnerError;
use crate::template;
use crate::threshold;

/// Every `{...}` brace group in a string-valued arg is replaced with
/// the target IP — not just a literal `{target}` — preserving the
/// reference implementation's greedy legacy substitution behaviour.
fn substitute_target_braces(value: &Value, target_ip: &str) -> Value {
    match value {
        Value::String(s) => {
            let re = regex::Regex::new(r"\{[^}]+\}").expect("valid static regex");
            Value::String(re.replace_all(s, target_ip).into_owned())
        }
        Value::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), substitute_target_braces(v, target_ip))).collect()),
        Value::Array(list) => Value::Array(list.iter().map(|v| substitute_target_braces(v, target_ip)).collect()),
        other => other.clone(),
    }
}

fn resolve_targets(task: &MonitoringTask) -> Vec<String> {
    if task.target_agent == "all" {
        return Vec::new();
    }
    serde_json::from_str::<Vec<String>>(&task.target_agent).unwrap_or_default()
}

async fn dispatch_tool(
    dispatcher: &ToolDispatcher,
    task: &MonitoringTask,
    targets: &[String],
) -> Result<Value, RunnerError> {
    if task.tool_name == "execute_host_command" && !targets.is_empty() {
        let mut per_target = serde_json::Map::new();
        for ip in targets {
            let mut args = substitute_target_braces(&task.tool_args, ip);
            if let Value::Object(map) = &mut args {
                map.insert("target".to_string(), Value::String(ip.clone()));
            }
            let result = dispatcher.execute(&task.tool_name, args).await?;
            per_target.insert(ip.clone(), result);
        }
        return Ok(Value::Object(per_target));
    }

    let mut args = task.tool_args.clone();
    if let [only_target] = targets {
        if let Value::Object(map) = &mut args {
            map.entry("agent_id").or_insert_with(|| Value::String(only_target.clone()));
        }
    }
    Ok(dispatcher.execute(&task.tool_name, args).await?)
}

/// Run one monitoring task, persist its execution log, and advance
/// `last_run` unconditionally — even when the run itself failed.
pub async fn execute_monitoring_task(db: &Database, dispatcher: &Arc<ToolDispatcher>, task_id: i64) -> Result<(), RunnerError> {
    let outcome = run_once(db, dispatcher, task_id).await;
    db.touch_task_last_run(task_id)?;
    outcome
}

async fn run_once(db: &Database, dispatcher: &Arc<ToolDispatcher>, task_id: i64) -> Result<(), RunnerError> {
    let task = db.get_task(task_id)?.ok_or(RunnerError::TaskNotFound(task_id))?;
    let targets = resolve_targets(&task);
    let executed_at = Utc::now();

    let mut log = json!({
        "task_id": task.id,
        "task_title": task.title,
        "tool_name": task.tool_name,
        "executed_at": executed_at.to_rfc3339(),
        "tool_args_sent": task.tool_args,
    });

    let raw_output = match dispatch_tool(dispatcher, &task, &targets).await {
        Ok(result) => result,
        Err(e) => {
            log["error"] = json!(e.to_string());
            db.insert_result(task.id, ResultStatus::Error, &log)?;
            return Err(e);
        }
    };
    log["raw_output"] = raw_output.clone();

    // No threshold configured at all → green, same as the original
    // runner (`if task.threshold_condition: ... else: status = green`).
    // An empty condition is not a malformed one, so it never reaches
    // `threshold::evaluate`'s hard InvalidCondition failure.
    let is_empty_condition = matches!(task.threshold_condition.trim(), "" | "{}");
    let (status, threshold_log) = if is_empty_condition {
        (
            ResultStatus::Green,
            json!({ "condition": task.threshold_condition, "triggered": false }),
        )
    } else {
        match threshold::evaluate(&task.threshold_condition, &raw_output) {
            Ok(eval) => (
                eval.status,
                json!({ "condition": task.threshold_condition, "extracted": eval.extracted, "triggered": eval.status != ResultStatus::Green }),
            ),
            Err(e) => (
                ResultStatus::Amber,
                json!({ "condition": task.threshold_condition, "error": e.to_string() }),
            ),
        }
    };
    log["threshold_eval"] = threshold_log;
    log["final_status"] = json!(status.to_string());

    if status == ResultStatus::Red {
        if let (Some(action_tool), Some(action_args_template)) = (&task.action_tool_name, &task.action_tool_args) {
            match template::render_action_args(action_args_template, &raw_output, &targets) {
                Ok(rendered_args) => match dispatcher.execute(action_tool, rendered_args.clone()).await {
                    Ok(action_result) => {
                        log["action_execution"] = json!({ "tool_name": action_tool, "args": rendered_args, "result": action_result });
                    }
                    Err(e) => {
                        log["action_execution"] = json!({ "tool_name": action_tool, "args": rendered_args, "error": e.to_string() });
                    }
                },
                Err(e) => {
                    log["action_execution"] = json!({ "tool_name": action_tool, "error": e.to_string() });
                }
            }
        }
    }

    db.insert_result(task.id, status, &log)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitute_target_braces_replaces_any_brace_group() {
        let args = json!({"command": "ping -c 4 {target} via {iface}"});
        let substituted = substitute_target_braces(&args, "10.0.0.9");
        assert_eq!(substituted["command"], "ping -c 4 10.0.0.9 via 10.0.0.9");
    }

    #[test]
    fn resolve_targets_all_is_empty_list() {
        let task = sample_task_with_target("all");
        assert!(resolve_targets(&task).is_empty());
    }

    #[test]
    fn resolve_targets_parses_json_list() {
        let task = sample_task_with_target(r#"["10.0.0.1", "10.0.0.2"]"#);
        assert_eq!(resolve_targets(&task), vec!["10.0.0.1", "10.0.0.2"]);
    }

    fn sample_task_with_target(target_agent: &str) -> MonitoringTask {
        MonitoringTask {
            id: 1,
            title: "t".to_string(),
            tool_name: "execute_host_command".to_string(),
            tool_args: json!({"command": "uptime"}),
            threshold_condition: "{}".to_string(),
            interval_minutes: 5,
            enabled: true,
            target_agent: target_agent.to_string(),
            action_tool_name: None,
            action_tool_args: None,
            last_run: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn execute_monitoring_task_rejects_unknown_task_id() {
        let db = Database::open_in_memory().unwrap();
        let dispatcher = Arc::new(ToolDispatcher::new(db.clone()));
        let result = execute_monitoring_task(&db, &dispatcher, 999).await;
        assert!(matches!(result, Err(RunnerError::TaskNotFound(999))));
    }

    #[tokio::test]
    async fn empty_threshold_condition_is_green_not_amber() {
        let db = Database::open_in_memory().unwrap();
        let dispatcher = Arc::new(ToolDispatcher::new(db.clone()));

        // `deploy_monitoring_task` needs no network or registered asset,
        // so the run reaches threshold evaluation deterministically.
        let task_id = db
            .create_task(&crate::db::tasks::NewTask {
                title: "bootstrap a disk check".to_string(),
                tool_name: "deploy_monitoring_task".to_string(),
                tool_args: json!({"title": "disk check", "tool_name": "execute_host_command"}),
                threshold_condition: "{}".to_string(),
                interval_minutes: 5,
                enabled: true,
                target_agent: "all".to_string(),
                action_tool_name: None,
                action_tool_args: None,
            })
            .unwrap();

        execute_monitoring_task(&db, &dispatcher, task_id).await.unwrap();
        let result = db.latest_result(task_id).unwrap().unwrap();
        assert_eq!(result.status, ResultStatus::Green);
    }
}
