//! End-to-end coverage for the six documented control-plane scenarios:
//! variable/contains/AI threshold evaluation, action-arg templating,
//! the MCP initialize → list-tools handshake, and reasoning-loop
//! self-correction after a tool validation error.

use sentinel_core::db::config_store::{ConfigSnapshot, ConfigStore, ProviderEntry};
use sentinel_core::db::tasks::ResultStatus;
use sentinel_core::db::Database;
use sentinel_core::dispatcher::ToolDispatcher;
use sentinel_core::events::{event_channel, AgentEventSender};
use sentinel_core::mcp::RemoteMcpClient;
use sentinel_core::reasoning::{self, Mode};
use sentinel_core::template;
use sentinel_core::threshold;
use serde_json::json;
use std::sync::Arc;

#[test]
fn scenario_1_variable_threshold_ping_loss() {
    let condition = json!({
        "mode": "variable",
        "parserRules": {"loss": "regex(\"(\\\\d+)% packet loss\", 1)"},
        "rules": [
            {"var": "loss", "op": ">", "value": 20.0, "level": "red"},
            {"var": "loss", "op": ">", "value": 0.0, "level": "amber"}
        ]
    })
    .to_string();

    let amber = json!({"stdout": "4 packets transmitted, 4 received, 10% packet loss"});
    assert_eq!(threshold::evaluate(&condition, &amber).unwrap().status, ResultStatus::Amber);

    let red = json!({"stdout": "4 packets transmitted, 2 received, 50% packet loss"});
    assert_eq!(threshold::evaluate(&condition, &red).unwrap().status, ResultStatus::Red);
}

#[test]
fn scenario_2_contains_threshold_error_scan() {
    let condition = json!({
        "mode": "contains",
        "contains": ["error", "critical"],
        "not_contains": ["OK"],
        "match_level": "red"
    })
    .to_string();

    let green = json!({"stdout": "system OK, no error"});
    assert_eq!(threshold::evaluate(&condition, &green).unwrap().status, ResultStatus::Green);

    let red = json!({"stdout": "critical failure detected"});
    assert_eq!(threshold::evaluate(&condition, &red).unwrap().status, ResultStatus::Red);
}

#[test]
fn scenario_3_ai_threshold_always_needs_review() {
    let condition = json!({"mode": "ai", "criteria": "any sign of lateral movement"}).to_string();
    let result = json!({"stdout": "found 3 suspicious SMB sessions"});
    assert_eq!(threshold::evaluate(&condition, &result).unwrap().status, ResultStatus::Amber);
}

#[test]
fn scenario_4_action_templating_substitutes_pid_and_host() {
    let result = json!({"pid": 1234, "host": "10.0.0.1"});
    let args = template::render_action_args(r#"{"command":"kill -9 {{pid}}","target":"{{host}}"}"#, &result, &[])
        .unwrap();
    assert_eq!(args["command"], "kill -9 1234");
    assert_eq!(args["target"], "10.0.0.1");
}

#[tokio::test]
async fn scenario_5_mcp_handshake_then_list_reuses_session_id() {
    let mut server = mockito::Server::new_async().await;

    let init_mock = server
        .mock("POST", "/mcp")
        .match_header("mcp-session-id", mockito::Matcher::Missing)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_header("Mcp-Session-Id", "sess-abc123")
        .with_body(r#"{"jsonrpc":"2.0","id":0,"result":{}}"#)
        .expect(1)
        .create_async()
        .await;

    let notify_mock = server
        .mock("POST", "/mcp")
        .match_header("mcp-session-id", "sess-abc123")
        .match_body(mockito::Matcher::Regex("notifications/initialized".to_string()))
        .with_status(200)
        .with_body("")
        .expect(1)
        .create_async()
        .await;

    let list_mock = server
        .mock("POST", "/mcp")
        .match_header("mcp-session-id", "sess-abc123")
        .match_body(mockito::Matcher::Regex("tools/list".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[{"name":"get_wazuh_alerts","description":"fetch alerts"}]}}"#)
        .expect(1)
        .create_async()
        .await;

    let client = RemoteMcpClient::new(format!("{}/mcp", server.url()));
    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "get_wazuh_alerts");

    init_mock.assert_async().await;
    notify_mock.assert_async().await;
    list_mock.assert_async().await;
}

#[tokio::test]
async fn scenario_6_reasoning_loop_self_corrects_after_validation_error() {
    let mut server = mockito::Server::new_async().await;

    // Mocks are matched most-recently-created-first, so each one below
    // is registered in the order the loop should *check* them (the
    // two-TOOL-RESULT matcher last, so it wins over the one-occurrence
    // matcher on the third request; that one in turn wins over the
    // catch-all on the second request).

    // First turn: the model calls `deploy_monitoring_task` without the
    // required `tool_name`, which the internal executor rejects
    // synchronously — no network involved on the tool side.
    let first_turn = server
        .mock("POST", "/api/generate")
        .match_body(mockito::Matcher::Any)
        .with_status(200)
        .with_body(
            "{\"response\":\"{\\\"tool\\\":\\\"deploy_monitoring_task\\\",\\\"args\\\":{\\\"title\\\":\\\"watch disk\\\"}}\",\"done\":true,\"prompt_eval_count\":1,\"eval_count\":1}\n",
        )
        .expect(1)
        .create_async()
        .await;

    // Second turn: the synthetic "TOOL RESULT ... error" message is in
    // the prompt, and the model submits the corrected call.
    let second_turn = server
        .mock("POST", "/api/generate")
        .match_body(mockito::Matcher::Regex("TOOL RESULT".to_string()))
        .with_status(200)
        .with_body(
            "{\"response\":\"{\\\"tool\\\":\\\"deploy_monitoring_task\\\",\\\"args\\\":{\\\"title\\\":\\\"watch disk\\\",\\\"tool_name\\\":\\\"execute_host_command\\\"}}\",\"done\":true,\"prompt_eval_count\":1,\"eval_count\":1}\n",
        )
        .expect(1)
        .create_async()
        .await;

    // Third turn: both the failed and the corrected call are now in
    // history (two "TOOL RESULT" messages) — the model reports success
    // in plain narrative, which has no embedded tool call and ends the
    // loop.
    let third_turn = server
        .mock("POST", "/api/generate")
        .match_body(mockito::Matcher::Regex("(?s)TOOL RESULT.*TOOL RESULT".to_string()))
        .with_status(200)
        .with_body(
            "{\"response\":\"Deployed the monitoring task successfully.\",\"done\":true,\"prompt_eval_count\":1,\"eval_count\":1}\n",
        )
        .expect(1)
        .create_async()
        .await;

    let db = Database::open_in_memory().unwrap();
    ConfigStore::new(&db)
        .save_config(&ConfigSnapshot {
            llm_provider: Some("ollama".to_string()),
            llm_model: Some("test-model".to_string()),
            provider_config: [(
                "ollama".to_string(),
                ProviderEntry { api_key: None, model: None, endpoint: Some(server.url()) },
            )]
            .into_iter()
            .collect(),
            ..Default::default()
        })
        .unwrap();

    let dispatcher = Arc::new(ToolDispatcher::new(db.clone()));
    let (tx, mut rx) = event_channel();
    let event_tx = AgentEventSender::new(tx);

    let mut tool_errors = Vec::new();
    let mut tool_successes = Vec::new();
    let collector = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let sentinel_core::events::AgentEvent::ToolCallRecorded { is_error, name, .. } = event {
                if is_error {
                    tool_errors.push(name);
                } else {
                    tool_successes.push(name);
                }
            }
        }
        (tool_errors, tool_successes)
    });

    reasoning::reason(&db, &dispatcher, Mode::Ops, None, None, "keep an eye on disk usage", &[], &event_tx)
        .await
        .unwrap();
    drop(event_tx);
    let (errors, successes) = collector.await.unwrap();

    assert_eq!(errors, vec!["deploy_monitoring_task"]);
    assert_eq!(successes, vec!["deploy_monitoring_task"]);
    assert_eq!(db.list_tasks().unwrap().len(), 1);

    first_turn.assert_async().await;
    second_turn.assert_async().await;
    third_turn.assert_async().await;
}
