//! Command handlers (C12): wires the `sentinel` CLI tree into the core
//! components (C4/C5/C8/C9/C10). Each handler owns whatever setup a
//! single invocation needs and returns once the command is done —
//! there is no long-lived `CommandContext` struct because, unlike the
//! host crate's interactive REPL, these are one-shot process
//! invocations against a shared database.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::cli::{MonitorCommands, TaskCommands};
use crate::db::tasks::NewTask;
use crate::db::Database;
use crate::dispatcher::ToolDispatcher;
use crate::events::{event_channel, AgentEvent, AgentEventSender};
use crate::llm::ChatMessage;
use crate::reasoning::{self, Mode};
use crate::scheduler;

/// Render one `AgentEvent` to the external delimiter protocol (§6) and
/// write it to stdout.
fn print_event(event: &AgentEvent) {
    let mut stdout = io::stdout();
    match event {
        AgentEvent::SystemMessage { message } => {
            let _ = writeln!(stdout, "[SYSTEM] {message}");
        }
        AgentEvent::Token { content } => {
            let _ = write!(stdout, "{content}");
        }
        AgentEvent::Thought { content } => {
            let _ = write!(stdout, "[THOUGHT] {content} [/THOUGHT]");
        }
        AgentEvent::ToolCallRecorded { name, arguments, result, .. } => {
            let payload = serde_json::json!({ "tool": name, "args": arguments, "result": result });
            let _ = writeln!(stdout, "\n[MCP_TOOL_CALL]{payload}[/MCP_TOOL_CALL]");
        }
        AgentEvent::AuditResult { verdict } => {
            let _ = writeln!(stdout, "\n[AUDIT_RESULT:{verdict}]");
        }
        AgentEvent::Error { message } => {
            let _ = writeln!(stdout, "[SYSTEM] {message}");
        }
        AgentEvent::FileUpload { filename } => {
            let _ = writeln!(stdout, "[SYSTEM] received file upload: {filename}");
        }
        AgentEvent::ToolStart { .. } | AgentEvent::Iteration { .. } | AgentEvent::ResponseComplete { .. } => {}
    }
    let _ = stdout.flush();
}

/// Run a single reasoning turn, streaming its events to stdout, and
/// return the final assistant text for history-keeping.
async fn run_one_turn(
    db: &Database,
    dispatcher: &Arc<ToolDispatcher>,
    mode: Mode,
    provider: Option<&str>,
    model: Option<&str>,
    input: &str,
    history: &[ChatMessage],
) -> Result<String> {
    let (tx, mut rx) = event_channel();
    let event_tx = AgentEventSender::new(tx);

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    });

    let result = reasoning::reason(db, dispatcher, mode, provider, model, input, history, &event_tx).await;
    drop(event_tx);
    let _ = printer.await;
    println!();

    result.map_err(|e| anyhow::anyhow!(e))
}

pub async fn handle_reason(
    db: &Database,
    dispatcher: &Arc<ToolDispatcher>,
    mode: &str,
    provider: Option<&str>,
    model: Option<&str>,
    once: Option<&str>,
) -> Result<()> {
    let mode = Mode::parse(mode).ok_or_else(|| anyhow::anyhow!("unknown reasoning mode: {mode}"))?;

    if let Some(message) = once {
        run_one_turn(db, dispatcher, mode, provider, model, message, &[]).await?;
        return Ok(());
    }

    let mut history: Vec<ChatMessage> = Vec::new();
    let stdin = io::stdin();

    loop {
        print!("> ");
        io::stdout().flush().ok();

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = run_one_turn(db, dispatcher, mode, provider, model, line, &history).await?;
        history.push(ChatMessage::user(line.to_string()));
        history.push(ChatMessage::assistant(response));
    }

    Ok(())
}

pub async fn handle_dispatch(dispatcher: &ToolDispatcher, tool: &str, args_json: &str) -> Result<()> {
    let args: Value = serde_json::from_str(args_json).context("--args must be valid JSON")?;
    match dispatcher.execute(tool, args).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("tool call failed: {e}")),
    }
}

pub async fn handle_monitor(db: &Database, dispatcher: &Arc<ToolDispatcher>, command: &MonitorCommands, config: &crate::config::SchedulerSectionConfig) -> Result<()> {
    match command {
        MonitorCommands::RunOnce => {
            scheduler::run_once(db, dispatcher).await;
            Ok(())
        }
        MonitorCommands::Run { tick_secs } => {
            let mut effective = crate::config::SchedulerSectionConfig {
                tick_secs: config.tick_secs,
                initial_wait_secs: config.initial_wait_secs,
            };
            if let Some(secs) = tick_secs {
                effective.tick_secs = *secs;
            }

            let shutdown = async {
                let _ = tokio::signal::ctrl_c().await;
            };
            scheduler::run_loop(db.clone(), Arc::clone(dispatcher), &effective, shutdown).await;
            Ok(())
        }
    }
}

pub fn handle_task(db: &Database, command: &TaskCommands) -> Result<()> {
    match command {
        TaskCommands::List => {
            let tasks = db.list_tasks()?;
            println!("{}", serde_json::to_string_pretty(&tasks)?);
            Ok(())
        }
        TaskCommands::Create {
            title,
            tool_name,
            tool_args,
            threshold_condition,
            interval_minutes,
            target_agent,
            action_tool_name,
            action_tool_args,
        } => {
            let tool_args: Value = serde_json::from_str(tool_args).context("--tool-args must be valid JSON")?;
            // Validated here rather than deferred to the runner, so a typo
            // surfaces at creation time instead of at the next tick.
            serde_json::from_str::<Value>(threshold_condition).context("--threshold-condition must be valid JSON")?;

            let id = db.create_task(&NewTask {
                title: title.clone(),
                tool_name: tool_name.clone(),
                tool_args,
                threshold_condition: threshold_condition.clone(),
                interval_minutes: *interval_minutes,
                enabled: true,
                target_agent: target_agent.clone(),
                action_tool_name: action_tool_name.clone(),
                action_tool_args: action_tool_args.clone(),
            })?;
            println!("created task {id}");
            Ok(())
        }
        TaskCommands::Enable { id } => {
            db.set_task_enabled(*id, true)?;
            println!("enabled task {id}");
            Ok(())
        }
        TaskCommands::Disable { id } => {
            db.set_task_enabled(*id, false)?;
            println!("disabled task {id}");
            Ok(())
        }
        TaskCommands::Delete { id } => {
            db.delete_task(*id)?;
            println!("deleted task {id}");
            Ok(())
        }
    }
}
