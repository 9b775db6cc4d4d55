//! Scheduler (C9): the process-wide tick loop that drives the Monitor
//! Runner (C8). Grounded on the host crate's `monitor::run_loop`
//! (`tokio::time::sleep` in a `loop {}`), generalised to DB-task-driven
//! dispatch instead of repo polling.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SchedulerSectionConfig;
use crate::db::tasks::MonitoringTask;
use crate::db::Database;
use crate::dispatcher::ToolDispatcher;
use crate::runner;

fn is_due(task: &MonitoringTask, now: chrono::DateTime<Utc>) -> bool {
    match task.last_run {
        None => true,
        Some(last_run) => (now - last_run).num_minutes() >= task.interval_minutes,
    }
}

/// Run every enabled, due task concurrently. One task's failure never
/// blocks the others — each is logged and swallowed here, since
/// `runner::execute_monitoring_task` already persisted the failure.
async fn run_tick(db: &Database, dispatcher: &Arc<ToolDispatcher>) {
    let tasks = match db.list_enabled_tasks() {
        Ok(tasks) => tasks,
        Err(e) => {
            tracing::warn!("scheduler: failed to list enabled tasks: {e}");
            return;
        }
    };

    let now = Utc::now();
    let due: Vec<_> = tasks.into_iter().filter(|t| is_due(t, now)).collect();
    if due.is_empty() {
        return;
    }

    tracing::info!("scheduler: {} task(s) due", due.len());
    let mut handles = Vec::with_capacity(due.len());
    for task in due {
        let db = db.clone();
        let dispatcher = Arc::clone(dispatcher);
        handles.push(tokio::spawn(async move {
            if let Err(e) = runner::execute_monitoring_task(&db, &dispatcher, task.id).await {
                tracing::warn!("scheduler: task {} failed: {e}", task.id);
            }
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }
}

/// Run a single tick immediately, skipping the initial wait and the
/// periodic loop. Used by `sentinel monitor run-once`.
pub async fn run_once(db: &Database, dispatcher: &Arc<ToolDispatcher>) {
    run_tick(db, dispatcher).await;
}

/// The long-running scheduler coroutine: waits `initial_wait_secs` for
/// the store to be ready, then ticks every `tick_secs` until `shutdown`
/// resolves.
pub async fn run_loop(db: Database, dispatcher: Arc<ToolDispatcher>, config: &SchedulerSectionConfig, shutdown: impl std::future::Future<Output = ()>) {
    tokio::time::sleep(Duration::from_secs(config.initial_wait_secs)).await;

    let mut ticker = tokio::time::interval(Duration::from_secs(config.tick_secs));
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => run_tick(&db, &dispatcher).await,
            _ = &mut shutdown => {
                tracing::info!("scheduler: shutdown signal received");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tasks::{NewTask, ResultStatus};
    use serde_json::json;

    fn sample_task() -> NewTask {
        NewTask {
            title: "check".to_string(),
            tool_name: "execute_host_command".to_string(),
            tool_args: json!({"command": "uptime"}),
            threshold_condition: json!({"mode": "contains", "contains": []}).to_string(),
            interval_minutes: 5,
            enabled: true,
            target_agent: "all".to_string(),
            action_tool_name: None,
            action_tool_args: None,
        }
    }

    #[test]
    fn never_run_task_is_due() {
        let task = MonitoringTask {
            id: 1,
            title: "t".to_string(),
            tool_name: "x".to_string(),
            tool_args: json!({}),
            threshold_condition: "{}".to_string(),
            interval_minutes: 5,
            enabled: true,
            target_agent: "all".to_string(),
            action_tool_name: None,
            action_tool_args: None,
            last_run: None,
            created_at: Utc::now(),
        };
        assert!(is_due(&task, Utc::now()));
    }

    #[test]
    fn recently_run_task_is_not_due() {
        let mut task = MonitoringTask {
            id: 1,
            title: "t".to_string(),
            tool_name: "x".to_string(),
            tool_args: json!({}),
            threshold_condition: "{}".to_string(),
            interval_minutes: 10,
            enabled: true,
            target_agent: "all".to_string(),
            action_tool_name: None,
            action_tool_args: None,
            last_run: None,
            created_at: Utc::now(),
        };
        task.last_run = Some(Utc::now());
        assert!(!is_due(&task, Utc::now()));
    }

    #[tokio::test]
    async fn run_once_executes_due_task_and_advances_last_run() {
        let db = Database::open_in_memory().unwrap();
        // No target and no registered asset, so the dispatch itself
        // fails; what this test cares about is that the task still
        // gets a logged result and `last_run` still advances.
        let id = db.create_task(&sample_task()).unwrap();
        let dispatcher = Arc::new(ToolDispatcher::new(db.clone()));

        run_once(&db, &dispatcher).await;

        let task = db.get_task(id).unwrap().unwrap();
        assert!(task.last_run.is_some());
        let latest = db.latest_result(id).unwrap().unwrap();
        assert_eq!(latest.status, ResultStatus::Error);
    }

    #[tokio::test]
    async fn run_once_skips_disabled_tasks() {
        let db = Database::open_in_memory().unwrap();
        let mut disabled = sample_task();
        disabled.enabled = false;
        let id = db.create_task(&disabled).unwrap();
        let dispatcher = Arc::new(ToolDispatcher::new(db.clone()));

        run_once(&db, &dispatcher).await;

        let task = db.get_task(id).unwrap().unwrap();
        assert!(task.last_run.is_none());
    }
}
