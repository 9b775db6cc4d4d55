//! Monitoring Task and Monitoring Result persistence (§3), read by the
//! Scheduler (C9) and written by the Runner (C8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Green,
    Amber,
    Red,
    Error,
    Unknown,
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResultStatus::Green => "green",
            ResultStatus::Amber => "amber",
            ResultStatus::Red => "red",
            ResultStatus::Error => "error",
            ResultStatus::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ResultStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "green" => Ok(ResultStatus::Green),
            "amber" => Ok(ResultStatus::Amber),
            "red" => Ok(ResultStatus::Red),
            "error" => Ok(ResultStatus::Error),
            "unknown" => Ok(ResultStatus::Unknown),
            other => Err(format!("unknown result status: {other}")),
        }
    }
}

/// `target_agent` is either the literal `"all"` or a JSON-encoded list of
/// asset identifiers; this is stored verbatim and parsed by the runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringTask {
    pub id: i64,
    pub title: String,
    pub tool_name: String,
    pub tool_args: Value,
    pub threshold_condition: String,
    pub interval_minutes: i64,
    pub enabled: bool,
    pub target_agent: String,
    pub action_tool_name: Option<String>,
    pub action_tool_args: Option<String>,
    pub last_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringResult {
    pub id: i64,
    pub task_id: i64,
    pub status: ResultStatus,
    pub result_data: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct NewTask {
    pub title: String,
    pub tool_name: String,
    pub tool_args: Value,
    pub threshold_condition: String,
    pub interval_minutes: i64,
    pub enabled: bool,
    pub target_agent: String,
    pub action_tool_name: Option<String>,
    pub action_tool_args: Option<String>,
}

const TASK_COLUMNS: &str = "id, title, tool_name, tool_args, threshold_condition, interval_minutes, \
    enabled, target_agent, action_tool_name, action_tool_args, last_run, created_at";

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<MonitoringTask> {
    let tool_args_json: String = row.get(3)?;
    let last_run: Option<String> = row.get(10)?;
    let created_at: String = row.get(11)?;

    Ok(MonitoringTask {
        id: row.get(0)?,
        title: row.get(1)?,
        tool_name: row.get(2)?,
        tool_args: serde_json::from_str(&tool_args_json).unwrap_or(Value::Object(Default::default())),
        threshold_condition: row.get(4)?,
        interval_minutes: row.get(5)?,
        enabled: row.get::<_, i64>(6)? != 0,
        target_agent: row.get(7)?,
        action_tool_name: row.get(8)?,
        action_tool_args: row.get(9)?,
        last_run: last_run.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

impl Database {
    pub fn create_task(&self, task: &NewTask) -> rusqlite::Result<i64> {
        let tool_args_json = serde_json::to_string(&task.tool_args).unwrap_or_else(|_| "{}".to_string());
        let now = Utc::now().to_rfc3339();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO monitoring_tasks \
                 (title, tool_name, tool_args, threshold_condition, interval_minutes, enabled, \
                  target_agent, action_tool_name, action_tool_args, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    task.title,
                    task.tool_name,
                    tool_args_json,
                    task.threshold_condition,
                    task.interval_minutes,
                    task.enabled as i64,
                    task.target_agent,
                    task.action_tool_name,
                    task.action_tool_args,
                    now,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_task(&self, id: i64) -> rusqlite::Result<Option<MonitoringTask>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {TASK_COLUMNS} FROM monitoring_tasks WHERE id = ?1"),
                [id],
                row_to_task,
            )
            .map(Some)
            .or_else(|e| {
                if matches!(e, rusqlite::Error::QueryReturnedNoRows) {
                    Ok(None)
                } else {
                    Err(e)
                }
            })
        })
    }

    /// Tasks with `enabled = true`, read by the scheduler every tick.
    pub fn list_enabled_tasks(&self) -> rusqlite::Result<Vec<MonitoringTask>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM monitoring_tasks WHERE enabled = 1"
            ))?;
            let rows = stmt.query_map([], row_to_task)?;
            rows.collect()
        })
    }

    pub fn list_tasks(&self) -> rusqlite::Result<Vec<MonitoringTask>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM monitoring_tasks ORDER BY id"
            ))?;
            let rows = stmt.query_map([], row_to_task)?;
            rows.collect()
        })
    }

    pub fn set_task_enabled(&self, id: i64, enabled: bool) -> rusqlite::Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE monitoring_tasks SET enabled = ?1 WHERE id = ?2",
                rusqlite::params![enabled as i64, id],
            )
        })?;
        Ok(())
    }

    pub fn delete_task(&self, id: i64) -> rusqlite::Result<()> {
        self.with_conn(|conn| conn.execute("DELETE FROM monitoring_tasks WHERE id = ?1", [id]))?;
        Ok(())
    }

    /// Advance `last_run` to now. Called unconditionally at the end of the
    /// runner, even when the run itself failed.
    pub fn touch_task_last_run(&self, id: i64) -> rusqlite::Result<()> {
        let now = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE monitoring_tasks SET last_run = ?1 WHERE id = ?2",
                rusqlite::params![now, id],
            )
        })?;
        Ok(())
    }

    /// Append a Monitoring Result row. Append-only; the newest row per
    /// `task_id` is the task's current displayed status.
    pub fn insert_result(&self, task_id: i64, status: ResultStatus, result_data: &Value) -> rusqlite::Result<i64> {
        let data_json = serde_json::to_string(result_data).unwrap_or_else(|_| "{}".to_string());
        let now = Utc::now().to_rfc3339();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO monitoring_results (task_id, status, result_data, timestamp) \
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![task_id, status.to_string(), data_json, now],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn latest_result(&self, task_id: i64) -> rusqlite::Result<Option<MonitoringResult>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, task_id, status, result_data, timestamp FROM monitoring_results \
                 WHERE task_id = ?1 ORDER BY timestamp DESC, id DESC LIMIT 1",
                [task_id],
                |row| {
                    let status_str: String = row.get(2)?;
                    let data_json: String = row.get(3)?;
                    let ts: String = row.get(4)?;
                    Ok(MonitoringResult {
                        id: row.get(0)?,
                        task_id: row.get(1)?,
                        status: ResultStatus::from_str(&status_str).unwrap_or(ResultStatus::Unknown),
                        result_data: serde_json::from_str(&data_json).unwrap_or(Value::Null),
                        timestamp: DateTime::parse_from_rfc3339(&ts)
                            .map(|d| d.with_timezone(&Utc))
                            .unwrap_or_else(|_| Utc::now()),
                    })
                },
            )
            .map(Some)
            .or_else(|e| {
                if matches!(e, rusqlite::Error::QueryReturnedNoRows) {
                    Ok(None)
                } else {
                    Err(e)
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task() -> NewTask {
        NewTask {
            title: "ping check".to_string(),
            tool_name: "execute_host_command".to_string(),
            tool_args: serde_json::json!({"command": "ping -c 4 {target}"}),
            threshold_condition: serde_json::json!({"mode": "variable"}).to_string(),
            interval_minutes: 5,
            enabled: true,
            target_agent: serde_json::json!(["10.0.0.1"]).to_string(),
            action_tool_name: None,
            action_tool_args: None,
        }
    }

    #[test]
    fn create_and_fetch_task() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_task(&sample_task()).unwrap();
        let task = db.get_task(id).unwrap().unwrap();
        assert_eq!(task.title, "ping check");
        assert!(task.last_run.is_none());
        assert!(task.enabled);
    }

    #[test]
    fn list_enabled_tasks_excludes_disabled() {
        let db = Database::open_in_memory().unwrap();
        let enabled_id = db.create_task(&sample_task()).unwrap();
        let mut disabled = sample_task();
        disabled.enabled = false;
        db.create_task(&disabled).unwrap();

        let enabled = db.list_enabled_tasks().unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, enabled_id);
    }

    #[test]
    fn touch_last_run_strictly_advances() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_task(&sample_task()).unwrap();
        let before = db.get_task(id).unwrap().unwrap().last_run;
        assert!(before.is_none());

        db.touch_task_last_run(id).unwrap();
        let after = db.get_task(id).unwrap().unwrap().last_run;
        assert!(after.is_some());
    }

    #[test]
    fn latest_result_is_newest() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_task(&sample_task()).unwrap();
        db.insert_result(id, ResultStatus::Green, &serde_json::json!({"n": 1})).unwrap();
        db.insert_result(id, ResultStatus::Red, &serde_json::json!({"n": 2})).unwrap();

        let latest = db.latest_result(id).unwrap().unwrap();
        assert_eq!(latest.status, ResultStatus::Red);
        assert_eq!(latest.result_data["n"], 2);
    }

    #[test]
    fn status_display_and_parse_round_trip() {
        for s in [ResultStatus::Green, ResultStatus::Amber, ResultStatus::Red, ResultStatus::Error, ResultStatus::Unknown] {
            let text = s.to_string();
            assert_eq!(ResultStatus::from_str(&text).unwrap(), s);
        }
    }
}
