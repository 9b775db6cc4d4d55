//! Database schema definitions and migrations

use anyhow::Result;
use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Create all tables if they don't exist
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Single-row operator config (Config Store, C1): one record under
        -- a fixed key, sub-structures stored as JSON text.
        CREATE TABLE IF NOT EXISTS system_config (
            id TEXT PRIMARY KEY,
            llm_provider TEXT,
            llm_model TEXT,
            provider_config_json TEXT NOT NULL DEFAULT '{}',
            mcp_provider_config_json TEXT NOT NULL DEFAULT '{}',
            updated_at TEXT NOT NULL
        );

        -- SSH-reachable hosts
        CREATE TABLE IF NOT EXISTS assets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            ip TEXT NOT NULL,
            port INTEGER NOT NULL DEFAULT 22,
            user TEXT NOT NULL,
            os TEXT NOT NULL DEFAULT 'linux',
            auth_mode TEXT NOT NULL DEFAULT 'password',
            password TEXT,
            key_id INTEGER,
            FOREIGN KEY (key_id) REFERENCES key_entries(id) ON DELETE SET NULL
        );

        -- SSH private keys, referenced by asset.key_id
        CREATE TABLE IF NOT EXISTS key_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            private_key TEXT NOT NULL
        );

        -- Monitoring blueprints
        CREATE TABLE IF NOT EXISTS monitoring_tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            tool_name TEXT NOT NULL,
            tool_args TEXT NOT NULL DEFAULT '{}',
            threshold_condition TEXT NOT NULL,
            interval_minutes INTEGER NOT NULL DEFAULT 5,
            enabled INTEGER NOT NULL DEFAULT 1,
            target_agent TEXT NOT NULL DEFAULT 'all',
            action_tool_name TEXT,
            action_tool_args TEXT,
            last_run TEXT,
            created_at TEXT NOT NULL,
            CHECK (interval_minutes >= 1)
        );

        -- Append-only execution log, newest row per task is its current status
        CREATE TABLE IF NOT EXISTS monitoring_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id INTEGER NOT NULL,
            status TEXT NOT NULL,
            result_data TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            FOREIGN KEY (task_id) REFERENCES monitoring_tasks(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_results_task
        ON monitoring_results(task_id, timestamp DESC);

        CREATE INDEX IF NOT EXISTS idx_tasks_enabled
        ON monitoring_tasks(enabled);

        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        INSERT OR IGNORE INTO schema_version (version) VALUES (1);
        "#,
    )?;

    Ok(())
}

/// Get the current schema version
#[allow(dead_code)]
pub fn get_version(conn: &Connection) -> Result<i32> {
    let version: i32 = conn.query_row(
        "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}
