//! Config Store (C1): read-through accessor for the single persisted
//! operator record — LLM provider catalog+keys, per-provider MCP config
//! and enable flags. Writes are whole-record replacements under the
//! fixed row key `"main"`.

use crate::errors::ConfigError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::Database;

const ROW_ID: &str = "main";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpProviderEntry {
    #[serde(default)]
    pub enabled: bool,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// The snapshot returned by [`get_config`][ConfigStore::get_config]. Callers
/// MUST treat this as read-only per-request data and re-fetch on the next
/// request rather than cache it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub llm_provider: Option<String>,
    pub llm_model: Option<String>,
    pub provider_config: HashMap<String, ProviderEntry>,
    pub mcp_provider_config: HashMap<String, McpProviderEntry>,
}

impl ConfigSnapshot {
    /// Providers default to enabled; a record only turns one off by
    /// being present with `enabled: false`.
    pub fn mcp_enabled(&self, provider: &str) -> bool {
        self.mcp_provider_config
            .get(provider)
            .map(|p| p.enabled)
            .unwrap_or(true)
    }
}

pub struct ConfigStore<'a> {
    db: &'a Database,
}

impl<'a> ConfigStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Read the single config record. Returns [`ConfigError::NotFound`] if
    /// the system has not been onboarded yet.
    pub fn get_config(&self) -> Result<ConfigSnapshot, ConfigError> {
        let row = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT llm_provider, llm_model, provider_config_json, mcp_provider_config_json \
                 FROM system_config WHERE id = ?1",
                [ROW_ID],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
        });

        let (llm_provider, llm_model, provider_json, mcp_json) = match row {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Err(ConfigError::NotFound),
            Err(e) => return Err(ConfigError::Store(e)),
        };

        Ok(ConfigSnapshot {
            llm_provider,
            llm_model,
            provider_config: serde_json::from_str(&provider_json)?,
            mcp_provider_config: serde_json::from_str(&mcp_json)?,
        })
    }

    /// Whole-record replacement under the fixed row key.
    pub fn save_config(&self, snapshot: &ConfigSnapshot) -> Result<(), ConfigError> {
        let provider_json = serde_json::to_string(&snapshot.provider_config)?;
        let mcp_json = serde_json::to_string(&snapshot.mcp_provider_config)?;
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO system_config (id, llm_provider, llm_model, provider_config_json, mcp_provider_config_json, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT(id) DO UPDATE SET \
                   llm_provider = excluded.llm_provider, \
                   llm_model = excluded.llm_model, \
                   provider_config_json = excluded.provider_config_json, \
                   mcp_provider_config_json = excluded.mcp_provider_config_json, \
                   updated_at = excluded.updated_at",
                rusqlite::params![
                    ROW_ID,
                    snapshot.llm_provider,
                    snapshot.llm_model,
                    provider_json,
                    mcp_json,
                    now,
                ],
            )
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let store = ConfigStore::new(&db);
        assert!(matches!(store.get_config(), Err(ConfigError::NotFound)));
    }

    #[test]
    fn save_then_get_round_trips() {
        let db = Database::open_in_memory().unwrap();
        let store = ConfigStore::new(&db);

        let mut snapshot = ConfigSnapshot {
            llm_provider: Some("openai".to_string()),
            llm_model: Some("gpt-4o".to_string()),
            ..Default::default()
        };
        snapshot.provider_config.insert(
            "openai".to_string(),
            ProviderEntry {
                api_key: Some("sk-test".to_string()),
                model: Some("gpt-4o".to_string()),
                endpoint: None,
            },
        );
        snapshot.mcp_provider_config.insert(
            "wazuh".to_string(),
            McpProviderEntry { enabled: true, extra: HashMap::new() },
        );

        store.save_config(&snapshot).unwrap();
        let loaded = store.get_config().unwrap();
        assert_eq!(loaded.llm_provider.as_deref(), Some("openai"));
        assert!(loaded.mcp_enabled("wazuh"));
        // falcon has no record at all, so it defaults to enabled.
        assert!(loaded.mcp_enabled("falcon"));

        snapshot.mcp_provider_config.insert(
            "falcon".to_string(),
            McpProviderEntry { enabled: false, extra: HashMap::new() },
        );
        store.save_config(&snapshot).unwrap();
        assert!(!store.get_config().unwrap().mcp_enabled("falcon"));
    }

    #[test]
    fn save_is_whole_record_replacement() {
        let db = Database::open_in_memory().unwrap();
        let store = ConfigStore::new(&db);

        store.save_config(&ConfigSnapshot {
            llm_provider: Some("ollama".to_string()),
            ..Default::default()
        }).unwrap();
        store.save_config(&ConfigSnapshot {
            llm_provider: Some("anthropic".to_string()),
            ..Default::default()
        }).unwrap();

        let loaded = store.get_config().unwrap();
        assert_eq!(loaded.llm_provider.as_deref(), Some("anthropic"));
    }
}
