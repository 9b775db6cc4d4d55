//! Process bootstrap configuration (C11): where the database lives, the
//! log level, the scheduler tick, and the default LLM provider/model.
//!
//! Distinct from the DB-backed Config Store (`db::config_store`): this is
//! read once at process start from a layered `.sentinel.toml` + env vars;
//! the Config Store is the operator record re-fetched on every request.

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct ProcessConfig {
    #[serde(default)]
    pub db: DbSectionConfig,
    #[serde(default)]
    pub llm: LlmSectionConfig,
    #[serde(default)]
    pub scheduler: SchedulerSectionConfig,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            db: DbSectionConfig::default(),
            llm: LlmSectionConfig::default(),
            scheduler: SchedulerSectionConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DbSectionConfig {
    pub path: Option<PathBuf>,
}

impl Default for DbSectionConfig {
    fn default() -> Self {
        Self { path: None }
    }
}

#[derive(Debug, Deserialize)]
pub struct LlmSectionConfig {
    #[serde(default = "default_provider")]
    pub default_provider: String,
    #[serde(default = "default_model")]
    pub default_model: String,
}

impl Default for LlmSectionConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            default_model: default_model(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SchedulerSectionConfig {
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_initial_wait_secs")]
    pub initial_wait_secs: u64,
}

impl Default for SchedulerSectionConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            initial_wait_secs: default_initial_wait_secs(),
        }
    }
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_model() -> String {
    "llama3.1".to_string()
}

fn default_tick_secs() -> u64 {
    60
}

fn default_initial_wait_secs() -> u64 {
    5
}

impl ProcessConfig {
    /// Load config from `.sentinel.toml`.
    ///
    /// Search order:
    /// 1. `./.sentinel.toml` (current directory)
    /// 2. Fall back to defaults
    pub fn load() -> Result<Self> {
        if let Ok(cwd) = std::env::current_dir() {
            let local_config = cwd.join(".sentinel.toml");
            if local_config.exists() {
                return Self::load_from_path(&local_config);
            }
        }

        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ProcessConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ProcessConfig::default();
        assert_eq!(config.scheduler.tick_secs, 60);
        assert_eq!(config.scheduler.initial_wait_secs, 5);
        assert_eq!(config.llm.default_provider, "ollama");
    }

    #[test]
    fn loads_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".sentinel.toml");
        std::fs::write(&path, "[scheduler]\ntick_secs = 30\n").unwrap();
        let config = ProcessConfig::load_from_path(&path).unwrap();
        assert_eq!(config.scheduler.tick_secs, 30);
        assert_eq!(config.scheduler.initial_wait_secs, 5);
    }
}
