//! `sentinel`: control plane for agentic security operations.
//!
//! This is a slim dispatcher that loads config, opens the database,
//! and routes the parsed command to its handler in `handlers`.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sentinel_core::cli::{Cli, Commands};
use sentinel_core::config::ProcessConfig;
use sentinel_core::db::Database;
use sentinel_core::dispatcher::ToolDispatcher;
use sentinel_core::handlers;

/// Initialize tracing with the given verbosity level
///
/// - 0: warn (default)
/// - 1: info (-v)
/// - 2: debug (-vv)
/// - 3+: trace (-vvv)
///
/// Set `LOG_FORMAT=json` for structured JSON output (useful for production/log aggregation).
/// Default is human-readable text output.
fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);

    if use_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = ProcessConfig::load()?;
    let db = match &config.db.path {
        Some(path) => Database::open_at(path.clone())?,
        None => Database::open()?,
    };
    let dispatcher = Arc::new(ToolDispatcher::new(db.clone()));

    match cli.command {
        Commands::Reason { mode, provider, model, once } => {
            handlers::handle_reason(&db, &dispatcher, &mode, provider.as_deref(), model.as_deref(), once.as_deref()).await
        }
        Commands::Dispatch { tool, args } => handlers::handle_dispatch(&dispatcher, &tool, &args).await,
        Commands::Monitor { command } => handlers::handle_monitor(&db, &dispatcher, &command, &config.scheduler).await,
        Commands::Task { command } => handlers::handle_task(&db, &command),
    }
}
