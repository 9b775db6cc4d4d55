//! CLI argument definitions (C12): the `sentinel` command tree.

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(about = "Control plane for agentic security operations")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace). Default is warn.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Drive the reasoning loop (C5) interactively.
    Reason {
        /// Reasoning mode: ops, builder, builder_selection, builder_threshold,
        /// builder_action, audit_read, audit_analysis, audit_verify
        #[arg(long, default_value = "ops")]
        mode: String,

        /// LLM provider override (ollama, openai, anthropic, google)
        #[arg(long, env = "SENTINEL_PROVIDER")]
        provider: Option<String>,

        /// Model name override
        #[arg(long, env = "SENTINEL_MODEL")]
        model: Option<String>,

        /// Single message to send instead of starting an interactive prompt loop
        #[arg(long)]
        once: Option<String>,
    },

    /// Call a tool directly through the dispatcher (C4), for scripting/debugging.
    Dispatch {
        /// Tool name
        tool: String,

        /// Arguments as a JSON string
        #[arg(long, default_value = "{}")]
        args: String,
    },

    /// Drive the monitoring scheduler/runner (C8/C9).
    Monitor {
        #[command(subcommand)]
        command: MonitorCommands,
    },

    /// CRUD over monitoring tasks (C10's task table).
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
}

#[derive(Subcommand)]
pub enum MonitorCommands {
    /// Run one scheduler tick immediately and exit.
    RunOnce,
    /// Run the scheduler loop until interrupted.
    Run {
        /// Override the configured tick interval, in seconds.
        #[arg(long)]
        tick_secs: Option<u64>,
    },
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// List all monitoring tasks.
    List,
    /// Create a new monitoring task.
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        tool_name: String,
        /// Tool arguments as a JSON string.
        #[arg(long, default_value = "{}")]
        tool_args: String,
        /// Threshold condition as a JSON string.
        #[arg(long)]
        threshold_condition: String,
        #[arg(long)]
        interval_minutes: i64,
        /// Target agent: "all" or a JSON array of asset identifiers.
        #[arg(long, default_value = "all")]
        target_agent: String,
        #[arg(long)]
        action_tool_name: Option<String>,
        #[arg(long)]
        action_tool_args: Option<String>,
    },
    /// Enable a task by id.
    Enable { id: i64 },
    /// Disable a task by id.
    Disable { id: i64 },
    /// Delete a task by id.
    Delete { id: i64 },
}
