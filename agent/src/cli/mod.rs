//! CLI front-end (C12): the `sentinel` command tree, parsed here and
//! dispatched by `handlers`.

pub mod args;

pub use args::{Cli, Commands, MonitorCommands, TaskCommands};
