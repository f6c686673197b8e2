//! CLI surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use uuid::Uuid;

use crate::domain::models::Task;

#[derive(Parser)]
#[command(name = "slipway", version, about = "Bare-metal provisioning orchestrator")]
pub struct Cli {
    /// Path to a configuration file (defaults to slipway.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe the provisioning service endpoints
    Validate,
    /// Create a task for an action and drive it to completion
    Run {
        /// Action name, e.g. identify_node or power_on_node
        action: String,
        /// Nodes in scope; repeat for several
        #[arg(long = "node")]
        nodes: Vec<String>,
    },
    /// Inspect tasks
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Show a task and its subtasks
    Show { id: Uuid },
}

/// Render a task and its children as a table.
pub fn render_task_tree(task: &Task, children: &[Task]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["task", "action", "status", "result", "nodes", "detail"]);
    push_row(&mut table, task, "");
    for child in children {
        push_row(&mut table, child, "  ");
    }
    table
}

fn push_row(table: &mut Table, task: &Task, indent: &str) {
    table.add_row(vec![
        format!("{indent}{}", task.id),
        task.action.as_str().to_string(),
        task.status.as_str().to_string(),
        task.result.as_str().to_string(),
        task.node_list.join(","),
        task.result_detail.detail.join("; "),
    ]);
}
