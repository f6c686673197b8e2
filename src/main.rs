//! Slipway CLI entry point.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;

use slipway::application::{Orchestrator, TaskRequest};
use slipway::cli::{render_task_tree, Cli, Commands, TaskCommands};
use slipway::domain::models::OrchestratorAction;
use slipway::domain::ports::TokioClock;
use slipway::infrastructure::{ConfigLoader, SqliteTaskStore, YamlDesignResolver};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    let _logging = slipway::infrastructure::logging::init(&config.logging)?;

    let store = Arc::new(
        SqliteTaskStore::connect(&config.store.database_url)
            .await
            .context("Failed to open the task store")?,
    );
    let orchestrator = Orchestrator::new(
        store,
        Arc::new(YamlDesignResolver),
        Arc::new(TokioClock),
        &config,
    );

    match cli.command {
        Commands::Validate => {
            let task = orchestrator
                .create_task(TaskRequest {
                    parent_id: None,
                    action: OrchestratorAction::ValidateNodeServices,
                    design_ref: config.site.design_path.clone(),
                    site_name: config.site.name.clone(),
                    node_list: Vec::new(),
                })
                .await?;
            let task = orchestrator.execute_task(task.id).await?;
            println!(
                "validation {}: {}",
                task.result.as_str(),
                task.result_detail.detail.join("; ")
            );
        }
        Commands::Run { action, nodes } => {
            let Some(action) = OrchestratorAction::from_str(&action) else {
                bail!("unknown action: {action}");
            };
            let task = orchestrator
                .create_task(TaskRequest {
                    parent_id: None,
                    action,
                    design_ref: config.site.design_path.clone(),
                    site_name: config.site.name.clone(),
                    node_list: nodes,
                })
                .await?;
            let task = orchestrator.execute_task(task.id).await?;

            let mut children = Vec::new();
            for id in &task.subtasks {
                if let Some(child) = orchestrator.get_task(*id).await? {
                    children.push(child);
                }
            }
            println!("{}", render_task_tree(&task, &children));
        }
        Commands::Task { command } => match command {
            TaskCommands::Show { id } => {
                let Some(task) = orchestrator.get_task(id).await? else {
                    bail!("no such task: {id}");
                };
                let mut children = Vec::new();
                for id in &task.subtasks {
                    if let Some(child) = orchestrator.get_task(*id).await? {
                        children.push(child);
                    }
                }
                println!("{}", render_task_tree(&task, &children));
            }
        },
    }

    Ok(())
}
