//! Orchestrator: task creation and routing.
//!
//! The composition root of the runtime. Creates tasks against the store,
//! routes each to the driver family owning its action, and propagates the
//! shutdown signal into every dispatch as a cancellation token.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use super::{NodeDriver, OobDriver};
use crate::domain::error::{DriverError, DriverResult};
use crate::domain::models::{
    ActionClass, OrchestratorAction, OrchestratorConfig, Task, TaskFieldUpdate,
};
use crate::domain::ports::{Clock, DesignResolver, TaskStore};

/// Everything needed to create a task.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub parent_id: Option<Uuid>,
    pub action: OrchestratorAction,
    pub design_ref: String,
    pub site_name: String,
    pub node_list: Vec<String>,
}

/// Top-level routing over the driver families.
pub struct Orchestrator {
    store: Arc<dyn TaskStore>,
    node_driver: NodeDriver,
    oob_driver: OobDriver,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        resolver: Arc<dyn DesignResolver>,
        clock: Arc<dyn Clock>,
        config: &OrchestratorConfig,
    ) -> Self {
        let node_driver = NodeDriver::new(
            Arc::clone(&store),
            Arc::clone(&resolver),
            Arc::clone(&clock),
            config.metal.clone(),
        );
        let oob_driver = OobDriver::new(
            Arc::clone(&store),
            Arc::clone(&resolver),
            Arc::clone(&clock),
            config.bmc.clone(),
        );
        Self {
            store,
            node_driver,
            oob_driver,
            shutdown: CancellationToken::new(),
        }
    }

    /// Create and persist a task.
    pub async fn create_task(&self, request: TaskRequest) -> DriverResult<Task> {
        let mut task = Task::new(request.action, request.design_ref, request.site_name)
            .with_nodes(request.node_list);
        if let Some(parent_id) = request.parent_id {
            task = task.with_parent(parent_id);
        }
        self.store.create_task(&task).await?;
        info!(task = %task.id, action = task.action.as_str(), "task created");
        Ok(task)
    }

    /// Route a task to its driver and return the completed record.
    pub async fn execute_task(&self, task_id: Uuid) -> DriverResult<Task> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| DriverError::usage(format!("invalid task {task_id}")))?;

        let cancel = self.shutdown.child_token();
        match task.action.class() {
            ActionClass::NodeProvision => self.node_driver.execute_task(task_id, cancel).await?,
            ActionClass::Oob => self.oob_driver.execute_task(task_id, cancel).await?,
        }

        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| DriverError::usage(format!("task {task_id} vanished mid-flight")))
    }

    /// Fetch a task and its populated subtask list.
    pub async fn get_task(&self, task_id: Uuid) -> DriverResult<Option<Task>> {
        Ok(self.store.get_task(task_id).await?)
    }

    /// Task-tree update primitive, exposed for embedders.
    pub async fn task_field_update(
        &self,
        task_id: Uuid,
        update: TaskFieldUpdate,
    ) -> DriverResult<()> {
        Ok(self.store.task_field_update(task_id, update).await?)
    }

    /// Signal every in-flight dispatch to wind down cooperatively.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
