//! Out-of-band driver.
//!
//! Fans a task out across its nodes on a bounded worker pool, one
//! controller conversation per worker, then waits out the configured task
//! timeout and aggregates.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use super::actions::oob::{run_oob_op, OobContext, OobOp};
use super::actions::run_action;
use super::aggregate::{aggregate, ChildOutcome};
use super::{wait_for_subtasks, PollBudget};
use crate::domain::error::{DriverError, DriverResult};
use crate::domain::models::{
    BmcDriverConfig, OrchestratorAction, Task, TaskFieldUpdate, TaskStatus,
};
use crate::domain::ports::{Clock, DesignResolver, TaskStore};

/// Tick the parent uses while waiting on the worker pool.
const POOL_POLL_INTERVAL_SECS: u64 = 10;

/// Driver for the out-of-band controller family of actions.
pub struct OobDriver {
    store: Arc<dyn TaskStore>,
    resolver: Arc<dyn DesignResolver>,
    clock: Arc<dyn Clock>,
    config: BmcDriverConfig,
    pool_wait: PollBudget,
}

impl OobDriver {
    pub fn new(
        store: Arc<dyn TaskStore>,
        resolver: Arc<dyn DesignResolver>,
        clock: Arc<dyn Clock>,
        config: BmcDriverConfig,
    ) -> Self {
        let attempts = (config.task_timeout_mins * 60).div_ceil(POOL_POLL_INTERVAL_SECS);
        let pool_wait = PollBudget::new(
            u32::try_from(attempts).unwrap_or(u32::MAX),
            Duration::from_secs(POOL_POLL_INTERVAL_SECS),
        );
        Self {
            store,
            resolver,
            clock,
            config,
            pool_wait,
        }
    }

    /// Override the pool wait budget. Intended for tests.
    pub fn with_pool_wait(mut self, pool_wait: PollBudget) -> Self {
        self.pool_wait = pool_wait;
        self
    }

    /// Whether this driver handles the action.
    pub fn supports(action: OrchestratorAction) -> bool {
        Self::op_for(action).is_some()
    }

    fn op_for(action: OrchestratorAction) -> Option<OobOp> {
        match action {
            OrchestratorAction::ValidateOobServices => Some(OobOp::Validate),
            OrchestratorAction::ConfigNodePxe => Some(OobOp::ConfigPxe),
            OrchestratorAction::SetNodeBoot => Some(OobOp::SetBoot),
            OrchestratorAction::PowerOffNode => Some(OobOp::PowerOff),
            OrchestratorAction::PowerOnNode => Some(OobOp::PowerOn),
            OrchestratorAction::PowerCycleNode => Some(OobOp::PowerCycle),
            OrchestratorAction::InterrogateOob => Some(OobOp::Interrogate),
            _ => None,
        }
    }

    /// Execute one task to completion, publishing the outcome through the
    /// task store. Only usage errors surface as `Err`.
    pub async fn execute_task(&self, task_id: Uuid, cancel: CancellationToken) -> DriverResult<()> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| DriverError::usage(format!("invalid task {task_id}")))?;

        let Some(op) = Self::op_for(task.action) else {
            return Err(DriverError::usage(format!(
                "oob driver does not support action {}",
                task.action.as_str()
            )));
        };

        if task.design_ref.is_empty() {
            return Err(DriverError::usage(format!(
                "no design reference in task {task_id}"
            )));
        }
        let design = Arc::new(
            self.resolver
                .resolve(&task.design_ref)
                .await
                .map_err(|e| DriverError::usage(format!("cannot resolve design: {e}")))?,
        );

        self.store
            .task_field_update(
                task.id,
                TaskFieldUpdate::default().status(TaskStatus::Running),
            )
            .await?;

        let pool = Arc::new(Semaphore::new(self.config.worker_pool_size));
        let ctx = OobContext {
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
        };

        for node in &task.node_list {
            let subtask = Task::new(task.action, task.design_ref.clone(), task.site_name.clone())
                .with_parent(task.id)
                .with_nodes(vec![node.clone()]);
            self.store.create_task(&subtask).await?;
            info!(
                subtask = %subtask.id,
                node = %node,
                action = task.action.as_str(),
                "starting controller worker"
            );

            let store = Arc::clone(&self.store);
            let design = Arc::clone(&design);
            let ctx = ctx.clone();
            let pool = Arc::clone(&pool);
            let child_cancel = cancel.child_token();
            tokio::spawn(async move {
                let Ok(_permit) = pool.acquire_owned().await else {
                    return;
                };
                let subtask_id = subtask.id;
                run_action(store, subtask_id, child_cancel, move || async move {
                    run_oob_op(op, &subtask, &design, &ctx).await
                })
                .await;
            });
        }

        let children = wait_for_subtasks(
            self.store.as_ref(),
            self.clock.as_ref(),
            task.id,
            self.pool_wait,
        )
        .await?;
        let outcomes: Vec<ChildOutcome> = children.iter().map(ChildOutcome::from_task).collect();
        let (result, detail) = aggregate(&outcomes);
        self.store
            .task_field_update(task.id, TaskFieldUpdate::complete(result, detail))
            .await?;
        Ok(())
    }
}
