//! Node provisioning driver.
//!
//! Routes machine-provisioning actions: the single-shot service probe, the
//! site-wide network template subtask, and the per-node fan-outs with
//! coarse-tick polling and budget-bounded waits.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::actions::{
    configure_hardware::configure_hardware, identify_node::identify_node,
    network_template::create_network_template, node_networking::apply_node_networking, run_action,
};
use super::aggregate::{aggregate, ChildOutcome};
use super::{wait_for_subtasks, PollBudget};
use crate::adapters::metal::MetalClient;
use crate::domain::error::{DriverError, DriverResult};
use crate::domain::models::{
    ActionResult, MetalDriverConfig, OrchestratorAction, ResultDetail, SiteDesign, Task,
    TaskFieldUpdate, TaskScope, TaskStatus,
};
use crate::domain::ports::{Clock, DesignResolver, TaskStore};

/// Tick the parent uses while waiting on the network template subtask.
const TEMPLATE_POLL_INTERVAL_SECS: u64 = 5;

/// Polling budgets for the driver's dispatch and commissioning loops.
#[derive(Debug, Clone, Copy)]
pub struct NodeDriverBudgets {
    /// Parent wait for node identification subtasks
    pub identify: PollBudget,
    /// Parent wait for commissioning subtasks
    pub configure_hardware: PollBudget,
    /// Parent wait for networking subtasks
    pub apply_networking: PollBudget,
    /// Worker-side machine status poll during commissioning
    pub commission_poll: PollBudget,
    /// Parent wait for the network template subtask
    pub template_wait: PollBudget,
}

impl NodeDriverBudgets {
    /// Budgets derived from driver configuration: identification gets 3
    /// ticks, commissioning 20, networking 2.
    pub fn from_config(config: &MetalDriverConfig) -> Self {
        let tick = std::time::Duration::from_secs(config.poll_interval_secs);
        let template_attempts = config
            .network_template_timeout_secs
            .div_ceil(TEMPLATE_POLL_INTERVAL_SECS);
        Self {
            identify: PollBudget::new(3, tick),
            configure_hardware: PollBudget::new(20, tick),
            apply_networking: PollBudget::new(2, tick),
            commission_poll: PollBudget::new(20, tick),
            template_wait: PollBudget::new(
                u32::try_from(template_attempts).unwrap_or(u32::MAX),
                std::time::Duration::from_secs(TEMPLATE_POLL_INTERVAL_SECS),
            ),
        }
    }
}

/// Driver for the machine provisioning service family of actions.
pub struct NodeDriver {
    store: Arc<dyn TaskStore>,
    resolver: Arc<dyn DesignResolver>,
    clock: Arc<dyn Clock>,
    config: MetalDriverConfig,
    budgets: NodeDriverBudgets,
}

impl NodeDriver {
    pub fn new(
        store: Arc<dyn TaskStore>,
        resolver: Arc<dyn DesignResolver>,
        clock: Arc<dyn Clock>,
        config: MetalDriverConfig,
    ) -> Self {
        let budgets = NodeDriverBudgets::from_config(&config);
        Self {
            store,
            resolver,
            clock,
            config,
            budgets,
        }
    }

    /// Override the polling budgets. Intended for tests and embedders
    /// with unusual timing requirements.
    pub fn with_budgets(mut self, budgets: NodeDriverBudgets) -> Self {
        self.budgets = budgets;
        self
    }

    /// Whether this driver handles the action.
    pub fn supports(action: OrchestratorAction) -> bool {
        matches!(
            action,
            OrchestratorAction::ValidateNodeServices
                | OrchestratorAction::CreateNetworkTemplate
                | OrchestratorAction::IdentifyNode
                | OrchestratorAction::ConfigureHardware
                | OrchestratorAction::ApplyNodeNetworking
        )
    }

    /// Execute one task to completion, publishing the outcome through the
    /// task store. Only usage errors (bad task, unsupported action,
    /// unresolvable design) surface as `Err`.
    pub async fn execute_task(&self, task_id: Uuid, cancel: CancellationToken) -> DriverResult<()> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| DriverError::usage(format!("invalid task {task_id}")))?;

        if !Self::supports(task.action) {
            return Err(DriverError::usage(format!(
                "node driver does not support action {}",
                task.action.as_str()
            )));
        }

        if task.action == OrchestratorAction::ValidateNodeServices {
            return self.validate_services(&task).await;
        }

        if task.design_ref.is_empty() {
            return Err(DriverError::usage(format!(
                "no design reference in task {task_id}"
            )));
        }
        if task.site_name.is_empty() {
            return Err(DriverError::usage(format!("no site in task {task_id}")));
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

        match task.action {
            OrchestratorAction::CreateNetworkTemplate => {
                self.run_network_template(&task, design, &cancel).await
            }
            OrchestratorAction::IdentifyNode => {
                self.run_fanout(&task, design, self.budgets.identify, &cancel)
                    .await
            }
            OrchestratorAction::ConfigureHardware => {
                self.run_fanout(&task, design, self.budgets.configure_hardware, &cancel)
                    .await
            }
            OrchestratorAction::ApplyNodeNetworking => {
                self.run_fanout(&task, design, self.budgets.apply_networking, &cancel)
                    .await
            }
            _ => unreachable!("routing covered by supports()"),
        }
    }

    /// Single-shot probe of the provisioning service: connectivity first,
    /// then authentication. Connectivity failures are retryable; rejected
    /// credentials are not.
    async fn validate_services(&self, task: &Task) -> DriverResult<()> {
        self.store
            .task_field_update(
                task.id,
                TaskFieldUpdate::default().status(TaskStatus::Running),
            )
            .await?;

        let outcome = match self.probe_services().await {
            Ok(()) => (ActionResult::Success, ResultDetail::default()),
            Err(err) => {
                warn!(error = %err, "service validation failed");
                let mut detail = ResultDetail::default();
                detail.message(err.to_string());
                detail.retry = Some(err.is_transient());
                (ActionResult::Failure, detail)
            }
        };

        self.store
            .task_field_update(task.id, TaskFieldUpdate::complete(outcome.0, outcome.1))
            .await?;
        Ok(())
    }

    async fn probe_services(&self) -> DriverResult<()> {
        let client = MetalClient::new(&self.config)?;
        client.test_connectivity().await?;
        client.test_authentication().await?;
        Ok(())
    }

    /// One site-scoped subtask converging the network template, waited on
    /// with its own timeout.
    async fn run_network_template(
        &self,
        task: &Task,
        design: Arc<SiteDesign>,
        cancel: &CancellationToken,
    ) -> DriverResult<()> {
        let client = MetalClient::new(&self.config)?;
        let subtask = Task::new(task.action, task.design_ref.clone(), task.site_name.clone())
            .with_parent(task.id)
            .with_scope(TaskScope {
                site: task.site_name.clone(),
                ..TaskScope::default()
            });
        self.store.create_task(&subtask).await?;
        info!(subtask = %subtask.id, "starting worker to create network template");

        let store = Arc::clone(&self.store);
        let child_cancel = cancel.child_token();
        let subtask_id = subtask.id;
        tokio::spawn(async move {
            run_action(store, subtask_id, child_cancel, move || async move {
                create_network_template(&design, &client).await
            })
            .await;
        });

        let children = wait_for_subtasks(
            self.store.as_ref(),
            self.clock.as_ref(),
            task.id,
            self.budgets.template_wait,
        )
        .await?;

        let update = match children.iter().find(|c| c.id == subtask_id) {
            Some(subtask) if subtask.is_terminal() => {
                info!(subtask = %subtask.id, result = subtask.result.as_str(), "worker completed");
                TaskFieldUpdate::complete(subtask.result, subtask.result_detail.clone())
            }
            _ => {
                warn!(subtask = %subtask_id, "network template worker timed out");
                let mut detail = ResultDetail::default();
                detail.message("network template creation timed-out");
                detail.retry = Some(false);
                TaskFieldUpdate::complete(ActionResult::Failure, detail)
            }
        };
        self.store.task_field_update(task.id, update).await?;
        Ok(())
    }

    /// Fan the task out into one subtask per node, each on its own
    /// worker, then poll on the coarse tick until the budget expires.
    async fn run_fanout(
        &self,
        task: &Task,
        design: Arc<SiteDesign>,
        budget: PollBudget,
        cancel: &CancellationToken,
    ) -> DriverResult<()> {
        let client = MetalClient::new(&self.config)?;

        for node in &task.node_list {
            let subtask = Task::new(task.action, task.design_ref.clone(), task.site_name.clone())
                .with_parent(task.id)
                .with_nodes(vec![node.clone()]);
            self.store.create_task(&subtask).await?;
            info!(
                subtask = %subtask.id,
                node = %node,
                action = task.action.as_str(),
                "starting worker"
            );

            let store = Arc::clone(&self.store);
            let clock = Arc::clone(&self.clock);
            let design = Arc::clone(&design);
            let client = client.clone();
            let child_cancel = cancel.child_token();
            let commission_budget = self.budgets.commission_poll;
            let action = task.action;
            tokio::spawn(async move {
                let subtask_id = subtask.id;
                run_action(store, subtask_id, child_cancel, move || async move {
                    match action {
                        OrchestratorAction::IdentifyNode => {
                            identify_node(&subtask, &design, &client).await
                        }
                        OrchestratorAction::ConfigureHardware => {
                            configure_hardware(&subtask, &design, &client, clock, commission_budget)
                                .await
                        }
                        OrchestratorAction::ApplyNodeNetworking => {
                            apply_node_networking(&subtask, &design, &client).await
                        }
                        other => Err(DriverError::usage(format!(
                            "no worker runner for action {}",
                            other.as_str()
                        ))),
                    }
                })
                .await;
            });
        }

        let children =
            wait_for_subtasks(self.store.as_ref(), self.clock.as_ref(), task.id, budget).await?;
        let outcomes: Vec<ChildOutcome> = children.iter().map(ChildOutcome::from_task).collect();
        let (result, detail) = aggregate(&outcomes);
        self.store
            .task_field_update(task.id, TaskFieldUpdate::complete(result, detail))
            .await?;
        Ok(())
    }
}
