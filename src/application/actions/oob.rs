//! Out-of-band controller actions.
//!
//! Each action works a subtask's nodes through their management
//! controllers. Power transitions are verified by polling the reported
//! power state on a clock-driven budget; non-convergence is a retryable
//! failure, since controllers routinely lag their chassis.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::ActionOutcome;
use crate::adapters::bmc::{BmcClient, BootTarget, PowerState, ResetKind};
use crate::application::PollBudget;
use crate::domain::error::{DriverError, DriverResult};
use crate::domain::models::design::BaremetalNode;
use crate::domain::models::{BmcDriverConfig, ResultDetail, SiteDesign, Task};
use crate::domain::ports::Clock;

/// Everything an OOB runner needs besides its subtask.
#[derive(Clone)]
pub struct OobContext {
    pub config: BmcDriverConfig,
    pub clock: Arc<dyn Clock>,
}

impl OobContext {
    fn power_budget(&self) -> PollBudget {
        PollBudget::new(
            self.config.power_state_change_max_retries,
            std::time::Duration::from_secs(self.config.power_state_change_retry_interval_secs),
        )
    }
}

/// What one OOB action does to a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OobOp {
    Validate,
    ConfigPxe,
    SetBoot,
    PowerOff,
    PowerOn,
    PowerCycle,
    Interrogate,
}

/// Run one OOB operation across the subtask's nodes.
pub async fn run_oob_op(
    op: OobOp,
    task: &Task,
    design: &SiteDesign,
    ctx: &OobContext,
) -> DriverResult<ActionOutcome> {
    let mut detail = ResultDetail::default();
    let mut worked = false;
    let mut failed = false;

    for node_name in &task.node_list {
        let Some(node) = design.get_baremetal_node(node_name) else {
            failed = true;
            detail.message(format!("node {node_name} is not in the design"));
            detail.node_failed(node_name);
            continue;
        };

        match apply_to_node(op, node, ctx, &mut detail).await {
            Ok(()) => {
                worked = true;
                detail.node_succeeded(node_name);
            }
            Err(err) => {
                warn!(node = %node_name, error = %err, "controller operation failed");
                failed = true;
                detail.message(format!("node {node_name}: {err}"));
                detail.node_failed(node_name);
                if detail.retry.is_none() {
                    detail.retry = Some(err.is_transient());
                }
            }
        }
    }

    Ok(ActionOutcome::from_flags(worked, failed, detail))
}

async fn apply_to_node(
    op: OobOp,
    node: &BaremetalNode,
    ctx: &OobContext,
    detail: &mut ResultDetail,
) -> DriverResult<()> {
    let client = BmcClient::for_node(node, &ctx.config)?;

    match op {
        OobOp::Validate => {
            client.test_connectivity().await?;
            client.test_authentication().await?;
            detail.message(format!("controller for node {} validated", node.name));
        }
        OobOp::SetBoot => {
            client.set_boot_override(BootTarget::Pxe, true).await?;
            let target = client.boot_override().await?;
            if target.as_deref() != Some("Pxe") {
                return Err(DriverError::transient(format!(
                    "boot override did not take on node {}",
                    node.name
                )));
            }
            info!(node = %node.name, "one-shot PXE boot set");
            detail.message(format!("node {} set to boot PXE once", node.name));
        }
        OobOp::ConfigPxe => {
            client.set_boot_override(BootTarget::Pxe, true).await?;
            client.reset(ResetKind::ForceRestart).await?;
            converge_power(&client, node, PowerState::On, ctx).await?;
            detail.message(format!("node {} restarted to PXE", node.name));
        }
        OobOp::PowerOff => {
            if client.power_state().await? == PowerState::Off {
                debug!(node = %node.name, "already powered off");
            } else {
                client.reset(ResetKind::ForceOff).await?;
                converge_power(&client, node, PowerState::Off, ctx).await?;
            }
            detail.message(format!("node {} powered off", node.name));
        }
        OobOp::PowerOn => {
            if client.power_state().await? == PowerState::On {
                debug!(node = %node.name, "already powered on");
            } else {
                client.reset(ResetKind::On).await?;
                converge_power(&client, node, PowerState::On, ctx).await?;
            }
            detail.message(format!("node {} powered on", node.name));
        }
        OobOp::PowerCycle => {
            client.reset(ResetKind::ForceRestart).await?;
            converge_power(&client, node, PowerState::On, ctx).await?;
            detail.message(format!("node {} power cycled", node.name));
        }
        OobOp::Interrogate => {
            let summary = client.interrogate().await?;
            detail.message(format!(
                "node {}: manufacturer={} model={} serial={} power={}",
                node.name,
                summary.manufacturer.as_deref().unwrap_or("unknown"),
                summary.model.as_deref().unwrap_or("unknown"),
                summary.serial_number.as_deref().unwrap_or("unknown"),
                summary.power_state.as_deref().unwrap_or("unknown"),
            ));
        }
    }

    Ok(())
}

/// Poll until the controller reports the target power state.
async fn converge_power(
    client: &BmcClient,
    node: &BaremetalNode,
    target: PowerState,
    ctx: &OobContext,
) -> DriverResult<()> {
    let budget = ctx.power_budget();
    for attempt in 0..budget.max_attempts {
        let state = client.power_state().await?;
        if state == target {
            debug!(node = %node.name, attempt, "power state converged");
            return Ok(());
        }
        ctx.clock.sleep(budget.interval).await;
    }

    Err(DriverError::transient(format!(
        "node {} did not reach power state {target:?} within {} polls",
        node.name, budget.max_attempts
    )))
}
