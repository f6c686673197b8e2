//! Hardware commissioning.
//!
//! Starts vendor discovery on machines that need it and polls until they
//! reach `Ready`, on a clock-driven budget.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::ActionOutcome;
use crate::adapters::metal::models::{refresh_resource, Machine, MachineStatus};
use crate::adapters::metal::MetalClient;
use crate::application::PollBudget;
use crate::domain::error::{DriverError, DriverResult};
use crate::domain::models::{ResultDetail, SiteDesign, Task};
use crate::domain::ports::Clock;

/// Commission the subtask's nodes.
pub async fn configure_hardware(
    task: &Task,
    design: &SiteDesign,
    client: &MetalClient,
    clock: Arc<dyn Clock>,
    budget: PollBudget,
) -> DriverResult<ActionOutcome> {
    let mut machines = Machine::collection(client);
    machines
        .refresh()
        .await
        .map_err(|e| DriverError::transient(format!("error accessing the machines API: {e}")))?;

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

        debug!(node = %node_name, "locating node for commissioning");
        let Some(machine) = machines.identify_baremetal_node(node).cloned() else {
            warn!(node = %node_name, "node not found on the metal service");
            failed = true;
            detail.message(format!("node {node_name} not found on the metal service"));
            detail.node_failed(node_name);
            continue;
        };

        match &machine.status {
            status if status.commissionable() => {
                debug!(node = %node_name, "starting commissioning");
                machine.commission(client).await?;

                match poll_until_ready(client, machine.clone(), clock.as_ref(), budget).await {
                    Some(ready) => {
                        info!(node = %node_name, system_id = %ready.system_id, "node commissioned");
                        worked = true;
                        detail.message(format!("node {node_name} commissioned"));
                        detail.node_succeeded(node_name);
                    }
                    None => {
                        failed = true;
                        detail.message(format!(
                            "node {node_name} did not reach Ready within the commissioning budget"
                        ));
                        detail.node_failed(node_name);
                    }
                }
            }
            MachineStatus::Commissioning => {
                info!(node = %node_name, "node already being commissioned, skipping");
                worked = true;
                detail.message(format!("node {node_name} already being commissioned"));
                detail.node_succeeded(node_name);
            }
            MachineStatus::Ready => {
                info!(node = %node_name, "node already commissioned, skipping");
                worked = true;
                detail.message(format!("node {node_name} already commissioned"));
                detail.node_succeeded(node_name);
            }
            other => {
                warn!(node = %node_name, status = %other.as_str(), "unknown status, skipping");
                failed = true;
                detail.message(format!(
                    "node {node_name} has unknown status {}",
                    other.as_str()
                ));
                detail.node_failed(node_name);
            }
        }
    }

    Ok(ActionOutcome::from_flags(worked, failed, detail))
}

/// Poll a machine until it reports `Ready`, within the budget. Transient
/// refresh faults are tolerated; the poll simply runs again next tick.
async fn poll_until_ready(
    client: &MetalClient,
    mut machine: Machine,
    clock: &dyn Clock,
    budget: PollBudget,
) -> Option<Machine> {
    let mut attempts = 0;
    while machine.status != MachineStatus::Ready && attempts < budget.max_attempts {
        attempts += 1;
        clock.sleep(budget.interval).await;
        match refresh_resource(client, &machine).await {
            Ok(fresh) => {
                debug!(
                    system_id = %fresh.system_id,
                    attempt = attempts,
                    status = %fresh.status.as_str(),
                    "polling commissioning status"
                );
                machine = fresh;
            }
            Err(err) if err.is_transient() => {
                warn!(
                    system_id = %machine.system_id,
                    error = %err,
                    "error refreshing status during commissioning, will re-attempt"
                );
            }
            Err(err) => {
                warn!(system_id = %machine.system_id, error = %err, "giving up commissioning poll");
                return None;
            }
        }
    }

    (machine.status == MachineStatus::Ready).then_some(machine)
}
