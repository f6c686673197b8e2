//! Node identification.
//!
//! Matches each designed node against the machines the provisioning
//! service already knows about, renaming matches to the design hostname.

use tracing::{info, warn};

use super::ActionOutcome;
use crate::adapters::metal::models::Machine;
use crate::adapters::metal::MetalClient;
use crate::domain::error::{DriverError, DriverResult};
use crate::domain::models::{ResultDetail, SiteDesign, Task};

/// Locate the machines backing the subtask's nodes.
pub async fn identify_node(
    task: &Task,
    design: &SiteDesign,
    client: &MetalClient,
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

        match machines.identify_baremetal_node(node).cloned() {
            Some(mut machine) => {
                if machine.hostname != node.name {
                    if let Err(e) = machine.set_hostname(client, &node.name).await {
                        warn!(node = %node.name, error = %e, "failed to rename machine");
                    }
                }
                info!(node = %node.name, system_id = %machine.system_id, "node identified");
                worked = true;
                detail.message(format!("node {node_name} identified as {}", machine.system_id));
                detail.node_succeeded(node_name);
            }
            None => {
                failed = true;
                detail.message(format!("node {node_name} not found on the metal service"));
                detail.node_failed(node_name);
            }
        }
    }

    Ok(ActionOutcome::from_flags(worked, failed, detail))
}
