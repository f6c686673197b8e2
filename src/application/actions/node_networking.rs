//! Node network configuration.
//!
//! Attaches machine interfaces to their designed fabrics, materializes
//! tagged VLAN interfaces, and links interfaces to subnets. Any failure
//! fails the whole action: a partially networked node is not bootable.

use tracing::{debug, error, info, warn};

use super::ActionOutcome;
use crate::adapters::metal::models::{
    Fabric, Interface, LinkOptions, Machine, MachineStatus, ResourceSet, Subnet,
};
use crate::adapters::metal::MetalClient;
use crate::domain::error::{DriverError, DriverResult};
use crate::domain::models::design::BaremetalNode;
use crate::domain::models::{ActionResult, ResultDetail, SiteDesign, Task};

/// Apply designed networking to the subtask's nodes.
pub async fn apply_node_networking(
    task: &Task,
    design: &SiteDesign,
    client: &MetalClient,
) -> DriverResult<ActionOutcome> {
    let mut machines = Machine::collection(client);
    let mut fabrics = Fabric::collection(client);
    let mut subnets = Subnet::collection(client);
    machines.refresh().await.map_err(api_error)?;
    fabrics.refresh().await.map_err(api_error)?;
    subnets.refresh().await.map_err(api_error)?;

    let mut detail = ResultDetail::default();
    let mut failed = false;

    for node_name in &task.node_list {
        let Some(node) = design.get_baremetal_node(node_name) else {
            failed = true;
            detail.message(format!("node {node_name} is not in the design"));
            detail.node_failed(node_name);
            continue;
        };

        debug!(node = %node_name, "locating node for network configuration");
        let Some(machine) = machines.identify_baremetal_node(node).cloned() else {
            warn!(node = %node_name, "node not found on the metal service");
            failed = true;
            detail.message(format!("node {node_name} not found on the metal service"));
            detail.node_failed(node_name);
            continue;
        };

        match &machine.status {
            MachineStatus::Ready => {
                let node_ok =
                    configure_node(client, design, node, &machine, &fabrics, &subnets, &mut detail)
                        .await;
                if node_ok {
                    detail.node_succeeded(node_name);
                } else {
                    failed = true;
                    detail.node_failed(node_name);
                }
            }
            MachineStatus::Broken => {
                info!(node = %node_name, "node is Broken, commission hardware before networking");
                failed = true;
                detail.message(format!(
                    "node {node_name} is Broken, configure hardware before networking"
                ));
                detail.node_failed(node_name);
            }
            other => {
                warn!(node = %node_name, status = %other.as_str(), "unexpected status, skipping");
                failed = true;
                detail.message(format!(
                    "node {node_name} has unexpected status {}",
                    other.as_str()
                ));
                detail.node_failed(node_name);
            }
        }
    }

    let result = if failed {
        ActionResult::Failure
    } else {
        ActionResult::Success
    };
    Ok(ActionOutcome::new(result, detail))
}

fn api_error(err: DriverError) -> DriverError {
    DriverError::transient(format!("error accessing the metal API: {err}"))
}

/// Configure every designed interface of one node. Returns false when any
/// part of the node's networking could not be applied.
async fn configure_node(
    client: &MetalClient,
    design: &SiteDesign,
    node: &BaremetalNode,
    machine: &Machine,
    fabrics: &ResourceSet<Fabric>,
    subnets: &ResourceSet<Subnet>,
    detail: &mut ResultDetail,
) -> bool {
    let mut node_ok = true;

    let mut machine_ifaces = Interface::collection(client, &machine.system_id);
    if let Err(e) = machine_ifaces.refresh().await {
        detail.message(format!(
            "cannot list interfaces of node {}: {e}",
            node.name
        ));
        return false;
    }

    for designed in &node.interfaces {
        let Some(link) = design.get_network_link(&designed.network_link) else {
            error!(link = %designed.network_link, "interface references undefined link");
            detail.message(format!(
                "interface {} references undefined link {}",
                designed.device_name, designed.network_link
            ));
            node_ok = false;
            continue;
        };
        let Some(fabric) = fabrics.singleton(|f| f.name == link.name).cloned() else {
            error!(link = %link.name, "no fabric found for link");
            detail.message(format!("no fabric found for link {}", link.name));
            node_ok = false;
            continue;
        };

        // A physical interface the service has not discovered is a
        // warning, not a failure; commissioning may still surface it.
        let Some(mut iface) = machine_ifaces
            .singleton(|i| i.name == designed.device_name)
            .cloned()
        else {
            warn!(
                interface = %designed.device_name,
                system_id = %machine.system_id,
                "interface not found on machine, skipping configuration"
            );
            continue;
        };

        if iface.fabric_id == Some(fabric.id) {
            debug!(interface = %designed.device_name, fabric = fabric.id, "already attached to fabric");
        } else if let Err(e) = iface.attach_fabric(client, &fabric).await {
            detail.message(format!(
                "cannot attach interface {} to fabric {}: {e}",
                designed.device_name, fabric.name
            ));
            node_ok = false;
            continue;
        }

        for net_name in &designed.networks {
            let Some(network) = design.get_network(net_name) else {
                error!(network = %net_name, "interface attached to undefined network");
                detail.message(format!(
                    "network {net_name} is not defined, cannot attach interface {}",
                    designed.device_name
                ));
                node_ok = false;
                continue;
            };

            // The native network rides the physical interface untagged;
            // everything else gets a tagged child interface.
            let link_iface = if link.native_network.as_deref() == Some(net_name.as_str()) {
                debug!(
                    interface = %designed.device_name,
                    network = %net_name,
                    "linking untagged on native network"
                );
                iface.clone()
            } else {
                match machine_ifaces
                    .create_vlan(network.vlan_id.unwrap_or(0), &iface.name, network.mtu)
                    .await
                {
                    Ok(tagged) => tagged,
                    Err(e) => {
                        detail.message(format!(
                            "cannot create tagged interface for network {net_name}: {e}"
                        ));
                        node_ok = false;
                        continue;
                    }
                }
            };

            let Some(address) = node.address_for(net_name) else {
                error!(
                    network = %net_name,
                    node = %node.name,
                    "no address assigned to network, cannot link"
                );
                detail.message(format!(
                    "no address assigned to network {net_name} for node {}, cannot link",
                    node.name
                ));
                node_ok = false;
                continue;
            };

            let options = LinkOptions {
                subnet_cidr: network.cidr.clone(),
                ip_address: (!address.is_dhcp()).then(|| address.address.clone()),
                primary: node.primary_network.as_deref() == Some(net_name.as_str()),
            };
            match link_iface.link_subnet(client, subnets, &options).await {
                Ok(_linked) => {
                    debug!(
                        interface = link_iface.id,
                        cidr = %network.cidr,
                        "interface linked to subnet"
                    );
                }
                Err(e) => {
                    detail.message(format!(
                        "cannot link interface {} to subnet {}: {e}",
                        designed.device_name, network.cidr
                    ));
                    node_ok = false;
                }
            }
        }
    }

    node_ok
}
