//! Network template convergence.
//!
//! Trues up the provisioning service's fabrics, VLANs and subnets with the
//! designed `network_links x networks`. The whole pass is idempotent:
//! re-running against converged state only re-asserts attributes.

use tracing::{debug, info, warn};

use super::ActionOutcome;
use crate::adapters::metal::models::{
    update_resource, Fabric, RackController, ResourceSet, Subnet, Vlan,
};
use crate::adapters::metal::MetalClient;
use crate::domain::error::{DriverError, DriverResult};
use crate::domain::models::design::RangeKind;
use crate::domain::models::{ActionResult, Network, NetworkLink, ResultDetail, SiteDesign};

/// Converge remote network state with the design.
pub async fn create_network_template(
    design: &SiteDesign,
    client: &MetalClient,
) -> DriverResult<ActionOutcome> {
    let mut fabrics = Fabric::collection(client);
    fabrics.refresh().await?;
    let mut subnets = Subnet::collection(client);
    subnets.refresh().await?;

    let mut detail = ResultDetail::default();

    for link in &design.network_links {
        let Some(link_fabric) =
            reconcile_link_fabric(design, client, &mut fabrics, &subnets, link).await?
        else {
            detail.message(format!(
                "link {} matches multiple discovered fabrics, skipped",
                link.name
            ));
            continue;
        };

        for net_name in &link.allowed_networks {
            let Some(network) = design.get_network(net_name) else {
                warn!(network = %net_name, link = %link.name, "network allowed on link but not defined");
                continue;
            };

            converge_network(client, &link_fabric, network, &mut subnets, &mut detail).await?;
        }
    }

    // Final accounting against a fresh snapshot. A cidr present under the
    // wrong name is only partially converged; a missing cidr is not
    // converged at all.
    let mut final_subnets = Subnet::collection(client);
    final_subnets.refresh().await?;

    let mut converged = 0usize;
    let mut present = 0usize;
    for network in &design.networks {
        match final_subnets.singleton(|s| s.cidr == network.cidr) {
            Some(subnet) if subnet.name == network.name => {
                present += 1;
                converged += 1;
            }
            Some(subnet) => {
                present += 1;
                detail.message(format!(
                    "cidr {} present but named {} instead of {}",
                    network.cidr, subnet.name, network.name
                ));
            }
            None => {
                detail.message(format!("network {} has no subnet remotely", network.name));
            }
        }
    }

    let result = if converged == design.networks.len() {
        ActionResult::Success
    } else if present == 0 {
        ActionResult::Failure
    } else {
        ActionResult::PartialSuccess
    };

    Ok(ActionOutcome::new(result, detail))
}

/// Work out which fabric carries a link, reconciling against what the
/// service has self-discovered.
///
/// All discovered subnets matching the link's allowed networks must agree
/// on one fabric; disagreement is unreconcilable and skips the link
/// (returns None). A single discovered fabric is renamed to the link; no
/// discovery means lookup by name, creating on absence.
async fn reconcile_link_fabric(
    design: &SiteDesign,
    client: &MetalClient,
    fabrics: &mut ResourceSet<Fabric>,
    subnets: &ResourceSet<Subnet>,
    link: &NetworkLink,
) -> DriverResult<Option<Fabric>> {
    let mut fabrics_found: Vec<i64> = Vec::new();
    for net_name in &link.allowed_networks {
        let Some(network) = design.get_network(net_name) else {
            continue;
        };
        if let Some(subnet) = subnets.singleton(|s| s.cidr == network.cidr) {
            if !fabrics_found.contains(&subnet.fabric) {
                fabrics_found.push(subnet.fabric);
            }
        }
    }

    match fabrics_found.as_slice() {
        [_, _, ..] => {
            warn!(
                link = %link.name,
                "self-discovered networking is incompatible with this link"
            );
            Ok(None)
        }
        [fabric_id] => {
            let mut fabric = fabrics
                .select(fabric_id)
                .cloned()
                .ok_or_else(|| {
                    DriverError::persistent(format!(
                        "inconsistent data from the metal service: subnet references unknown fabric {fabric_id}"
                    ))
                })?;
            if fabric.name != link.name {
                fabric.name = link.name.clone();
                fabric = update_resource(client, &fabric).await?;
                info!(fabric = fabric.id, link = %link.name, "renamed discovered fabric to link");
            }
            Ok(Some(fabric))
        }
        [] => match fabrics.singleton(|f| f.name == link.name).cloned() {
            Some(fabric) => Ok(Some(fabric)),
            None => {
                let created = fabrics.add(Fabric::named(link.name.clone())).await?;
                info!(fabric = created.id, link = %link.name, "created fabric for link");
                Ok(Some(created))
            }
        },
    }
}

/// Converge one network's subnet and VLAN, then its address ranges and
/// DHCP service.
async fn converge_network(
    client: &MetalClient,
    link_fabric: &Fabric,
    network: &Network,
    subnets: &mut ResourceSet<Subnet>,
    detail: &mut ResultDetail,
) -> DriverResult<()> {
    let subnet = match subnets.singleton(|s| s.cidr == network.cidr).cloned() {
        Some(mut subnet) => {
            // True up subnet attributes, then the VLAN behind it
            subnet.name = network.name.clone();
            subnet.dns_servers = network.dns_servers.clone();
            subnet.gateway_ip = network.default_gateway().map(ToString::to_string);

            let mut vlans = Vlan::collection(client, subnet.fabric);
            vlans.refresh().await?;
            let Some(mut vlan) = vlans.select(&subnet.vlan).cloned() else {
                warn!(subnet = subnet.id, "subnet has no matching VLAN");
                detail.message(format!(
                    "subnet {} for network {} has no matching VLAN",
                    subnet.id, network.name
                ));
                return Ok(());
            };
            vlan.name = network.name.clone();
            vlan.vid = network.vlan_id.unwrap_or(0);
            if network.mtu.is_some() {
                vlan.mtu = network.mtu;
            }
            update_resource(client, &vlan).await?;

            let subnet = update_resource(client, &subnet).await?;
            detail.message(format!(
                "subnet {} exists for network {}, attributes trued up",
                subnet.id, network.name
            ));
            subnet
        }
        None => {
            info!(network = %network.name, "subnet not found, creating");
            let mut vlans = Vlan::collection(client, link_fabric.id);
            vlans.refresh().await?;

            let vid = network.vlan_id.unwrap_or(0);
            let vlan = match vlans.singleton(|v| v.vid == vid).cloned() {
                Some(mut vlan) => {
                    vlan.name = network.name.clone();
                    if network.mtu.is_some() {
                        vlan.mtu = network.mtu;
                    }
                    let vlan = update_resource(client, &vlan).await?;
                    detail.message(format!(
                        "VLAN {} exists for network {}, attributes trued up",
                        vlan.id, network.name
                    ));
                    vlan
                }
                None => {
                    let created = vlans
                        .add(Vlan::new(link_fabric.id, vid, network.name.clone(), network.mtu))
                        .await?;
                    detail.message(format!(
                        "VLAN {} created for network {}",
                        created.id, network.name
                    ));
                    created
                }
            };

            let created = subnets
                .add(Subnet::from_network(network, link_fabric.id, vlan.id))
                .await?;
            info!(
                subnet = created.id,
                cidr = %created.cidr,
                vlan = created.vlan,
                "created subnet"
            );
            detail.message(format!(
                "subnet {} created for network {}",
                created.id, network.name
            ));
            created
        }
    };

    let mut dhcp_needed = false;
    for range in &network.ranges {
        subnet.add_address_range(client, range).await?;
        if range.kind == RangeKind::Dhcp {
            dhcp_needed = true;
        }
    }

    if dhcp_needed {
        enable_dhcp(client, &subnet, detail).await?;
    }

    Ok(())
}

/// Turn DHCP service on for a subnet's VLAN, if it is not already.
///
/// Known limitation: with more than one rack controller the first in
/// server order becomes the primary; multi-rack placement is not modeled.
async fn enable_dhcp(
    client: &MetalClient,
    subnet: &Subnet,
    detail: &mut ResultDetail,
) -> DriverResult<()> {
    let mut vlans = Vlan::collection(client, subnet.fabric);
    vlans.refresh().await?;
    let Some(vlan) = vlans.select(&subnet.vlan).cloned() else {
        detail.message(format!(
            "cannot enable DHCP, subnet {} has no matching VLAN",
            subnet.id
        ));
        return Ok(());
    };

    if vlan.dhcp_on {
        debug!(subnet = subnet.id, "DHCP already enabled");
        return Ok(());
    }
    info!(subnet = %subnet.name, "DHCP required, activating");

    let mut racks = RackController::collection(client);
    racks.refresh().await?;
    if racks.len() > 1 {
        warn!("more than one rack controller reported, defaulting to the first");
    }
    let Some(rack) = racks.iter().next().cloned() else {
        detail.message(format!(
            "cannot enable DHCP for subnet {}, no rack controllers available",
            subnet.id
        ));
        return Ok(());
    };

    let mut vlan = vlan;
    vlan.dhcp_on = true;
    vlan.primary_rack = Some(rack.system_id.clone());
    update_resource(client, &vlan).await?;
    debug!(
        vlan = vlan.id,
        rack = %rack.system_id,
        "enabled DHCP on VLAN"
    );
    detail.message(format!(
        "DHCP enabled on VLAN {} via rack controller {}",
        vlan.id, rack.system_id
    ));
    Ok(())
}
