//! Network interface shadow, scoped to one machine.
//!
//! The server inlines VLAN and subnet representations on reads; both are
//! reduced to scalar id references here so the rest of the driver only
//! ever reasons about ids.

use serde_json::Value;
use tracing::{debug, info};

use super::{opt_str, opt_u64, req_i64, req_str, shape_error, MetalResource, ResourceSet};
use super::{Fabric, Subnet, Vlan};
use crate::adapters::metal::client::MetalClient;
use crate::domain::error::{DriverError, DriverResult};

/// One address linkage between an interface and a subnet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceLink {
    pub id: i64,
    pub mode: String,
    pub subnet_id: Option<i64>,
    pub ip_address: Option<String>,
}

/// Options for linking an interface to a subnet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOptions {
    pub subnet_cidr: String,
    /// Static address, or None for DHCP
    pub ip_address: Option<String>,
    /// Make the subnet gateway the node default gateway
    pub primary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub id: i64,
    pub system_id: String,
    pub name: String,
    pub iface_type: String,
    pub mac_address: Option<String>,
    /// VLAN resource id the interface is attached to
    pub vlan: Option<i64>,
    /// Fabric owning that VLAN
    pub fabric_id: Option<i64>,
    pub effective_mtu: Option<u32>,
    pub links: Vec<InterfaceLink>,
}

impl Interface {
    /// The interfaces scoped to one machine.
    pub fn collection(client: &MetalClient, system_id: &str) -> ResourceSet<Self> {
        ResourceSet::new(client.clone(), format!("nodes/{system_id}/interfaces/"))
    }

    pub fn is_linked(&self, subnet_id: i64) -> bool {
        self.links.iter().any(|l| l.subnet_id == Some(subnet_id))
    }

    /// Re-home this interface onto a fabric by attaching it to the
    /// fabric's untagged VLAN.
    pub async fn attach_fabric(&mut self, client: &MetalClient, fabric: &Fabric) -> DriverResult<()> {
        let mut vlans = Vlan::collection(client, fabric.id);
        vlans.refresh().await?;
        let untagged = vlans.singleton(|v| v.vid == 0).ok_or_else(|| {
            DriverError::persistent(format!("no untagged VLAN on fabric {}", fabric.name))
        })?;

        info!(
            interface = self.id,
            system_id = %self.system_id,
            vlan = untagged.id,
            fabric = fabric.id,
            "attaching interface to fabric"
        );
        self.vlan = Some(untagged.id);
        *self = super::update_resource(client, self).await?;
        Ok(())
    }

    /// Link this interface to a subnet by cidr.
    ///
    /// Idempotent: returns false without touching the server when the
    /// interface is already linked to that subnet.
    pub async fn link_subnet(
        &self,
        client: &MetalClient,
        subnets: &ResourceSet<Subnet>,
        options: &LinkOptions,
    ) -> DriverResult<bool> {
        let subnet = subnets
            .singleton(|s| s.cidr == options.subnet_cidr)
            .ok_or_else(|| {
                DriverError::persistent(format!(
                    "subnet {} not found on the metal service",
                    options.subnet_cidr
                ))
            })?;

        if self.is_linked(subnet.id) {
            info!(
                interface = self.id,
                subnet = subnet.id,
                "interface already linked to subnet, skipping"
            );
            return Ok(false);
        }

        let mode = if options.ip_address.is_some() {
            "static"
        } else {
            "dhcp"
        };
        let mut form = vec![
            ("subnet", subnet.id.to_string()),
            ("mode", mode.to_string()),
            ("default_gateway", options.primary.to_string()),
        ];
        if let Some(ip) = &options.ip_address {
            form.push(("ip_address", ip.clone()));
        }

        debug!(
            interface = self.id,
            subnet = subnet.id,
            mode,
            primary = options.primary,
            "linking interface to subnet"
        );
        client.post(&self.path(), Some("link_subnet"), &form).await?;
        Ok(true)
    }
}

impl MetalResource for Interface {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }

    fn path(&self) -> String {
        format!("nodes/{}/interfaces/{}/", self.system_id, self.id)
    }

    fn from_json(value: &Value) -> DriverResult<Self> {
        // Inline VLAN object carries the owning fabric; reduce both to ids.
        let (vlan, fabric_id) = match value.get("vlan") {
            Some(inline) if inline.is_object() => (
                Some(req_i64(inline, "id")?),
                inline.get("fabric_id").and_then(Value::as_i64),
            ),
            Some(scalar) if scalar.is_i64() => {
                (scalar.as_i64(), value.get("fabric_id").and_then(Value::as_i64))
            }
            _ => (None, None),
        };

        let links = match value.get("links") {
            Some(Value::Array(list)) => list
                .iter()
                .map(|l| {
                    let subnet_id = match l.get("subnet") {
                        Some(inline) if inline.is_object() => Some(req_i64(inline, "id")?),
                        Some(scalar) => scalar.as_i64(),
                        None => None,
                    };
                    Ok(InterfaceLink {
                        id: req_i64(l, "id")?,
                        mode: opt_str(l, "mode").unwrap_or_default(),
                        subnet_id,
                        ip_address: opt_str(l, "ip_address"),
                    })
                })
                .collect::<DriverResult<Vec<_>>>()?,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => return Err(shape_error("interface links is not a list")),
        };

        Ok(Self {
            id: req_i64(value, "id")?,
            system_id: req_str(value, "system_id")?,
            name: req_str(value, "name")?,
            iface_type: opt_str(value, "type").unwrap_or_default(),
            mac_address: opt_str(value, "mac_address"),
            vlan,
            fabric_id,
            effective_mtu: opt_u64(value, "effective_mtu").map(|m| m as u32),
            links,
        })
    }

    fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("name", self.name.clone())];
        if let Some(mac) = &self.mac_address {
            fields.push(("mac_address", mac.clone()));
        }
        if let Some(vlan) = self.vlan {
            fields.push(("vlan", vlan.to_string()));
        }
        fields
    }
}

impl ResourceSet<Interface> {
    /// Create a tagged child interface for a VLAN on a physical parent.
    ///
    /// Idempotent: when an interface already rides the target VLAN it is
    /// returned unchanged without a server call.
    pub async fn create_vlan(
        &mut self,
        vlan_tag: u16,
        parent_name: &str,
        mtu: Option<u32>,
    ) -> DriverResult<Interface> {
        self.refresh().await?;

        let parent = self
            .singleton(|i| i.name == parent_name)
            .cloned()
            .ok_or_else(|| {
                DriverError::persistent(format!("cannot locate parent interface {parent_name}"))
            })?;
        if parent.iface_type != "physical" {
            return Err(DriverError::persistent(format!(
                "cannot create VLAN interface on parent of type {}",
                parent.iface_type
            )));
        }
        let fabric_id = parent.fabric_id.ok_or_else(|| {
            DriverError::persistent(format!(
                "cannot create VLAN interface on disconnected parent {}",
                parent.name
            ))
        })?;

        let mut vlans = Vlan::collection(&self.client, fabric_id);
        vlans.refresh().await?;
        let vlan = vlans.singleton(|v| v.vid == vlan_tag).ok_or_else(|| {
            DriverError::persistent(format!(
                "cannot locate VLAN {vlan_tag} on fabric {fabric_id}"
            ))
        })?;

        if let Some(existing) = self.singleton(|i| i.vlan == Some(vlan.id) && i.id != parent.id) {
            info!(
                vlan_tag,
                system_id = %existing.system_id,
                "interface for VLAN already exists, skipping"
            );
            return Ok(existing.clone());
        }

        let mut form = vec![
            ("vlan", vlan.id.to_string()),
            ("parent", parent.id.to_string()),
        ];
        if let Some(mtu) = mtu {
            form.push(("mtu", mtu.to_string()));
        }

        let body = self
            .client
            .post(&self.collection_path, Some("create_vlan"), &form)
            .await?;
        let created = Interface::from_json(&body)?;
        debug!(
            interface = created.id,
            parent = parent.id,
            vlan = vlan.id,
            "created tagged interface"
        );
        self.items.push(created.clone());
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_rekeys_inline_vlan_and_links() {
        let iface = Interface::from_json(&json!({
            "id": 40, "system_id": "abc123", "name": "eno1",
            "type": "physical", "mac_address": "aa:bb:cc:00:11:22",
            "vlan": {"id": 5, "vid": 0, "fabric_id": 2},
            "effective_mtu": 1500,
            "links": [
                {"id": 90, "mode": "static",
                 "subnet": {"id": 11, "cidr": "10.0.0.0/24"},
                 "ip_address": "10.0.0.10"},
                {"id": 91, "mode": "link_up"}
            ]
        }))
        .unwrap();

        assert_eq!(iface.vlan, Some(5));
        assert_eq!(iface.fabric_id, Some(2));
        assert_eq!(iface.links.len(), 2);
        assert_eq!(iface.links[0].subnet_id, Some(11));
        assert_eq!(iface.links[0].ip_address.as_deref(), Some("10.0.0.10"));
        assert_eq!(iface.links[1].subnet_id, None);
        assert!(iface.is_linked(11));
        assert!(!iface.is_linked(12));
    }

    #[test]
    fn test_from_json_scalar_vlan() {
        let iface = Interface::from_json(&json!({
            "id": 41, "system_id": "abc123", "name": "eno2",
            "type": "physical", "vlan": 6, "fabric_id": 2
        }))
        .unwrap();
        assert_eq!(iface.vlan, Some(6));
        assert_eq!(iface.fabric_id, Some(2));
        assert!(iface.links.is_empty());
    }

    #[test]
    fn test_malformed_links_is_persistent() {
        let err = Interface::from_json(&json!({
            "id": 41, "system_id": "abc123", "name": "eno2",
            "links": "nope"
        }))
        .unwrap_err();
        assert!(err.is_persistent());
    }
}
