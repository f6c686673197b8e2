//! Machine shadow: a managed bare-metal host and its lifecycle status.

use serde_json::Value;
use tracing::debug;

use super::{opt_str, req_str, MetalResource, ResourceSet};
use crate::adapters::metal::client::MetalClient;
use crate::domain::error::DriverResult;
use crate::domain::models::design::BaremetalNode;

/// Machine lifecycle as reported by the provisioning service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineStatus {
    New,
    Commissioning,
    Ready,
    Broken,
    Deploying,
    Deployed,
    Other(String),
}

impl MachineStatus {
    pub fn from_name(name: &str) -> Self {
        match name {
            "New" => Self::New,
            "Commissioning" => Self::Commissioning,
            "Ready" => Self::Ready,
            "Broken" => Self::Broken,
            "Deploying" => Self::Deploying,
            "Deployed" => Self::Deployed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::New => "New",
            Self::Commissioning => "Commissioning",
            Self::Ready => "Ready",
            Self::Broken => "Broken",
            Self::Deploying => "Deploying",
            Self::Deployed => "Deployed",
            Self::Other(name) => name,
        }
    }

    /// Statuses from which commissioning may be started.
    pub fn commissionable(&self) -> bool {
        matches!(self, Self::New | Self::Broken)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    pub system_id: String,
    pub hostname: String,
    pub status: MachineStatus,
    /// MAC of the interface the machine boots from
    pub boot_mac: Option<String>,
    /// MACs of every known interface
    pub macs: Vec<String>,
}

impl Machine {
    pub fn collection(client: &MetalClient) -> ResourceSet<Self> {
        ResourceSet::new(client.clone(), "machines/")
    }

    pub fn has_mac(&self, mac: &str) -> bool {
        self.macs.iter().any(|m| m.eq_ignore_ascii_case(mac))
            || self
                .boot_mac
                .as_deref()
                .is_some_and(|m| m.eq_ignore_ascii_case(mac))
    }

    /// Start vendor hardware discovery on this machine.
    pub async fn commission(&self, client: &MetalClient) -> DriverResult<()> {
        client.post(&self.path(), Some("commission"), &[]).await?;
        Ok(())
    }

    /// Rename the machine server-side to match the design hostname.
    pub async fn set_hostname(&mut self, client: &MetalClient, hostname: &str) -> DriverResult<()> {
        self.hostname = hostname.to_string();
        *self = super::update_resource(client, self).await?;
        Ok(())
    }
}

impl MetalResource for Machine {
    type Key = String;

    fn key(&self) -> String {
        self.system_id.clone()
    }

    fn path(&self) -> String {
        format!("machines/{}/", self.system_id)
    }

    fn from_json(value: &Value) -> DriverResult<Self> {
        let boot_mac = value
            .get("boot_interface")
            .and_then(|iface| iface.get("mac_address"))
            .and_then(Value::as_str)
            .map(ToString::to_string);

        let macs = value
            .get("interface_set")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|iface| iface.get("mac_address"))
                    .filter_map(Value::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            system_id: req_str(value, "system_id")?,
            hostname: opt_str(value, "hostname").unwrap_or_default(),
            status: MachineStatus::from_name(&opt_str(value, "status_name").unwrap_or_default()),
            boot_mac,
            macs,
        })
    }

    fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![("hostname", self.hostname.clone())]
    }
}

impl ResourceSet<Machine> {
    /// Locate the machine backing a designed node.
    ///
    /// Matching order: management controller MAC, then boot MAC, then
    /// hostname. The first matcher with data wins; later matchers are only
    /// consulted when the earlier ones have nothing to match on.
    pub fn identify_baremetal_node(&self, node: &BaremetalNode) -> Option<&Machine> {
        if let Some(mac) = node.oob.mac.as_deref() {
            if let Some(machine) = self.singleton(|m| m.has_mac(mac)) {
                debug!(node = %node.name, mac, "node identified by management MAC");
                return Some(machine);
            }
        }
        if let Some(mac) = node.boot_mac.as_deref() {
            if let Some(machine) = self.singleton(|m| m.has_mac(mac)) {
                debug!(node = %node.name, mac, "node identified by boot MAC");
                return Some(machine);
            }
        }
        self.singleton(|m| m.hostname == node.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::design::OobEndpoint;
    use serde_json::json;

    fn machine_json(system_id: &str, hostname: &str, status: &str, mac: &str) -> Value {
        json!({
            "system_id": system_id,
            "hostname": hostname,
            "status_name": status,
            "boot_interface": {"mac_address": mac},
            "interface_set": [{"mac_address": mac}]
        })
    }

    #[test]
    fn test_from_json_collects_macs() {
        let machine =
            Machine::from_json(&machine_json("abc123", "n1", "Ready", "aa:bb:cc:00:11:22"))
                .unwrap();
        assert_eq!(machine.system_id, "abc123");
        assert_eq!(machine.status, MachineStatus::Ready);
        assert!(machine.has_mac("AA:BB:CC:00:11:22"));
    }

    #[test]
    fn test_status_membership() {
        assert!(MachineStatus::New.commissionable());
        assert!(MachineStatus::Broken.commissionable());
        assert!(!MachineStatus::Ready.commissionable());
        assert!(!MachineStatus::Other("Allocating".to_string()).commissionable());
    }

    #[test]
    fn test_identify_prefers_boot_mac_over_hostname() {
        let client = crate::adapters::metal::client::MetalClient::new(
            &crate::domain::models::MetalDriverConfig::default(),
        )
        .unwrap();
        let mut machines = Machine::collection(&client);
        machines.items = vec![
            Machine::from_json(&machine_json("m1", "wrong-name", "New", "aa:aa:aa:aa:aa:01"))
                .unwrap(),
            Machine::from_json(&machine_json("m2", "n1", "New", "aa:aa:aa:aa:aa:02")).unwrap(),
        ];

        let node = BaremetalNode {
            name: "n1".to_string(),
            boot_mac: Some("aa:aa:aa:aa:aa:01".to_string()),
            oob: OobEndpoint::default(),
            ..BaremetalNode::default()
        };
        // Boot MAC wins even though another machine carries the hostname
        let found = machines.identify_baremetal_node(&node).unwrap();
        assert_eq!(found.system_id, "m1");

        let unmatched = BaremetalNode {
            name: "n1".to_string(),
            ..BaremetalNode::default()
        };
        let found = machines.identify_baremetal_node(&unmatched).unwrap();
        assert_eq!(found.system_id, "m2");
    }
}
