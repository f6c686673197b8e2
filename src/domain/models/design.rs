//! Site design snapshot.
//!
//! A read-only description of what the site should look like: networks,
//! the links that carry them, and the bare-metal nodes to converge.
//! Drivers only ever read a design; producing one is the resolver's job.

use serde::{Deserialize, Serialize};

/// The effective design for one site.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteDesign {
    /// Site this design describes
    #[serde(default)]
    pub site_name: String,
    /// Layer-3 networks
    #[serde(default)]
    pub networks: Vec<Network>,
    /// Layer-2 links carrying the networks
    #[serde(default)]
    pub network_links: Vec<NetworkLink>,
    /// Physical hosts to converge
    #[serde(default)]
    pub baremetal_nodes: Vec<BaremetalNode>,
}

impl SiteDesign {
    pub fn get_network(&self, name: &str) -> Option<&Network> {
        self.networks.iter().find(|n| n.name == name)
    }

    pub fn get_network_link(&self, name: &str) -> Option<&NetworkLink> {
        self.network_links.iter().find(|l| l.name == name)
    }

    pub fn get_baremetal_node(&self, name: &str) -> Option<&BaremetalNode> {
        self.baremetal_nodes.iter().find(|n| n.name == name)
    }
}

/// Address range kinds inside a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeKind {
    Static,
    Dhcp,
    Reserved,
}

/// A contiguous address range carved out of a network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressRange {
    #[serde(rename = "type")]
    pub kind: RangeKind,
    pub start: String,
    pub end: String,
}

/// A static route attached to a network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub subnet: String,
    pub gateway: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<u32>,
}

/// A layer-3 network in the design.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,
    pub cidr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    #[serde(default)]
    pub dns_servers: Vec<String>,
    #[serde(default)]
    pub ranges: Vec<AddressRange>,
    #[serde(default)]
    pub routes: Vec<Route>,
}

impl Network {
    /// Gateway of the default route, if the network declares one.
    pub fn default_gateway(&self) -> Option<&str> {
        self.routes
            .iter()
            .find(|r| r.subnet == "0.0.0.0/0")
            .map(|r| r.gateway.as_str())
    }
}

/// A layer-2 link and the networks allowed to ride it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkLink {
    pub name: String,
    #[serde(default)]
    pub allowed_networks: Vec<String>,
    /// Network carried untagged on this link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_network: Option<String>,
}

/// A node interface and the networks it should join.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeInterface {
    pub device_name: String,
    pub network_link: String,
    #[serde(default)]
    pub networks: Vec<String>,
}

/// An address assignment for one network on one node.
///
/// `address` is either a literal IP or the string `"dhcp"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAddress {
    pub network: String,
    pub address: String,
}

impl NodeAddress {
    pub fn is_dhcp(&self) -> bool {
        self.address.eq_ignore_ascii_case("dhcp")
    }
}

/// Out-of-band management endpoint of a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OobEndpoint {
    /// Controller flavor, e.g. "redfish"
    #[serde(rename = "type", default)]
    pub oob_type: String,
    /// Host or host:port of the controller
    #[serde(default)]
    pub address: String,
    /// MAC of the management controller, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub credential: String,
    /// Network the controller lives on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

/// A physical host in the design.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaremetalNode {
    pub name: String,
    #[serde(default)]
    pub interfaces: Vec<NodeInterface>,
    #[serde(default)]
    pub addressing: Vec<NodeAddress>,
    /// Network whose gateway becomes the node default route
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_network: Option<String>,
    /// MAC the node boots from, used for identification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_mac: Option<String>,
    #[serde(default)]
    pub oob: OobEndpoint,
}

impl BaremetalNode {
    /// The addressing entry for a network, if the design assigns one.
    pub fn address_for(&self, network: &str) -> Option<&NodeAddress> {
        self.addressing.iter().find(|a| a.network == network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_design() -> SiteDesign {
        SiteDesign {
            site_name: "site-a".to_string(),
            networks: vec![Network {
                name: "pxe".to_string(),
                cidr: "172.16.0.0/24".to_string(),
                vlan_id: None,
                routes: vec![Route {
                    subnet: "0.0.0.0/0".to_string(),
                    gateway: "172.16.0.1".to_string(),
                    metric: None,
                }],
                ..Network::default()
            }],
            network_links: vec![NetworkLink {
                name: "pxe-rack".to_string(),
                allowed_networks: vec!["pxe".to_string()],
                native_network: Some("pxe".to_string()),
            }],
            baremetal_nodes: vec![BaremetalNode {
                name: "n1".to_string(),
                addressing: vec![NodeAddress {
                    network: "pxe".to_string(),
                    address: "dhcp".to_string(),
                }],
                ..BaremetalNode::default()
            }],
        }
    }

    #[test]
    fn test_name_indexed_lookups() {
        let design = sample_design();
        assert!(design.get_network("pxe").is_some());
        assert!(design.get_network("missing").is_none());
        assert!(design.get_network_link("pxe-rack").is_some());
        assert!(design.get_baremetal_node("n1").is_some());
    }

    #[test]
    fn test_default_gateway_from_routes() {
        let design = sample_design();
        let net = design.get_network("pxe").unwrap();
        assert_eq!(net.default_gateway(), Some("172.16.0.1"));
    }

    #[test]
    fn test_dhcp_addressing() {
        let design = sample_design();
        let node = design.get_baremetal_node("n1").unwrap();
        assert!(node.address_for("pxe").unwrap().is_dhcp());
        assert!(node.address_for("storage").is_none());
    }

    #[test]
    fn test_design_deserializes_from_yaml() {
        let yaml = r#"
site_name: site-a
networks:
  - name: mgmt
    cidr: 10.0.0.0/24
    vlan_id: 100
    dns_servers: ["8.8.8.8"]
    ranges:
      - type: dhcp
        start: 10.0.0.100
        end: 10.0.0.200
network_links:
  - name: rack-bond
    allowed_networks: [mgmt]
baremetal_nodes:
  - name: n1
    boot_mac: "aa:bb:cc:dd:ee:ff"
    interfaces:
      - device_name: eno1
        network_link: rack-bond
        networks: [mgmt]
    addressing:
      - network: mgmt
        address: 10.0.0.10
    oob:
      type: redfish
      address: 10.0.1.10
      account: root
      credential: calvin
"#;
        let design: SiteDesign = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(design.networks[0].vlan_id, Some(100));
        assert_eq!(design.networks[0].ranges[0].kind, RangeKind::Dhcp);
        assert_eq!(design.baremetal_nodes[0].oob.oob_type, "redfish");
    }
}
