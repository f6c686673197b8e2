//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{json, Value};

use slipway::adapters::metal::MetalClient;
use slipway::domain::models::design::{
    AddressRange, BaremetalNode, Network, NetworkLink, NodeAddress, NodeInterface, OobEndpoint,
    RangeKind, Route,
};
use slipway::domain::models::{BmcDriverConfig, MetalDriverConfig, OrchestratorAction, Task};
use slipway::domain::ports::TaskStore;
use slipway::infrastructure::SqliteTaskStore;

/// Driver config pointed at a mock server, with a fast retry envelope.
pub fn metal_config(base_url: &str) -> MetalDriverConfig {
    MetalDriverConfig {
        api_url: base_url.to_string(),
        api_key: "test-key".to_string(),
        use_ssl: false,
        max_retries: 1,
        retry_base_ms: 1,
        request_timeout_secs: 5,
        poll_interval_secs: 60,
        network_template_timeout_secs: 120,
    }
}

pub fn metal_client(base_url: &str) -> MetalClient {
    MetalClient::new(&metal_config(base_url)).unwrap()
}

/// Controller config pointed at a mock server.
pub fn bmc_config() -> BmcDriverConfig {
    BmcDriverConfig {
        use_ssl: false,
        max_retries: 1,
        retry_base_ms: 1,
        request_timeout_secs: 5,
        ..BmcDriverConfig::default()
    }
}

pub async fn store() -> Arc<dyn TaskStore> {
    Arc::new(SqliteTaskStore::in_memory().await.unwrap())
}

/// A network with an optional VLAN tag and default gateway.
pub fn network(name: &str, cidr: &str, vlan_id: Option<u16>) -> Network {
    Network {
        name: name.to_string(),
        cidr: cidr.to_string(),
        vlan_id,
        mtu: None,
        dns_servers: Vec::new(),
        ranges: Vec::new(),
        routes: vec![Route {
            subnet: "0.0.0.0/0".to_string(),
            gateway: gateway_of(cidr),
            metric: None,
        }],
    }
}

fn gateway_of(cidr: &str) -> String {
    let base = cidr.split('/').next().unwrap_or("10.0.0.0");
    let mut parts: Vec<&str> = base.split('.').collect();
    parts.truncate(3);
    format!("{}.1", parts.join("."))
}

pub fn dhcp_range(start: &str, end: &str) -> AddressRange {
    AddressRange {
        kind: RangeKind::Dhcp,
        start: start.to_string(),
        end: end.to_string(),
    }
}

/// A node bootable from `boot_mac` with one interface on `link`.
pub fn node(name: &str, boot_mac: &str, link: &str, networks: &[&str]) -> BaremetalNode {
    BaremetalNode {
        name: name.to_string(),
        interfaces: vec![NodeInterface {
            device_name: "eno1".to_string(),
            network_link: link.to_string(),
            networks: networks.iter().map(ToString::to_string).collect(),
        }],
        addressing: Vec::new(),
        primary_network: None,
        boot_mac: Some(boot_mac.to_string()),
        oob: OobEndpoint::default(),
    }
}

pub fn address(node: &mut BaremetalNode, network: &str, addr: &str) {
    node.addressing.push(NodeAddress {
        network: network.to_string(),
        address: addr.to_string(),
    });
}

pub fn link(name: &str, allowed: &[&str], native: Option<&str>) -> NetworkLink {
    NetworkLink {
        name: name.to_string(),
        allowed_networks: allowed.iter().map(ToString::to_string).collect(),
        native_network: native.map(ToString::to_string),
    }
}

/// Server-side machine JSON as the list endpoint returns it.
pub fn machine_json(system_id: &str, hostname: &str, status: &str, boot_mac: &str) -> Value {
    json!({
        "system_id": system_id,
        "hostname": hostname,
        "status_name": status,
        "boot_interface": {"mac_address": boot_mac},
        "interface_set": [{"mac_address": boot_mac}]
    })
}

/// A parent task for an action over the given nodes.
pub fn parent_task(action: OrchestratorAction, nodes: &[&str]) -> Task {
    Task::new(action, "design-1", "site-a")
        .with_nodes(nodes.iter().map(ToString::to_string).collect())
}
