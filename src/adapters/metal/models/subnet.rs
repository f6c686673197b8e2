//! Subnet shadow: an IP range bound to one VLAN in one fabric.

use serde_json::Value;

use super::{opt_str, req_i64, req_str, str_list, MetalResource, ResourceSet};
use crate::adapters::metal::client::MetalClient;
use crate::domain::error::DriverResult;
use crate::domain::models::design::{AddressRange, Network, RangeKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subnet {
    pub id: i64,
    pub name: String,
    pub cidr: String,
    /// VLAN resource id this subnet rides on
    pub vlan: i64,
    /// Fabric resource id owning that VLAN
    pub fabric: i64,
    pub gateway_ip: Option<String>,
    pub dns_servers: Vec<String>,
}

impl Subnet {
    /// A subnet materializing a design network; the id is assigned on add.
    pub fn from_network(network: &Network, fabric: i64, vlan: i64) -> Self {
        Self {
            id: 0,
            name: network.name.clone(),
            cidr: network.cidr.clone(),
            vlan,
            fabric,
            gateway_ip: network.default_gateway().map(ToString::to_string),
            dns_servers: network.dns_servers.clone(),
        }
    }

    pub fn collection(client: &MetalClient) -> ResourceSet<Self> {
        ResourceSet::new(client.clone(), "subnets/")
    }

    /// Reserve an address range inside this subnet.
    ///
    /// Idempotent: an identical existing range is left alone, so template
    /// convergence can re-run without tripping server conflicts.
    pub async fn add_address_range(
        &self,
        client: &MetalClient,
        range: &AddressRange,
    ) -> DriverResult<()> {
        let existing = client.get("ipranges/").await?;
        if let Some(list) = existing.as_array() {
            let already = list.iter().any(|r| {
                opt_str(r, "start_ip").as_deref() == Some(range.start.as_str())
                    && opt_str(r, "end_ip").as_deref() == Some(range.end.as_str())
            });
            if already {
                return Ok(());
            }
        }

        let kind = match range.kind {
            RangeKind::Dhcp => "dynamic",
            RangeKind::Static | RangeKind::Reserved => "reserved",
        };
        client
            .post(
                "ipranges/",
                None,
                &[
                    ("type", kind.to_string()),
                    ("start_ip", range.start.clone()),
                    ("end_ip", range.end.clone()),
                    ("subnet", self.id.to_string()),
                ],
            )
            .await?;
        Ok(())
    }
}

impl MetalResource for Subnet {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }

    fn path(&self) -> String {
        format!("subnets/{}/", self.id)
    }

    fn from_json(value: &Value) -> DriverResult<Self> {
        // The server inlines the VLAN representation; reduce it to the
        // vlan id plus the owning fabric id.
        let (vlan, fabric) = match value.get("vlan") {
            Some(inline) if inline.is_object() => (
                req_i64(inline, "id")?,
                inline
                    .get("fabric_id")
                    .and_then(Value::as_i64)
                    .unwrap_or_default(),
            ),
            Some(scalar) if scalar.is_i64() => (
                scalar.as_i64().unwrap_or_default(),
                value
                    .get("fabric")
                    .and_then(Value::as_i64)
                    .unwrap_or_default(),
            ),
            _ => (0, 0),
        };

        Ok(Self {
            id: req_i64(value, "id")?,
            name: req_str(value, "name")?,
            cidr: req_str(value, "cidr")?,
            vlan,
            fabric,
            gateway_ip: opt_str(value, "gateway_ip"),
            dns_servers: str_list(value, "dns_servers"),
        })
    }

    fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("name", self.name.clone()),
            ("cidr", self.cidr.clone()),
            ("vlan", self.vlan.to_string()),
            ("fabric", self.fabric.to_string()),
            ("dns_servers", self.dns_servers.join(",")),
        ];
        if let Some(gateway) = &self.gateway_ip {
            fields.push(("gateway_ip", gateway.clone()));
        }
        fields
    }
}
