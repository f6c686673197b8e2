//! VLAN shadow. Vid 0 is the untagged VLAN of its fabric.

use serde_json::Value;

use super::{opt_bool, opt_str, opt_u64, req_i64, MetalResource, ResourceSet};
use crate::adapters::metal::client::MetalClient;
use crate::domain::error::DriverResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vlan {
    pub id: i64,
    pub vid: u16,
    pub name: String,
    pub mtu: Option<u32>,
    pub dhcp_on: bool,
    /// System id of the rack controller serving DHCP, when enabled
    pub primary_rack: Option<String>,
    pub fabric_id: i64,
}

impl Vlan {
    /// A VLAN to be created in a fabric; the id is assigned on add.
    pub fn new(fabric_id: i64, vid: u16, name: impl Into<String>, mtu: Option<u32>) -> Self {
        Self {
            id: 0,
            vid,
            name: name.into(),
            mtu,
            dhcp_on: false,
            primary_rack: None,
            fabric_id,
        }
    }

    /// The VLANs scoped to one fabric.
    pub fn collection(client: &MetalClient, fabric_id: i64) -> ResourceSet<Self> {
        ResourceSet::new(client.clone(), format!("fabrics/{fabric_id}/vlans/"))
    }
}

impl MetalResource for Vlan {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }

    fn path(&self) -> String {
        format!("fabrics/{}/vlans/{}/", self.fabric_id, self.vid)
    }

    fn from_json(value: &Value) -> DriverResult<Self> {
        // The server may inline the owning fabric; reduce it to its id.
        let fabric_id = match value.get("fabric_id") {
            Some(id) if id.is_i64() => req_i64(value, "fabric_id")?,
            _ => value
                .get("fabric")
                .and_then(|f| f.get("id"))
                .and_then(Value::as_i64)
                .unwrap_or_default(),
        };

        Ok(Self {
            id: req_i64(value, "id")?,
            vid: u16::try_from(req_i64(value, "vid")?).unwrap_or_default(),
            name: opt_str(value, "name").unwrap_or_default(),
            mtu: opt_u64(value, "mtu").map(|m| m as u32),
            dhcp_on: opt_bool(value, "dhcp_on").unwrap_or(false),
            primary_rack: opt_str(value, "primary_rack"),
            fabric_id,
        })
    }

    fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("name", self.name.clone()),
            ("vid", self.vid.to_string()),
            ("dhcp_on", self.dhcp_on.to_string()),
        ];
        if let Some(mtu) = self.mtu {
            fields.push(("mtu", mtu.to_string()));
        }
        if let Some(rack) = &self.primary_rack {
            fields.push(("primary_rack", rack.clone()));
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_scalar_fabric() {
        let vlan = Vlan::from_json(&json!({
            "id": 5, "vid": 0, "name": "untagged", "fabric_id": 2,
            "dhcp_on": false, "mtu": 1500
        }))
        .unwrap();
        assert_eq!(vlan.fabric_id, 2);
        assert_eq!(vlan.vid, 0);
        assert_eq!(vlan.mtu, Some(1500));
        assert_eq!(vlan.path(), "fabrics/2/vlans/0/");
    }

    #[test]
    fn test_from_json_rekeys_inline_fabric() {
        let vlan = Vlan::from_json(&json!({
            "id": 5, "vid": 102, "name": "storage",
            "fabric": {"id": 7, "name": "rack-2"},
            "dhcp_on": true, "primary_rack": "rck001"
        }))
        .unwrap();
        assert_eq!(vlan.fabric_id, 7);
        assert!(vlan.dhcp_on);
        assert_eq!(vlan.primary_rack.as_deref(), Some("rck001"));
    }
}
