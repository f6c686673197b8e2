//! Rack controller shadow. Read-only: the service's DHCP/TFTP agents.

use serde_json::Value;

use super::{opt_str, req_str, MetalResource, ResourceSet};
use crate::adapters::metal::client::MetalClient;
use crate::domain::error::DriverResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RackController {
    pub system_id: String,
    pub hostname: String,
}

impl RackController {
    pub fn collection(client: &MetalClient) -> ResourceSet<Self> {
        ResourceSet::new(client.clone(), "rackcontrollers/")
    }
}

impl MetalResource for RackController {
    type Key = String;

    fn key(&self) -> String {
        self.system_id.clone()
    }

    fn path(&self) -> String {
        format!("rackcontrollers/{}/", self.system_id)
    }

    fn from_json(value: &Value) -> DriverResult<Self> {
        Ok(Self {
            system_id: req_str(value, "system_id")?,
            hostname: opt_str(value, "hostname").unwrap_or_default(),
        })
    }

    fn form_fields(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}
