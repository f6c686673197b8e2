//! Fabric shadow: a layer-2 broadcast domain containing VLANs.

use serde_json::Value;

use super::{req_i64, req_str, MetalResource, ResourceSet};
use crate::adapters::metal::client::MetalClient;
use crate::domain::error::DriverResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fabric {
    pub id: i64,
    pub name: String,
}

impl Fabric {
    /// A fabric to be created server-side; the id is assigned on add.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
        }
    }

    pub fn collection(client: &MetalClient) -> ResourceSet<Self> {
        ResourceSet::new(client.clone(), "fabrics/")
    }
}

impl MetalResource for Fabric {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }

    fn path(&self) -> String {
        format!("fabrics/{}/", self.id)
    }

    fn from_json(value: &Value) -> DriverResult<Self> {
        Ok(Self {
            id: req_i64(value, "id")?,
            name: req_str(value, "name")?,
        })
    }

    fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![("name", self.name.clone())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json() {
        let fabric = Fabric::from_json(&json!({"id": 3, "name": "rack-1"})).unwrap();
        assert_eq!(fabric.id, 3);
        assert_eq!(fabric.name, "rack-1");
        assert_eq!(fabric.path(), "fabrics/3/");
    }

    #[test]
    fn test_missing_field_is_persistent() {
        let err = Fabric::from_json(&json!({"name": "rack-1"})).unwrap_err();
        assert!(err.is_persistent());
    }
}
