//! In-process shadows of provisioning service resources.
//!
//! A shadow is built from a list fetch, mutated through create/update calls
//! that reconcile the server's response, and dropped at the end of the
//! action that made it. Shadows are never a long-lived cache.

pub mod fabric;
pub mod interface;
pub mod machine;
pub mod rack_controller;
pub mod subnet;
pub mod vlan;

pub use fabric::Fabric;
pub use interface::{Interface, InterfaceLink, LinkOptions};
pub use machine::{Machine, MachineStatus};
pub use rack_controller::RackController;
pub use subnet::Subnet;
pub use vlan::Vlan;

use serde_json::Value;
use tracing::warn;

use super::client::MetalClient;
use crate::domain::error::{DriverError, DriverResult};

/// A typed reflection of one remote resource kind.
///
/// `from_json` owns the normalization of server JSON into the shadow,
/// including id re-keying where the server inlines nested resource
/// representations. `form_fields` is the inverse direction: the writable
/// fields serialized for create and update calls.
pub trait MetalResource: Clone + Send + Sync + Sized {
    /// Identifier type the server keys this resource by.
    type Key: PartialEq + Clone + std::fmt::Display + Send + Sync;

    /// The server-assigned key.
    fn key(&self) -> Self::Key;

    /// Canonical path of this resource, relative to the API base.
    fn path(&self) -> String;

    /// Normalize a server JSON object into a shadow.
    fn from_json(value: &Value) -> DriverResult<Self>;

    /// Writable fields for create/update calls.
    fn form_fields(&self) -> Vec<(&'static str, String)>;
}

/// A collection of shadows backed by one list endpoint.
#[derive(Debug, Clone)]
pub struct ResourceSet<T: MetalResource> {
    pub(crate) client: MetalClient,
    pub(crate) collection_path: String,
    pub(crate) items: Vec<T>,
}

impl<T: MetalResource> ResourceSet<T> {
    pub fn new(client: MetalClient, collection_path: impl Into<String>) -> Self {
        Self {
            client,
            collection_path: collection_path.into(),
            items: Vec::new(),
        }
    }

    /// Atomically replace the collection from the list endpoint.
    pub async fn refresh(&mut self) -> DriverResult<()> {
        let body = self.client.get(&self.collection_path).await?;
        let list = body.as_array().ok_or_else(|| {
            DriverError::persistent(format!(
                "inconsistent data from the metal service: {} did not return a list",
                self.collection_path
            ))
        })?;
        self.items = list.iter().map(T::from_json).collect::<DriverResult<_>>()?;
        Ok(())
    }

    /// Look up a shadow by its server key.
    pub fn select(&self, key: &T::Key) -> Option<&T> {
        self.items.iter().find(|item| item.key() == *key)
    }

    /// The unique element matching the predicate.
    ///
    /// More than one match is tolerated with a warning; the first in
    /// server order wins.
    pub fn singleton(&self, predicate: impl Fn(&T) -> bool) -> Option<&T> {
        let mut matches = self.items.iter().filter(|item| predicate(item));
        let first = matches.next();
        if matches.next().is_some() {
            warn!(
                collection = %self.collection_path,
                "multiple resources matched a singleton filter, using the first"
            );
        }
        first
    }

    /// All elements matching the predicate, in server order.
    pub fn query(&self, predicate: impl Fn(&T) -> bool) -> Vec<&T> {
        self.items.iter().filter(|item| predicate(item)).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Create the resource server-side and return the materialized shadow
    /// with its assigned key.
    pub async fn add(&mut self, resource: T) -> DriverResult<T> {
        let body = self
            .client
            .post(&self.collection_path, None, &resource.form_fields())
            .await?;
        let created = T::from_json(&body)?;
        self.items.push(created.clone());
        Ok(created)
    }
}

/// Serialize a shadow's writable fields to its canonical URL and return
/// the server's view of the result.
pub async fn update_resource<T: MetalResource>(client: &MetalClient, resource: &T) -> DriverResult<T> {
    let body = client.put(&resource.path(), &resource.form_fields()).await?;
    T::from_json(&body)
}

/// Re-fetch a shadow from its canonical URL.
pub async fn refresh_resource<T: MetalResource>(client: &MetalClient, resource: &T) -> DriverResult<T> {
    let body = client.get(&resource.path()).await?;
    T::from_json(&body)
}

// JSON field accessors shared by the from_json implementations. All of
// them produce the persistent "inconsistent data" error the driver
// contract requires for shape violations.

pub(crate) fn shape_error(what: &str) -> DriverError {
    DriverError::persistent(format!("inconsistent data from the metal service: {what}"))
}

pub(crate) fn req_i64(value: &Value, key: &str) -> DriverResult<i64> {
    value
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| shape_error(&format!("missing integer field '{key}'")))
}

pub(crate) fn req_str(value: &Value, key: &str) -> DriverResult<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| shape_error(&format!("missing string field '{key}'")))
}

pub(crate) fn opt_str(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(ToString::to_string)
}

pub(crate) fn opt_u64(value: &Value, key: &str) -> Option<u64> {
    value.get(key).and_then(Value::as_u64)
}

pub(crate) fn opt_bool(value: &Value, key: &str) -> Option<bool> {
    value.get(key).and_then(Value::as_bool)
}

pub(crate) fn str_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}
