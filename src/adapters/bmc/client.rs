//! HTTP client for a node's out-of-band management controller.
//!
//! One client per node endpoint, built from the node's designed management
//! address and credentials. Controllers almost universally present
//! self-signed certificates, so certificate validation is relaxed when
//! speaking https to them.

use std::time::Duration;

use reqwest::{Client as HttpClient, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use crate::adapters::retry::RetryPolicy;
use crate::domain::error::{DriverError, DriverResult};
use crate::domain::models::design::BaremetalNode;
use crate::domain::models::BmcDriverConfig;

const SERVICE_ROOT: &str = "redfish/v1/";
const SYSTEM_PATH: &str = "redfish/v1/Systems/self/";
const RESET_PATH: &str = "redfish/v1/Systems/self/Actions/ComputerSystem.Reset/";

/// Power state reported by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerState {
    On,
    Off,
    Unknown(String),
}

impl PowerState {
    fn from_name(name: &str) -> Self {
        match name {
            "On" => Self::On,
            "Off" => Self::Off,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Boot source the controller should override to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootTarget {
    Pxe,
    Disk,
}

impl BootTarget {
    fn as_str(self) -> &'static str {
        match self {
            Self::Pxe => "Pxe",
            Self::Disk => "Hdd",
        }
    }
}

/// Reset command sent to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    On,
    ForceOff,
    ForceRestart,
}

impl ResetKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::On => "On",
            Self::ForceOff => "ForceOff",
            Self::ForceRestart => "ForceRestart",
        }
    }
}

/// Hardware summary read during interrogation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemSummary {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub power_state: Option<String>,
}

/// Client for one controller endpoint.
#[derive(Debug, Clone)]
pub struct BmcClient {
    http: HttpClient,
    base_url: String,
    account: String,
    credential: String,
    retry: RetryPolicy,
}

impl BmcClient {
    /// Build a client for a node's designed management endpoint.
    pub fn for_node(node: &BaremetalNode, config: &BmcDriverConfig) -> DriverResult<Self> {
        if node.oob.address.is_empty() {
            return Err(DriverError::usage(format!(
                "node {} has no management address",
                node.name
            )));
        }

        let http = HttpClient::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| DriverError::usage(format!("failed to build HTTP client: {e}")))?;

        let scheme = if config.use_ssl { "https" } else { "http" };
        Ok(Self {
            http,
            base_url: format!("{scheme}://{}/", node.oob.address),
            account: node.oob.account.clone(),
            credential: node.oob.credential.clone(),
            retry: RetryPolicy::new(
                config.max_retries,
                Duration::from_millis(config.retry_base_ms),
            ),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get(&self, path: &str) -> DriverResult<Value> {
        let url = self.url(path);
        let url = url.as_str();
        self.retry
            .execute(|| async move {
                debug!(url, "GET");
                let resp = self
                    .http
                    .get(url)
                    .basic_auth(&self.account, Some(&self.credential))
                    .send()
                    .await
                    .map_err(|e| DriverError::transient(format!("controller unreachable: {e}")))?;
                read_body(resp).await
            })
            .await
    }

    async fn send_json(&self, method: reqwest::Method, path: &str, body: Value) -> DriverResult<()> {
        let url = self.url(path);
        let url = url.as_str();
        let method = &method;
        let body = &body;
        self.retry
            .execute(|| async move {
                debug!(url, method = %method, "sending controller command");
                let resp = self
                    .http
                    .request(method.clone(), url)
                    .basic_auth(&self.account, Some(&self.credential))
                    .json(body)
                    .send()
                    .await
                    .map_err(|e| DriverError::transient(format!("controller unreachable: {e}")))?;
                read_body(resp).await.map(|_| ())
            })
            .await
    }

    /// Probe that the service root answers at all, unauthenticated.
    pub async fn test_connectivity(&self) -> DriverResult<()> {
        self.http
            .get(self.url(SERVICE_ROOT))
            .send()
            .await
            .map(|_| ())
            .map_err(|e| DriverError::transient(format!("controller unreachable: {e}")))
    }

    /// Probe that the configured account is accepted.
    pub async fn test_authentication(&self) -> DriverResult<()> {
        self.get(SYSTEM_PATH).await.map(|_| ())
    }

    /// Current chassis power state.
    pub async fn power_state(&self) -> DriverResult<PowerState> {
        let body = self.get(SYSTEM_PATH).await?;
        let state = body
            .get("PowerState")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                DriverError::persistent("controller response missing PowerState".to_string())
            })?;
        Ok(PowerState::from_name(state))
    }

    /// Issue a chassis reset command.
    pub async fn reset(&self, kind: ResetKind) -> DriverResult<()> {
        self.send_json(
            reqwest::Method::POST,
            RESET_PATH,
            json!({"ResetType": kind.as_str()}),
        )
        .await
    }

    /// Override the next boot source. `one_shot` limits the override to
    /// the next boot only.
    pub async fn set_boot_override(&self, target: BootTarget, one_shot: bool) -> DriverResult<()> {
        let enabled = if one_shot { "Once" } else { "Continuous" };
        self.send_json(
            reqwest::Method::PATCH,
            SYSTEM_PATH,
            json!({
                "Boot": {
                    "BootSourceOverrideEnabled": enabled,
                    "BootSourceOverrideTarget": target.as_str(),
                }
            }),
        )
        .await
    }

    /// Read back the configured boot override target.
    pub async fn boot_override(&self) -> DriverResult<Option<String>> {
        let body = self.get(SYSTEM_PATH).await?;
        Ok(body
            .get("Boot")
            .and_then(|b| b.get("BootSourceOverrideTarget"))
            .and_then(Value::as_str)
            .map(ToString::to_string))
    }

    /// Read the system inventory summary.
    pub async fn interrogate(&self) -> DriverResult<SystemSummary> {
        let body = self.get(SYSTEM_PATH).await?;
        let field = |key: &str| {
            body.get(key)
                .and_then(Value::as_str)
                .map(ToString::to_string)
        };
        Ok(SystemSummary {
            manufacturer: field("Manufacturer"),
            model: field("Model"),
            serial_number: field("SerialNumber"),
            power_state: field("PowerState"),
        })
    }
}

async fn read_body(resp: reqwest::Response) -> DriverResult<Value> {
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| DriverError::transient(format!("failed reading controller response: {e}")))?;

    if !status.is_success() {
        let summary: String = text.chars().take(200).collect();
        return Err(if status.is_server_error() {
            DriverError::transient(format!("controller returned {status}: {summary}"))
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            DriverError::persistent(format!("controller rejected credentials ({status})"))
        } else {
            DriverError::persistent(format!("controller returned {status}: {summary}"))
        });
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text)
        .map_err(|e| DriverError::persistent(format!("malformed controller response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::design::OobEndpoint;

    #[test]
    fn test_power_state_parsing() {
        assert_eq!(PowerState::from_name("On"), PowerState::On);
        assert_eq!(PowerState::from_name("Off"), PowerState::Off);
        assert_eq!(
            PowerState::from_name("PoweringOn"),
            PowerState::Unknown("PoweringOn".to_string())
        );
    }

    #[test]
    fn test_for_node_requires_address() {
        let node = BaremetalNode {
            name: "n1".to_string(),
            oob: OobEndpoint::default(),
            ..BaremetalNode::default()
        };
        let err = BmcClient::for_node(&node, &BmcDriverConfig::default()).unwrap_err();
        assert!(matches!(err, DriverError::Usage(_)));
    }

    #[test]
    fn test_scheme_follows_use_ssl() {
        let node = BaremetalNode {
            name: "n1".to_string(),
            oob: OobEndpoint {
                address: "10.0.1.10".to_string(),
                ..OobEndpoint::default()
            },
            ..BaremetalNode::default()
        };
        let mut config = BmcDriverConfig::default();
        config.use_ssl = false;
        let client = BmcClient::for_node(&node, &config).unwrap();
        assert!(client.base_url.starts_with("http://"));
    }
}
