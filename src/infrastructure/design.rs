//! YAML site design resolver.

use async_trait::async_trait;
use tracing::debug;

use crate::domain::error::{DriverError, DriverResult};
use crate::domain::models::SiteDesign;
use crate::domain::ports::DesignResolver;

/// Resolver that treats design references as paths to YAML design files.
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlDesignResolver;

#[async_trait]
impl DesignResolver for YamlDesignResolver {
    async fn resolve(&self, design_ref: &str) -> DriverResult<SiteDesign> {
        debug!(design_ref, "resolving site design");
        let raw = tokio::fs::read_to_string(design_ref)
            .await
            .map_err(|e| DriverError::usage(format!("cannot read design {design_ref}: {e}")))?;
        serde_yaml::from_str(&raw)
            .map_err(|e| DriverError::persistent(format!("malformed design {design_ref}: {e}")))
    }
}
