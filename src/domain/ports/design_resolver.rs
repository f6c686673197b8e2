//! Design resolver port.

use async_trait::async_trait;

use crate::domain::error::DriverResult;
use crate::domain::models::SiteDesign;

/// Resolves an opaque design reference into an effective site design.
///
/// Read-only from the runtime's point of view; how designs are sourced and
/// validated is a concern of the embedding application.
#[async_trait]
pub trait DesignResolver: Send + Sync {
    async fn resolve(&self, design_ref: &str) -> DriverResult<SiteDesign>;
}

/// Resolver that always returns one fixed design.
///
/// Useful in tests and for embedders that already hold an effective design.
pub struct StaticDesignResolver {
    design: SiteDesign,
}

impl StaticDesignResolver {
    pub fn new(design: SiteDesign) -> Self {
        Self { design }
    }
}

#[async_trait]
impl DesignResolver for StaticDesignResolver {
    async fn resolve(&self, _design_ref: &str) -> DriverResult<SiteDesign> {
        Ok(self.design.clone())
    }
}
