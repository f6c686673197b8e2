//! Domain models
//!
//! Pure domain entities: the task tree, the site design snapshot, and the
//! configuration model. Framework-agnostic, no infrastructure concerns.

pub mod config;
pub mod design;
pub mod task;

pub use config::{
    BmcDriverConfig, LoggingConfig, MetalDriverConfig, OrchestratorConfig, SiteConfig, StoreConfig,
};
pub use design::{
    AddressRange, BaremetalNode, Network, NetworkLink, NodeAddress, NodeInterface, OobEndpoint,
    RangeKind, Route, SiteDesign,
};
pub use task::{
    ActionClass, ActionResult, OrchestratorAction, ResultDetail, Task, TaskFieldUpdate, TaskScope,
    TaskStatus,
};
