//! Adapters for the external provisioning systems.

pub mod bmc;
pub mod metal;
pub mod retry;

pub use retry::RetryPolicy;
