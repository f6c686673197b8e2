//! Adapter for out-of-band management controllers.

pub mod client;

pub use client::{BmcClient, BootTarget, PowerState, ResetKind, SystemSummary};
