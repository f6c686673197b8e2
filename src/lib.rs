//! Slipway: a bare-metal provisioning orchestrator.
//!
//! Converges physical hardware toward a declarative site design by driving
//! a machine provisioning service over HTTP and out-of-band power/boot
//! controllers:
//! - Tree-structured task model with SQLite persistence
//! - Per-action workers converging remote resource state
//! - Fan-out drivers with polling budgets and result aggregation

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
