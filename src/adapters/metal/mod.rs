//! Adapter for the machine provisioning service.

pub mod client;
pub mod models;

pub use client::MetalClient;
