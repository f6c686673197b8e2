//! Driver error taxonomy.
//!
//! Errors are classified by how the caller should react: transient faults
//! may be retried, persistent faults must not be, and usage errors indicate
//! a caller bug. Missing resources are not errors at all; lookups return
//! `Option` and callers decide what absence means.

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by drivers and remote clients.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Connection refused, DNS failure, timeout, or a 5xx response.
    /// The operation may succeed if retried.
    #[error("transient driver error: {0}")]
    Transient(String),

    /// A 4xx response, a malformed body, or inconsistent remote state.
    /// Retrying will not help.
    #[error("persistent driver error: {0}")]
    Persistent(String),

    /// Programming or usage error: unknown action, missing task, missing
    /// design reference. The only variant allowed to escape a driver.
    #[error("driver usage error: {0}")]
    Usage(String),
}

impl DriverError {
    /// Returns true if the operation may be retried.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Returns true if retrying cannot help.
    pub const fn is_persistent(&self) -> bool {
        !self.is_transient()
    }

    /// Shorthand for a transient error with a formatted message.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Shorthand for a persistent error with a formatted message.
    pub fn persistent(msg: impl Into<String>) -> Self {
        Self::Persistent(msg.into())
    }

    /// Shorthand for a usage error with a formatted message.
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }
}

/// Result alias used throughout the driver runtime.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors from the task store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Task with the given ID was not found
    #[error("task not found: {0}")]
    NotFound(Uuid),

    /// The storage backend failed
    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored column could not be decoded into its model type
    #[error("store serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for DriverError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::Usage(format!("task not found: {id}")),
            StoreError::Backend(msg) => Self::Transient(format!("task store: {msg}")),
            StoreError::Serialization(msg) => Self::Persistent(format!("task store: {msg}")),
        }
    }
}
