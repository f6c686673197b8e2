//! Task store backends.

pub mod sqlite;

pub use sqlite::SqliteTaskStore;
