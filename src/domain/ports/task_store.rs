//! Task store port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::error::StoreError;
use crate::domain::models::{Task, TaskFieldUpdate};

/// Persistence interface for the task tree.
///
/// The store is the only shared mutable state in the runtime; every status
/// or result change goes through [`task_field_update`], which implementors
/// must apply atomically at the field-set level.
///
/// [`task_field_update`]: TaskStore::task_field_update
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new task. Parent linkage comes from `task.parent_id`.
    async fn create_task(&self, task: &Task) -> Result<(), StoreError>;

    /// Fetch a task by id, with its `subtasks` list populated.
    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError>;

    /// Atomically apply the provided fields to a task.
    async fn task_field_update(&self, id: Uuid, update: TaskFieldUpdate) -> Result<(), StoreError>;

    /// Fetch the direct children of a task, oldest first.
    async fn subtasks(&self, parent_id: Uuid) -> Result<Vec<Task>, StoreError>;
}
