//! Application layer: drivers, action runners, and result aggregation.

pub mod actions;
pub mod aggregate;
pub mod node_driver;
pub mod oob_driver;
pub mod orchestrator;

use std::time::Duration;

use tracing::warn;
use uuid::Uuid;

pub use actions::{run_action, ActionOutcome};
pub use aggregate::{aggregate, ChildOutcome, SUBTASK_TIMEOUT_MSG};
pub use node_driver::{NodeDriver, NodeDriverBudgets};
pub use oob_driver::OobDriver;
pub use orchestrator::{Orchestrator, TaskRequest};

use crate::domain::error::DriverResult;
use crate::domain::models::Task;
use crate::domain::ports::{Clock, TaskStore};

/// A polling budget: how many ticks, and how long each tick is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl PollBudget {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }
}

/// Poll a parent's subtasks on the budget's tick until they all finish or
/// the budget runs out. Returns the last snapshot either way; the caller
/// reads unfinished children as a dependent failure.
///
/// Stale reads are acceptable: the parent may observe a subtask up to one
/// tick after it completed.
pub async fn wait_for_subtasks(
    store: &dyn TaskStore,
    clock: &dyn Clock,
    parent_id: Uuid,
    budget: PollBudget,
) -> DriverResult<Vec<Task>> {
    let mut attempts = 0;
    loop {
        let children = store.subtasks(parent_id).await?;
        if children.iter().all(Task::is_terminal) {
            return Ok(children);
        }
        if attempts >= budget.max_attempts {
            warn!(
                parent = %parent_id,
                attempts,
                "subtasks still running at budget expiry"
            );
            return Ok(children);
        }
        attempts += 1;
        clock.sleep(budget.interval).await;
    }
}
