//! Action runners.
//!
//! One runner per orchestrator action. Runners are pure functions of
//! (subtask, design, remote clients) to an outcome; the [`run_action`]
//! harness owns the subtask lifecycle around them: Running on entry,
//! Complete with a result before returning, no exceptions across the
//! driver boundary.

pub mod configure_hardware;
pub mod identify_node;
pub mod network_template;
pub mod node_networking;
pub mod oob;

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::error;
use uuid::Uuid;

use crate::domain::error::DriverError;
use crate::domain::models::{ActionResult, ResultDetail, TaskFieldUpdate, TaskStatus};
use crate::domain::ports::TaskStore;

/// What a runner produced for its subtask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub result: ActionResult,
    pub detail: ResultDetail,
}

impl ActionOutcome {
    pub fn new(result: ActionResult, detail: ResultDetail) -> Self {
        Self { result, detail }
    }

    /// A plain success with no messages.
    pub fn success() -> Self {
        Self::new(ActionResult::Success, ResultDetail::default())
    }

    /// A failure carrying one message and a retry hint.
    pub fn failure(msg: impl Into<String>, retry: bool) -> Self {
        let mut detail = ResultDetail::default();
        detail.message(msg);
        detail.retry = Some(retry);
        Self::new(ActionResult::Failure, detail)
    }

    /// The published form of an error that escaped a runner.
    fn from_error(err: &DriverError) -> Self {
        Self::failure(err.to_string(), err.is_transient())
    }

    /// The published form of a cooperative cancellation.
    fn cancelled() -> Self {
        Self::failure("cancelled", true)
    }

    /// Derive a result from per-node worked/failed accumulation.
    pub fn from_flags(worked: bool, failed: bool, detail: ResultDetail) -> Self {
        let result = if worked && failed {
            ActionResult::PartialSuccess
        } else if worked {
            ActionResult::Success
        } else {
            ActionResult::Failure
        };
        Self::new(result, detail)
    }
}

/// Drive one runner through the subtask lifecycle.
///
/// The subtask is set Running before the runner starts and is always left
/// Complete with a result: runner errors become `Failure` with the retry
/// flag taken from the error class, and cancellation resolves at the
/// runner's next suspension point as `Failure` with `retry=true`.
pub async fn run_action<F, Fut>(
    store: Arc<dyn TaskStore>,
    subtask_id: Uuid,
    cancel: CancellationToken,
    runner: F,
) where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<ActionOutcome, DriverError>>,
{
    if let Err(e) = store
        .task_field_update(
            subtask_id,
            TaskFieldUpdate::default()
                .status(TaskStatus::Running)
                .result(ActionResult::Incomplete),
        )
        .await
    {
        error!(subtask = %subtask_id, error = %e, "failed to mark subtask running");
        return;
    }

    let outcome = tokio::select! {
        () = cancel.cancelled() => ActionOutcome::cancelled(),
        result = runner() => match result {
            Ok(outcome) => outcome,
            Err(err) => ActionOutcome::from_error(&err),
        },
    };

    if let Err(e) = store
        .task_field_update(
            subtask_id,
            TaskFieldUpdate::complete(outcome.result, outcome.detail),
        )
        .await
    {
        error!(subtask = %subtask_id, error = %e, "failed to publish subtask outcome");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{OrchestratorAction, Task};
    use crate::infrastructure::store::SqliteTaskStore;

    async fn seeded_store() -> (Arc<dyn TaskStore>, Uuid) {
        let store = SqliteTaskStore::in_memory().await.unwrap();
        let task = Task::new(OrchestratorAction::IdentifyNode, "d", "s");
        store.create_task(&task).await.unwrap();
        (Arc::new(store), task.id)
    }

    #[tokio::test]
    async fn test_outcome_published_on_success() {
        let (store, id) = seeded_store().await;
        run_action(Arc::clone(&store), id, CancellationToken::new(), || async {
            Ok(ActionOutcome::success())
        })
        .await;

        let task = store.get_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Complete);
        assert_eq!(task.result, ActionResult::Success);
    }

    #[tokio::test]
    async fn test_runner_error_becomes_failure_with_retry_class() {
        let (store, id) = seeded_store().await;
        run_action(Arc::clone(&store), id, CancellationToken::new(), || async {
            Err(DriverError::transient("connection refused"))
        })
        .await;

        let task = store.get_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Complete);
        assert_eq!(task.result, ActionResult::Failure);
        assert_eq!(task.result_detail.retry, Some(true));

        let (store, id) = seeded_store().await;
        run_action(Arc::clone(&store), id, CancellationToken::new(), || async {
            Err(DriverError::persistent("bad request"))
        })
        .await;
        let task = store.get_task(id).await.unwrap().unwrap();
        assert_eq!(task.result_detail.retry, Some(false));
    }

    #[tokio::test]
    async fn test_cancellation_resolves_at_suspension_point() {
        let (store, id) = seeded_store().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        run_action(Arc::clone(&store), id, cancel, || async {
            // A runner that would otherwise never finish
            std::future::pending::<Result<ActionOutcome, DriverError>>().await
        })
        .await;

        let task = store.get_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Complete);
        assert_eq!(task.result, ActionResult::Failure);
        assert_eq!(task.result_detail.retry, Some(true));
        assert_eq!(task.result_detail.detail, vec!["cancelled"]);
    }
}
