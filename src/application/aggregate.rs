//! Subtask outcome aggregation.
//!
//! A parent's result is a pure function of the multiset of child results
//! and whether every child finished inside the budget. Keeping this free
//! of IO lets the order-insensitivity property be tested directly.

use crate::domain::models::{ActionResult, ResultDetail, Task};

/// Canonical detail message published when the budget expires first.
pub const SUBTASK_TIMEOUT_MSG: &str =
    "Some subtasks did not complete before the timeout threshold";

/// The slice of a subtask the aggregation depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildOutcome {
    pub finished: bool,
    pub result: ActionResult,
    pub detail: ResultDetail,
    pub node_list: Vec<String>,
}

impl ChildOutcome {
    /// Project a stored subtask into its aggregation-relevant slice.
    pub fn from_task(task: &Task) -> Self {
        Self {
            finished: task.is_terminal(),
            result: task.result,
            detail: task.result_detail.clone(),
            node_list: task.node_list.clone(),
        }
    }
}

/// Fold child outcomes into the parent's result and detail.
///
/// Status messages bubble up one level; per-node breakdowns are the union
/// of the children's, falling back to a child's whole node list when it
/// did not publish a breakdown.
pub fn aggregate(children: &[ChildOutcome]) -> (ActionResult, ResultDetail) {
    let unfinished = children.iter().any(|c| !c.finished);
    let mut worked = false;
    let mut failed = false;
    let mut detail = ResultDetail::default();

    for child in children.iter().filter(|c| c.finished) {
        worked = worked || child.result.worked();
        failed = failed || child.result.failed();

        match child.result {
            ActionResult::Success => {
                for node in nodes_or_fallback(&child.detail.successful_nodes, &child.node_list) {
                    detail.node_succeeded(node);
                }
            }
            ActionResult::Failure | ActionResult::DependentFailure => {
                for node in nodes_or_fallback(&child.detail.failed_nodes, &child.node_list) {
                    detail.node_failed(node);
                }
            }
            ActionResult::PartialSuccess => {
                for node in &child.detail.successful_nodes {
                    detail.node_succeeded(node);
                }
                for node in &child.detail.failed_nodes {
                    detail.node_failed(node);
                }
            }
            ActionResult::Incomplete => {}
        }
    }

    bubble_results(children, &mut detail);

    let result = if unfinished {
        detail.message(SUBTASK_TIMEOUT_MSG);
        ActionResult::DependentFailure
    } else if worked && failed {
        ActionResult::PartialSuccess
    } else if worked {
        ActionResult::Success
    } else {
        ActionResult::Failure
    };

    (result, detail)
}

/// Copy the children's status messages into the parent detail, in a
/// canonical order so aggregation stays order-insensitive.
fn bubble_results(children: &[ChildOutcome], detail: &mut ResultDetail) {
    let mut messages: Vec<&String> = children
        .iter()
        .filter(|c| c.finished)
        .flat_map(|c| c.detail.detail.iter())
        .collect();
    messages.sort();
    for msg in messages {
        detail.message(msg.clone());
    }
}

fn nodes_or_fallback<'a>(breakdown: &'a [String], node_list: &'a [String]) -> &'a [String] {
    if breakdown.is_empty() {
        node_list
    } else {
        breakdown
    }
}
