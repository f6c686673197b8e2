//! Task domain model.
//!
//! Tasks are the unit of work the orchestrator hands to drivers. They form
//! a tree: a driver fans a parent task out into per-node subtasks and
//! aggregates their results back into the parent.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a task. Transitions are monotone; a task never moves backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is created but no worker has picked it up
    Pending,
    /// Task is being executed
    Running,
    /// Task finished; `result` is authoritative
    Complete,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Complete => "complete",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "complete" | "completed" => Some(Self::Complete),
            _ => None,
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Complete => 2,
        }
    }

    /// Check if this is the terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Monotone ordering: a task may only move forward.
    pub fn can_transition_to(&self, new_status: Self) -> bool {
        new_status.rank() > self.rank()
    }
}

/// Outcome of a completed task.
///
/// `Incomplete` is the placeholder while the task is still in flight; a
/// task whose `status` is `Complete` always carries one of the other four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionResult {
    Incomplete,
    Success,
    PartialSuccess,
    Failure,
    /// Subtasks did not finish inside the parent's budget
    DependentFailure,
}

impl Default for ActionResult {
    fn default() -> Self {
        Self::Incomplete
    }
}

impl ActionResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incomplete => "incomplete",
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::Failure => "failure",
            Self::DependentFailure => "dependent_failure",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "incomplete" => Some(Self::Incomplete),
            "success" => Some(Self::Success),
            "partial_success" => Some(Self::PartialSuccess),
            "failure" => Some(Self::Failure),
            "dependent_failure" => Some(Self::DependentFailure),
            _ => None,
        }
    }

    /// True for results that carried at least some useful work.
    pub fn worked(&self) -> bool {
        matches!(self, Self::Success | Self::PartialSuccess)
    }

    /// True for results that carried at least one failure.
    pub fn failed(&self) -> bool {
        matches!(self, Self::Failure | Self::PartialSuccess)
    }
}

/// Which driver family handles an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionClass {
    /// Machine provisioning service actions
    NodeProvision,
    /// Out-of-band controller actions
    Oob,
}

/// The actions the orchestrator can route to a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorAction {
    ValidateNodeServices,
    CreateNetworkTemplate,
    IdentifyNode,
    ConfigureHardware,
    ApplyNodeNetworking,
    ValidateOobServices,
    ConfigNodePxe,
    SetNodeBoot,
    PowerOffNode,
    PowerOnNode,
    PowerCycleNode,
    InterrogateOob,
}

impl OrchestratorAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidateNodeServices => "validate_node_services",
            Self::CreateNetworkTemplate => "create_network_template",
            Self::IdentifyNode => "identify_node",
            Self::ConfigureHardware => "configure_hardware",
            Self::ApplyNodeNetworking => "apply_node_networking",
            Self::ValidateOobServices => "validate_oob_services",
            Self::ConfigNodePxe => "config_node_pxe",
            Self::SetNodeBoot => "set_node_boot",
            Self::PowerOffNode => "power_off_node",
            Self::PowerOnNode => "power_on_node",
            Self::PowerCycleNode => "power_cycle_node",
            Self::InterrogateOob => "interrogate_oob",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "validate_node_services" => Some(Self::ValidateNodeServices),
            "create_network_template" => Some(Self::CreateNetworkTemplate),
            "identify_node" => Some(Self::IdentifyNode),
            "configure_hardware" => Some(Self::ConfigureHardware),
            "apply_node_networking" => Some(Self::ApplyNodeNetworking),
            "validate_oob_services" => Some(Self::ValidateOobServices),
            "config_node_pxe" => Some(Self::ConfigNodePxe),
            "set_node_boot" => Some(Self::SetNodeBoot),
            "power_off_node" => Some(Self::PowerOffNode),
            "power_on_node" => Some(Self::PowerOnNode),
            "power_cycle_node" => Some(Self::PowerCycleNode),
            "interrogate_oob" => Some(Self::InterrogateOob),
            _ => None,
        }
    }

    /// Which driver family handles this action.
    pub fn class(&self) -> ActionClass {
        match self {
            Self::ValidateNodeServices
            | Self::CreateNetworkTemplate
            | Self::IdentifyNode
            | Self::ConfigureHardware
            | Self::ApplyNodeNetworking => ActionClass::NodeProvision,
            Self::ValidateOobServices
            | Self::ConfigNodePxe
            | Self::SetNodeBoot
            | Self::PowerOffNode
            | Self::PowerOnNode
            | Self::PowerCycleNode
            | Self::InterrogateOob => ActionClass::Oob,
        }
    }
}

/// Structured result breakdown published with a completed task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultDetail {
    /// Human-readable status messages
    #[serde(default)]
    pub detail: Vec<String>,
    /// Nodes whose portion of the work succeeded
    #[serde(default)]
    pub successful_nodes: Vec<String>,
    /// Nodes whose portion of the work failed
    #[serde(default)]
    pub failed_nodes: Vec<String>,
    /// Whether the outer controller should re-submit the task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<bool>,
}

impl ResultDetail {
    /// Append a status message.
    pub fn message(&mut self, msg: impl Into<String>) {
        self.detail.push(msg.into());
    }

    /// Record a node as successful, deduplicating.
    pub fn node_succeeded(&mut self, node: &str) {
        if !self.successful_nodes.iter().any(|n| n == node) {
            self.successful_nodes.push(node.to_string());
        }
    }

    /// Record a node as failed, deduplicating.
    pub fn node_failed(&mut self, node: &str) {
        if !self.failed_nodes.iter().any(|n| n == node) {
            self.failed_nodes.push(node.to_string());
        }
    }
}

/// Key/value scope narrowing a task to part of the site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskScope {
    /// Site the task applies to
    #[serde(default)]
    pub site: String,
    /// Node names in scope; empty means the whole site
    #[serde(default)]
    pub node_names: Vec<String>,
    /// Free-form scope extensions
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A unit of provisioning work routed to a driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: Uuid,
    /// Parent task (for subtasks)
    pub parent_id: Option<Uuid>,
    /// What the driver should do
    pub action: OrchestratorAction,
    /// Opaque reference resolvable by the design resolver
    pub design_ref: String,
    /// Site the task applies to
    pub site_name: String,
    /// Scope narrowing
    pub scope: TaskScope,
    /// Nodes the task operates on, in order
    pub node_list: Vec<String>,
    /// Current status
    pub status: TaskStatus,
    /// Outcome; meaningful once status is Complete
    pub result: ActionResult,
    /// Structured outcome breakdown
    pub result_detail: ResultDetail,
    /// Child task ids
    pub subtasks: Vec<Uuid>,
    /// When created
    pub created_at: DateTime<Utc>,
    /// When last updated
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new top-level task.
    pub fn new(
        action: OrchestratorAction,
        design_ref: impl Into<String>,
        site_name: impl Into<String>,
    ) -> Self {
        let site_name = site_name.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            action,
            design_ref: design_ref.into(),
            scope: TaskScope {
                site: site_name.clone(),
                ..TaskScope::default()
            },
            site_name,
            node_list: Vec::new(),
            status: TaskStatus::default(),
            result: ActionResult::default(),
            result_detail: ResultDetail::default(),
            subtasks: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the parent task.
    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Set the node list and mirror it into the scope.
    pub fn with_nodes(mut self, nodes: Vec<String>) -> Self {
        self.scope.node_names = nodes.clone();
        self.node_list = nodes;
        self
    }

    /// Replace the scope wholesale.
    pub fn with_scope(mut self, scope: TaskScope) -> Self {
        self.scope = scope;
        self
    }

    /// Check if the task can move to the given status.
    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Transition to a new status, rejecting regressions.
    pub fn transition_to(&mut self, new_status: TaskStatus) -> Result<(), String> {
        if !self.can_transition_to(new_status) {
            return Err(format!(
                "cannot transition from {} to {}",
                self.status.as_str(),
                new_status.as_str()
            ));
        }
        self.status = new_status;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Check if the task is finished.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Partial update applied atomically by the task store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFieldUpdate {
    pub status: Option<TaskStatus>,
    pub result: Option<ActionResult>,
    pub result_detail: Option<ResultDetail>,
}

impl TaskFieldUpdate {
    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn result(mut self, result: ActionResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn result_detail(mut self, detail: ResultDetail) -> Self {
        self.result_detail = Some(detail);
        self
    }

    /// The common "publish final outcome" update.
    pub fn complete(result: ActionResult, detail: ResultDetail) -> Self {
        Self::default()
            .status(TaskStatus::Complete)
            .result(result)
            .result_detail(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_monotone() {
        let mut task = Task::new(OrchestratorAction::IdentifyNode, "design-1", "site-a");
        assert_eq!(task.status, TaskStatus::Pending);

        task.transition_to(TaskStatus::Running).unwrap();
        task.transition_to(TaskStatus::Complete).unwrap();
        assert!(task.is_terminal());

        // No regression once complete
        assert!(task.transition_to(TaskStatus::Running).is_err());
        assert!(task.transition_to(TaskStatus::Pending).is_err());
    }

    #[test]
    fn test_pending_can_jump_to_complete() {
        let mut task = Task::new(OrchestratorAction::ValidateNodeServices, "d", "s");
        task.transition_to(TaskStatus::Complete).unwrap();
        assert!(task.is_terminal());
    }

    #[test]
    fn test_with_nodes_mirrors_scope() {
        let task = Task::new(OrchestratorAction::IdentifyNode, "d", "s")
            .with_nodes(vec!["n1".to_string(), "n2".to_string()]);
        assert_eq!(task.node_list, vec!["n1", "n2"]);
        assert_eq!(task.scope.node_names, vec!["n1", "n2"]);
        assert_eq!(task.scope.site, "s");
    }

    #[test]
    fn test_action_round_trip() {
        for action in [
            OrchestratorAction::ValidateNodeServices,
            OrchestratorAction::CreateNetworkTemplate,
            OrchestratorAction::IdentifyNode,
            OrchestratorAction::ConfigureHardware,
            OrchestratorAction::ApplyNodeNetworking,
            OrchestratorAction::ValidateOobServices,
            OrchestratorAction::ConfigNodePxe,
            OrchestratorAction::SetNodeBoot,
            OrchestratorAction::PowerOffNode,
            OrchestratorAction::PowerOnNode,
            OrchestratorAction::PowerCycleNode,
            OrchestratorAction::InterrogateOob,
        ] {
            assert_eq!(OrchestratorAction::from_str(action.as_str()), Some(action));
        }
    }

    #[test]
    fn test_action_classes() {
        assert_eq!(
            OrchestratorAction::ApplyNodeNetworking.class(),
            ActionClass::NodeProvision
        );
        assert_eq!(OrchestratorAction::PowerOnNode.class(), ActionClass::Oob);
    }

    #[test]
    fn test_result_detail_dedupes_nodes() {
        let mut detail = ResultDetail::default();
        detail.node_succeeded("n1");
        detail.node_succeeded("n1");
        detail.node_failed("n2");
        assert_eq!(detail.successful_nodes, vec!["n1"]);
        assert_eq!(detail.failed_nodes, vec!["n2"]);
    }
}
