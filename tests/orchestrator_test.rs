//! Orchestrator routing tests.

mod common;

use std::sync::Arc;

use mockito::Server;
use uuid::Uuid;

use slipway::application::{Orchestrator, TaskRequest};
use slipway::domain::models::{
    ActionResult, OrchestratorAction, OrchestratorConfig, SiteDesign, TaskStatus,
};
use slipway::domain::ports::{StaticDesignResolver, TokioClock};
use slipway::domain::DriverError;

fn orchestrator(store: &Arc<dyn slipway::domain::ports::TaskStore>, base_url: &str) -> Orchestrator {
    let config = OrchestratorConfig {
        metal: common::metal_config(base_url),
        bmc: common::bmc_config(),
        ..OrchestratorConfig::default()
    };
    Orchestrator::new(
        Arc::clone(store),
        Arc::new(StaticDesignResolver::new(SiteDesign::default())),
        Arc::new(TokioClock),
        &config,
    )
}

#[tokio::test]
async fn test_create_task_persists_with_scope() {
    let store = common::store().await;
    let orchestrator = orchestrator(&store, "http://127.0.0.1:9");

    let task = orchestrator
        .create_task(TaskRequest {
            parent_id: None,
            action: OrchestratorAction::IdentifyNode,
            design_ref: "design-1".to_string(),
            site_name: "site-a".to_string(),
            node_list: vec!["n1".to_string()],
        })
        .await
        .unwrap();

    let loaded = orchestrator.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(loaded.action, OrchestratorAction::IdentifyNode);
    assert_eq!(loaded.node_list, vec!["n1"]);
    assert_eq!(loaded.scope.node_names, vec!["n1"]);
    assert_eq!(loaded.status, TaskStatus::Pending);
}

#[tokio::test]
async fn test_routes_node_action_and_returns_completed_task() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/version/")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;
    server
        .mock("GET", "/account/")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let store = common::store().await;
    let orchestrator = orchestrator(&store, &server.url());
    let task = orchestrator
        .create_task(TaskRequest {
            parent_id: None,
            action: OrchestratorAction::ValidateNodeServices,
            design_ref: "design-1".to_string(),
            site_name: "site-a".to_string(),
            node_list: Vec::new(),
        })
        .await
        .unwrap();

    let task = orchestrator.execute_task(task.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Complete);
    assert_eq!(task.result, ActionResult::Success);
}

#[tokio::test]
async fn test_unknown_task_is_usage_error() {
    let store = common::store().await;
    let orchestrator = orchestrator(&store, "http://127.0.0.1:9");
    let err = orchestrator.execute_task(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, DriverError::Usage(_)));
}
