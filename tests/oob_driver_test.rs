//! Out-of-band action tests: power convergence, non-convergence, probe
//! validation, and full pool dispatch.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mockito::{Matcher, Server};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use slipway::application::actions::oob::{run_oob_op, OobContext, OobOp};
use slipway::application::{OobDriver, PollBudget};
use slipway::domain::models::design::OobEndpoint;
use slipway::domain::models::{ActionResult, OrchestratorAction, SiteDesign, TaskStatus};
use slipway::domain::ports::{NullClock, StaticDesignResolver, TaskStore, TokioClock};

const SYSTEM_PATH: &str = "/redfish/v1/Systems/self/";
const RESET_PATH: &str = "/redfish/v1/Systems/self/Actions/ComputerSystem.Reset/";

fn oob_design(address: &str) -> SiteDesign {
    let mut node = common::node("n1", "aa:aa:aa:aa:aa:01", "rack", &[]);
    node.oob = OobEndpoint {
        oob_type: "redfish".to_string(),
        address: address.to_string(),
        mac: None,
        account: "root".to_string(),
        credential: "calvin".to_string(),
        network: None,
    };
    SiteDesign {
        site_name: "site-a".to_string(),
        baremetal_nodes: vec![node],
        ..SiteDesign::default()
    }
}

fn system_body(power: &str) -> String {
    json!({
        "PowerState": power,
        "Manufacturer": "Example",
        "Model": "EX-1",
        "SerialNumber": "0001",
        "Boot": {"BootSourceOverrideTarget": "Pxe", "BootSourceOverrideEnabled": "Once"}
    })
    .to_string()
}

#[tokio::test]
async fn test_power_on_converges_after_reset() {
    let mut server = Server::new_async().await;
    // Off until the reset lands, On afterwards
    let calls = Arc::new(AtomicUsize::new(0));
    server
        .mock("GET", SYSTEM_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body_from_request({
            let calls = Arc::clone(&calls);
            move |_| {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    system_body("Off").into_bytes()
                } else {
                    system_body("On").into_bytes()
                }
            }
        })
        .create_async()
        .await;
    let reset = server
        .mock("POST", RESET_PATH)
        .match_body(Matcher::PartialJsonString(r#"{"ResetType": "On"}"#.to_string()))
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let design = oob_design(&server.host_with_port());
    let task = common::parent_task(OrchestratorAction::PowerOnNode, &["n1"]);
    let ctx = OobContext {
        config: common::bmc_config(),
        clock: Arc::new(NullClock::new()),
    };

    let outcome = run_oob_op(OobOp::PowerOn, &task, &design, &ctx).await.unwrap();

    assert_eq!(outcome.result, ActionResult::Success);
    assert_eq!(outcome.detail.successful_nodes, vec!["n1"]);
    reset.assert_async().await;
}

#[tokio::test]
async fn test_power_state_never_converges_is_retryable_failure() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", SYSTEM_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(system_body("Off"))
        .create_async()
        .await;
    server
        .mock("POST", RESET_PATH)
        .with_status(204)
        .create_async()
        .await;

    let design = oob_design(&server.host_with_port());
    let task = common::parent_task(OrchestratorAction::PowerOnNode, &["n1"]);
    let clock = Arc::new(NullClock::new());
    let ctx = OobContext {
        config: common::bmc_config(),
        clock: Arc::clone(&clock) as Arc<dyn slipway::domain::ports::Clock>,
    };

    let outcome = run_oob_op(OobOp::PowerOn, &task, &design, &ctx).await.unwrap();

    assert_eq!(outcome.result, ActionResult::Failure);
    assert_eq!(outcome.detail.retry, Some(true));
    assert_eq!(outcome.detail.failed_nodes, vec!["n1"]);
    // One poll per retry of the power budget
    assert_eq!(clock.sleep_count(), 18);
}

#[tokio::test]
async fn test_validate_oob_services() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/redfish/v1/")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;
    server
        .mock("GET", SYSTEM_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(system_body("On"))
        .create_async()
        .await;

    let design = oob_design(&server.host_with_port());
    let task = common::parent_task(OrchestratorAction::ValidateOobServices, &["n1"]);
    let ctx = OobContext {
        config: common::bmc_config(),
        clock: Arc::new(NullClock::new()),
    };

    let outcome = run_oob_op(OobOp::Validate, &task, &design, &ctx).await.unwrap();
    assert_eq!(outcome.result, ActionResult::Success);
}

#[tokio::test]
async fn test_set_node_boot_verifies_override() {
    let mut server = Server::new_async().await;
    server
        .mock("PATCH", SYSTEM_PATH)
        .match_body(Matcher::PartialJsonString(
            r#"{"Boot": {"BootSourceOverrideTarget": "Pxe"}}"#.to_string(),
        ))
        .with_status(204)
        .expect(1)
        .create_async()
        .await;
    server
        .mock("GET", SYSTEM_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(system_body("On"))
        .create_async()
        .await;

    let design = oob_design(&server.host_with_port());
    let task = common::parent_task(OrchestratorAction::SetNodeBoot, &["n1"]);
    let ctx = OobContext {
        config: common::bmc_config(),
        clock: Arc::new(NullClock::new()),
    };

    let outcome = run_oob_op(OobOp::SetBoot, &task, &design, &ctx).await.unwrap();
    assert_eq!(outcome.result, ActionResult::Success);
}

#[tokio::test]
async fn test_interrogate_reports_inventory() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", SYSTEM_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(system_body("On"))
        .create_async()
        .await;

    let design = oob_design(&server.host_with_port());
    let task = common::parent_task(OrchestratorAction::InterrogateOob, &["n1"]);
    let ctx = OobContext {
        config: common::bmc_config(),
        clock: Arc::new(NullClock::new()),
    };

    let outcome = run_oob_op(OobOp::Interrogate, &task, &design, &ctx)
        .await
        .unwrap();
    assert_eq!(outcome.result, ActionResult::Success);
    assert!(outcome
        .detail
        .detail
        .iter()
        .any(|m| m.contains("manufacturer=Example") && m.contains("model=EX-1")));
}

#[tokio::test]
async fn test_driver_dispatch_aggregates_worker_outcomes() {
    let mut server = Server::new_async().await;
    // Already powered on: the worker succeeds without a reset
    server
        .mock("GET", SYSTEM_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(system_body("On"))
        .create_async()
        .await;
    let no_reset = server
        .mock("POST", RESET_PATH)
        .expect(0)
        .create_async()
        .await;

    let store = common::store().await;
    let design = oob_design(&server.host_with_port());
    let driver = OobDriver::new(
        Arc::clone(&store),
        Arc::new(StaticDesignResolver::new(design)),
        Arc::new(TokioClock),
        common::bmc_config(),
    )
    .with_pool_wait(PollBudget::new(300, std::time::Duration::from_millis(10)));

    let parent = common::parent_task(OrchestratorAction::PowerOnNode, &["n1"]);
    store.create_task(&parent).await.unwrap();

    driver
        .execute_task(parent.id, CancellationToken::new())
        .await
        .unwrap();

    let parent = store.get_task(parent.id).await.unwrap().unwrap();
    assert_eq!(parent.status, TaskStatus::Complete);
    assert_eq!(parent.result, ActionResult::Success);
    assert_eq!(parent.result_detail.successful_nodes, vec!["n1"]);
    assert_eq!(parent.subtasks.len(), 1);
    no_reset.assert_async().await;
}
