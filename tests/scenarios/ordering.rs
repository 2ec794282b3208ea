//! Plain steps run back to back in a single invocation

use crate::helpers::*;
use stepwise::execution::{OrchestratorEvent, Response};

#[tokio::test]
async fn test_plain_steps_run_in_order() {
    let yaml = r#"
pipelines:
  - id: "demo"
    steps:
      - plugin: "record"
        params: { name: "StepA" }
      - plugin: "record"
        params: { name: "StepB" }
"#;
    let harness = Harness::from_yaml(yaml).await;

    let response = harness.orchestrator.run("demo").await.unwrap();

    match &response {
        Response::Success(summary) => {
            assert_eq!(summary.pipeline_label, "demo");
            assert_eq!(summary.message, "demo completed successfully");
        }
        other => panic!("expected success, got {:?}", other),
    }
    assert_eq!(response.executed(), ["StepA", "StepB"]);
    assert_eq!(harness.executed(), vec!["StepA", "StepB"]);
    assert_store_empty(harness.store.as_ref(), "demo").await;
}

#[tokio::test]
async fn test_long_catalog_and_label_overrides() {
    let yaml = r#"
pipelines:
  - id: "etl"
    label: "Nightly ETL"
    steps:
      - plugin: "record"
        label: "Extract"
      - plugin: "record"
      - plugin: "record"
      - plugin: "record"
        label: "Load"
"#;
    let harness = Harness::from_yaml(yaml).await;

    let response = harness.orchestrator.run("etl").await.unwrap();

    assert!(response.is_success());
    // label overrides only change what is reported, not which step runs
    assert_eq!(response.executed(), ["Extract", "record1", "record2", "Load"]);
    assert_eq!(harness.executed(), vec!["record0", "record1", "record2", "record3"]);
    assert_store_empty(harness.store.as_ref(), "etl").await;
}

#[tokio::test]
async fn test_events_follow_the_run() {
    let yaml = r#"
pipelines:
  - id: "demo"
    label: "Demo"
    steps:
      - plugin: "record"
        params: { name: "StepA" }
"#;
    let harness = Harness::from_yaml(yaml).await;
    harness.orchestrator.run("demo").await.unwrap();

    let events = harness.events();
    assert_eq!(events.len(), 4);
    assert!(matches!(&events[0], OrchestratorEvent::RunStarted { pipeline_id, .. } if pipeline_id == "demo"));
    assert!(matches!(&events[1], OrchestratorEvent::StepStarted { step_label, position: 0, .. } if step_label == "StepA"));
    assert!(matches!(&events[2], OrchestratorEvent::StepCompleted { step_label, .. } if step_label == "StepA"));
    assert!(matches!(&events[3], OrchestratorEvent::PipelineSucceeded { pipeline_label } if pipeline_label == "Demo"));
}

#[tokio::test]
async fn test_pipelines_do_not_share_state() {
    let yaml = r#"
pipelines:
  - id: "first"
    steps:
      - plugin: "form"
  - id: "second"
    steps:
      - plugin: "record"
"#;
    let harness = Harness::from_yaml(yaml).await;

    let prompt = harness.orchestrator.run("first").await.unwrap();
    assert!(matches!(prompt, Response::Prompt(_)));

    assert!(harness.orchestrator.run("second").await.unwrap().is_success());
    assert!(harness.store.is_persisted("first").await.unwrap());
    assert_store_empty(harness.store.as_ref(), "second").await;
}
