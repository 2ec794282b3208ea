//! Form steps suspend the run until the form is submitted

use crate::helpers::*;
use stepwise::core::Position;
use stepwise::execution::{OrchestratorEvent, Response};

const FORM_PIPELINE: &str = r#"
pipelines:
  - id: "demo"
    steps:
      - plugin: "record"
        params: { name: "StepA" }
      - plugin: "form"
        params: { name: "StepForm", fields: ["graph"] }
      - plugin: "record"
        params: { name: "StepC" }
"#;

#[tokio::test]
async fn test_form_suspends_and_resumes() {
    let harness = Harness::from_yaml(FORM_PIPELINE).await;

    let first = harness.orchestrator.run("demo").await.unwrap();
    match &first {
        Response::Prompt(prompt) => {
            assert_eq!(prompt.step_label, "StepForm");
            assert_eq!(prompt.position, 1);
            assert_eq!(prompt.prompt.missing, vec!["graph"]);
            assert_eq!(prompt.executed, vec!["StepA"]);
        }
        other => panic!("expected prompt, got {:?}", other),
    }

    let state = harness.store.get_state("demo").await.unwrap().unwrap();
    assert_eq!(state.position(), Position::At(1));
    assert_eq!(harness.executed(), vec!["StepA"]);

    harness.forms.submit(values(&[("graph", "g1")]));
    let second = harness.orchestrator.run("demo").await.unwrap();

    assert!(second.is_success());
    assert_eq!(second.executed(), ["StepForm", "StepC"]);
    // StepA is not run again
    assert_eq!(harness.executed(), vec!["StepA", "StepForm", "StepC"]);
    assert_store_empty(harness.store.as_ref(), "demo").await;
}

#[tokio::test]
async fn test_unsubmitted_form_keeps_prompting_the_same_step() {
    let harness = Harness::from_yaml(FORM_PIPELINE).await;

    for _ in 0..3 {
        let response = harness.orchestrator.run("demo").await.unwrap();
        assert!(matches!(response, Response::Prompt(ref p) if p.step_label == "StepForm"));
    }

    assert_eq!(harness.executed(), vec!["StepA"]);
    let state = harness.store.get_state("demo").await.unwrap().unwrap();
    assert_eq!(state.position(), Position::At(1));

    let events = harness.events();
    let resumed = events
        .iter()
        .filter(|e| matches!(e, OrchestratorEvent::RunResumed { position: Position::At(1), .. }))
        .count();
    assert_eq!(resumed, 2);
}

#[tokio::test]
async fn test_state_metadata_records_owner() {
    let harness = Harness::from_yaml(FORM_PIPELINE).await;
    harness.orchestrator.run("demo").await.unwrap();

    let status = harness.orchestrator.status("demo").await.unwrap();
    assert_eq!(status.state.unwrap().position(), Position::At(1));
    assert_eq!(status.metadata.unwrap().owner, "tester");
    assert!(status.batch.is_none());
}

#[tokio::test]
async fn test_submitted_values_reach_later_invocations() {
    let yaml = r#"
pipelines:
  - id: "demo"
    steps:
      - plugin: "form"
        params: { name: "Pick", fields: ["graph"] }
      - plugin: "batch"
        params: { name: "Import", total: 2 }
"#;
    let harness = Harness::from_yaml(yaml).await;

    harness.orchestrator.run("demo").await.unwrap();
    harness.forms.submit(values(&[("graph", "g1")]));

    let response = harness.orchestrator.run("demo").await.unwrap();
    assert!(matches!(response, Response::InProgress(_)));

    let data = harness.store.get_run_data("demo").await.unwrap();
    assert_eq!(data.get("graph").and_then(|v| v.as_str()), Some("g1"));

    // the form is behind us now, so withdrawing it changes nothing
    harness.forms.withdraw();
    assert!(harness.orchestrator.run("demo").await.unwrap().is_success());
    assert_store_empty(harness.store.as_ref(), "demo").await;
}
