//! Batch steps advance one iteration per invocation

use crate::helpers::*;
use stepwise::core::Position;
use stepwise::execution::{OrchestratorEvent, Response};

const BATCH_PIPELINE: &str = r#"
pipelines:
  - id: "demo"
    steps:
      - plugin: "batch"
        params: { name: "StepBatch", total: 3 }
"#;

#[tokio::test]
async fn test_batch_runs_across_three_invocations() {
    let harness = Harness::from_yaml(BATCH_PIPELINE).await;

    for expected in 1..=2u32 {
        let response = harness.orchestrator.run("demo").await.unwrap();
        match &response {
            Response::InProgress(status) => {
                assert_eq!(status.iteration, expected);
                assert_eq!(status.total_iterations, 3);
                assert_eq!(status.position, 0);
                assert_eq!(status.message, format!("Processed {} of 3", expected));
            }
            other => panic!("expected progress, got {:?}", other),
        }

        let progress = harness.store.get_batch_progress("demo").await.unwrap();
        assert_eq!(progress.batch_iteration(), expected);
        assert!(!progress.completed());
        let state = harness.store.get_state("demo").await.unwrap().unwrap();
        assert_eq!(state.position(), Position::At(0));
    }

    let last = harness.orchestrator.run("demo").await.unwrap();
    assert!(last.is_success());
    assert_eq!(last.executed(), ["StepBatch"]);
    assert_eq!(
        harness.executed(),
        vec!["StepBatch#1", "StepBatch#2", "StepBatch#3"]
    );
    assert_store_empty(harness.store.as_ref(), "demo").await;
}

#[tokio::test]
async fn test_batch_iterations_never_decrease() {
    let yaml = r#"
pipelines:
  - id: "demo"
    steps:
      - plugin: "record"
        params: { name: "Before" }
      - plugin: "batch"
        params: { name: "Chunks", total: 5 }
      - plugin: "record"
        params: { name: "After" }
"#;
    let harness = Harness::from_yaml(yaml).await;

    let mut last_iteration = 0;
    let mut invocations = 0;
    loop {
        invocations += 1;
        match harness.orchestrator.run("demo").await.unwrap() {
            Response::InProgress(status) => {
                assert!(status.iteration >= last_iteration);
                last_iteration = status.iteration;
            }
            Response::Success(summary) => {
                assert_eq!(summary.executed, vec!["Chunks", "After"]);
                break;
            }
            other => panic!("unexpected response {:?}", other),
        }
        assert!(invocations < 10, "batch never completed");
    }

    assert_eq!(invocations, 5);
    assert_eq!(harness.executed().first().map(String::as_str), Some("Before"));
    assert_eq!(harness.executed().last().map(String::as_str), Some("After"));
    assert_store_empty(harness.store.as_ref(), "demo").await;
}

#[tokio::test]
async fn test_single_iteration_batch_completes_in_one_run() {
    let yaml = r#"
pipelines:
  - id: "demo"
    steps:
      - plugin: "batch"
        params: { total: 1 }
      - plugin: "record"
"#;
    let harness = Harness::from_yaml(yaml).await;

    let response = harness.orchestrator.run("demo").await.unwrap();

    assert!(response.is_success());
    assert_eq!(harness.executed(), vec!["batch0#1", "record1"]);
}

#[tokio::test]
async fn test_batch_events_and_status() {
    let harness = Harness::from_yaml(BATCH_PIPELINE).await;
    harness.orchestrator.run("demo").await.unwrap();

    let status = harness.orchestrator.status("demo").await.unwrap();
    let batch = status.batch.unwrap();
    assert_eq!(batch.batch_iteration(), 1);
    assert_eq!(batch.status_message(), "Processed 1 of 3");

    assert!(harness.events().iter().any(|e| matches!(
        e,
        OrchestratorEvent::BatchIteration { iteration: 1, total_iterations: 3, .. }
    )));
}
