//! Persistence decorator contract: two writes per segment, resume rules,
//! cancellation and durability across executor instances.

use std::sync::Arc;

use serde_json::json;

use braid_core::error::BraidError;
use braid_core::traits::StateRepository;
use braid_core::types::{DataMap, RunId, WorkflowContext, WorkflowStatus};
use braid_engine::{PersistentWorkflowExecutor, WorkflowDefinition, WorkflowExecutor};
use braid_nodes::HumanInputNode;
use braid_store::{InMemoryStateRepository, SqliteStateRepository};
use braid_test_utils::{fail_node, set_node, temp_db_path, CountingNode, RecordingRepository};

fn linear(len: usize) -> WorkflowDefinition {
    let mut builder = WorkflowDefinition::builder("linear");
    for i in 0..len {
        builder = builder.node(format!("n{}", i), set_node(&format!("k{}", i), json!(i)));
        if i > 0 {
            builder = builder.edge(format!("n{}", i - 1), format!("n{}", i));
        }
    }
    builder.entry("n0").build().unwrap()
}

fn approval() -> WorkflowDefinition {
    WorkflowDefinition::builder("approval")
        .node("prepare", set_node("draft", json!("v1")))
        .node("ask", Arc::new(HumanInputNode::new("Continue?")))
        .node("publish", set_node("published", json!(true)))
        .edge("prepare", "ask")
        .edge("ask", "publish")
        .entry("prepare")
        .build()
        .unwrap()
}

fn answer(value: &str) -> DataMap {
    let mut input = DataMap::new();
    input.insert("human_input".into(), json!(value));
    input
}

#[tokio::test]
async fn execute_saves_exactly_twice_regardless_of_steps() {
    for len in [1, 5, 12] {
        let repo = Arc::new(RecordingRepository::new());
        let engine = PersistentWorkflowExecutor::new(WorkflowExecutor::new(), repo.clone());

        let result = engine
            .execute(&linear(len), DataMap::new(), None)
            .await
            .unwrap();

        assert!(result.is_completed());
        assert_eq!(result.state().step_count, len);
        assert_eq!(repo.save_count().await, 2);

        let saves = repo.saves().await;
        assert_eq!(saves[0].status, WorkflowStatus::Pending);
        assert_eq!(saves[0].current_node.as_deref(), Some("n0"));
        assert_eq!(saves[1].status, WorkflowStatus::Completed);
    }
}

#[tokio::test]
async fn failed_and_paused_segments_also_save_twice() {
    let repo = Arc::new(RecordingRepository::new());
    let engine = PersistentWorkflowExecutor::new(WorkflowExecutor::new(), repo.clone());
    let failing = WorkflowDefinition::builder("broken")
        .node("a", fail_node("nope"))
        .entry("a")
        .build()
        .unwrap();

    let result = engine.execute(&failing, DataMap::new(), None).await.unwrap();
    assert!(result.is_failed());
    assert_eq!(repo.save_count().await, 2);

    let result = engine.execute(&approval(), DataMap::new(), None).await.unwrap();
    assert!(result.is_paused());
    assert_eq!(repo.save_count().await, 4);
    assert_eq!(repo.saves().await[3].status, WorkflowStatus::Paused);
}

#[tokio::test]
async fn correlation_id_and_metadata_seed_the_run() {
    let repo = Arc::new(InMemoryStateRepository::new());
    let engine = PersistentWorkflowExecutor::new(WorkflowExecutor::new(), repo);
    let context = WorkflowContext::new()
        .with_correlation_id("order-42")
        .with_metadata("tenant", json!("acme"));

    let result = engine
        .execute(&linear(1), DataMap::new(), Some(context))
        .await
        .unwrap();

    assert_eq!(result.state().run_id, RunId::from("order-42"));
    assert_eq!(result.state().metadata["tenant"], json!("acme"));
    let stored = engine.get_state(&RunId::from("order-42")).await.unwrap();
    assert!(stored.is_some());
}

#[tokio::test]
async fn human_input_pause_and_resume_by_run_id() {
    let repo = Arc::new(RecordingRepository::new());
    let engine = PersistentWorkflowExecutor::new(WorkflowExecutor::new(), repo.clone());
    let def = approval();

    let paused = engine.execute(&def, DataMap::new(), None).await.unwrap();
    assert!(paused.is_paused());
    let reason = paused.pause_reason().unwrap();
    assert!(reason.message.contains("Continue?"));
    assert_eq!(reason.metadata["awaiting_input"], json!(true));
    let run_id = paused.state().run_id.clone();

    // reads are stable until resume
    let first = engine.get_state(&run_id).await.unwrap().unwrap();
    let second = engine.get_state(&run_id).await.unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.status, WorkflowStatus::Paused);
    assert_eq!(first.current_node.as_deref(), Some("ask"));

    let done = engine
        .resume_by_run_id(&def, &run_id, Some(answer("yes")))
        .await
        .unwrap();

    assert!(done.is_completed());
    let data = &done.state().data;
    assert_eq!(data["human_input"], json!("yes"));
    assert_eq!(data["published"], json!(true));
    assert_eq!(data["draft"], json!("v1"));
    assert_eq!(done.state().step_count, 4);
    assert_eq!(repo.save_count().await, 4);

    // pre-resume write is the paused snapshot
    let saves = repo.saves().await;
    assert_eq!(saves[2].status, WorkflowStatus::Paused);
}

#[tokio::test]
async fn resume_by_unknown_run_id_is_not_found() {
    let repo = Arc::new(RecordingRepository::new());
    let engine = PersistentWorkflowExecutor::new(WorkflowExecutor::new(), repo.clone());

    let err = engine
        .resume_by_run_id(&approval(), &RunId::from("ghost"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, BraidError::WorkflowNotFound(ref id) if id == "ghost"));
    assert_eq!(repo.save_count().await, 0);
}

#[tokio::test]
async fn resume_on_terminal_state_is_not_paused() {
    let repo = Arc::new(RecordingRepository::new());
    let engine = PersistentWorkflowExecutor::new(WorkflowExecutor::new(), repo.clone());
    let def = linear(2);

    let completed = engine.execute(&def, DataMap::new(), None).await.unwrap();
    let err = engine
        .resume(&def, completed.into_state(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, BraidError::WorkflowNotPaused { ref status, .. } if status == "completed"));

    let failing = WorkflowDefinition::builder("broken")
        .node("a", fail_node("nope"))
        .entry("a")
        .build()
        .unwrap();
    let failed = engine.execute(&failing, DataMap::new(), None).await.unwrap();
    let err = engine
        .resume(&failing, failed.into_state(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, BraidError::WorkflowNotPaused { .. }));

    // rejected before any write
    assert_eq!(repo.save_count().await, 4);
}

#[tokio::test]
async fn fatal_error_still_writes_failed_state() {
    let repo = Arc::new(RecordingRepository::new());
    let engine =
        PersistentWorkflowExecutor::new(WorkflowExecutor::new().max_steps(3), repo.clone());
    let spin = CountingNode::new("n");
    let def = WorkflowDefinition::builder("spin")
        .node("spin", spin.clone())
        .edge("spin", "spin")
        .entry("spin")
        .build()
        .unwrap();

    let err = engine
        .execute(
            &def,
            DataMap::new(),
            Some(WorkflowContext::new().with_correlation_id("cycle")),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BraidError::MaxStepsExceeded(3)));
    assert_eq!(spin.calls(), 3);
    assert_eq!(repo.save_count().await, 2);
    let stored = engine.get_state(&RunId::from("cycle")).await.unwrap().unwrap();
    assert_eq!(stored.status, WorkflowStatus::Failed);
    assert!(stored.error.unwrap().contains("max steps"));
}

#[tokio::test]
async fn cancel_paused_run() {
    let repo = Arc::new(RecordingRepository::new());
    let engine = PersistentWorkflowExecutor::new(WorkflowExecutor::new(), repo.clone());
    let def = approval();

    let paused = engine.execute(&def, DataMap::new(), None).await.unwrap();
    let run_id = paused.state().run_id.clone();

    let cancelled = engine.cancel(&run_id).await.unwrap();
    assert_eq!(cancelled.status, WorkflowStatus::Cancelled);
    assert!(cancelled.current_node.is_none());
    assert_eq!(repo.save_count().await, 3);

    let err = engine
        .resume_by_run_id(&def, &run_id, Some(answer("yes")))
        .await
        .unwrap_err();
    assert!(matches!(err, BraidError::WorkflowNotPaused { .. }));

    let err = engine.cancel(&run_id).await.unwrap_err();
    assert!(matches!(err, BraidError::WorkflowNotPaused { .. }));
}

#[tokio::test]
async fn paused_run_survives_a_new_process() {
    let path = temp_db_path();
    let def = approval();

    let run_id = {
        let repo = Arc::new(SqliteStateRepository::open(&path).unwrap());
        let engine = PersistentWorkflowExecutor::new(WorkflowExecutor::new(), repo);
        let paused = engine.execute(&def, DataMap::new(), None).await.unwrap();
        assert!(paused.is_paused());
        paused.state().run_id.clone()
    };

    let repo: Arc<dyn StateRepository> = Arc::new(SqliteStateRepository::open(&path).unwrap());
    let engine = PersistentWorkflowExecutor::new(WorkflowExecutor::new(), repo);
    let done = engine
        .resume_by_run_id(&def, &run_id, Some(answer("ship it")))
        .await
        .unwrap();

    assert!(done.is_completed());
    assert_eq!(done.state().data["human_input"], json!("ship it"));
    let stored = engine.get_state(&run_id).await.unwrap().unwrap();
    assert_eq!(stored.status, WorkflowStatus::Completed);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn single_checkpoint_resumed_from_returned_state() {
    let repo = Arc::new(InMemoryStateRepository::new());
    let engine = PersistentWorkflowExecutor::new(WorkflowExecutor::new(), repo);
    let def = WorkflowDefinition::builder("ask-only")
        .node("ask", Arc::new(HumanInputNode::new("Continue?")))
        .entry("ask")
        .build()
        .unwrap();

    let paused = engine.execute(&def, DataMap::new(), None).await.unwrap();
    assert!(paused.is_paused());
    assert!(paused.pause_reason().unwrap().message.contains("Continue?"));

    let done = engine
        .resume(&def, paused.into_state(), Some(answer("yes")))
        .await
        .unwrap();
    assert!(done.is_completed());
    assert_eq!(done.state().data["human_input"], json!("yes"));
}
