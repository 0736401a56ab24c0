//! Nested workflows run through a shared repository.

use std::sync::Arc;

use serde_json::json;

use braid_core::traits::StateRepository;
use braid_core::types::{DataMap, RunId, RunFilter, WorkflowStatus};
use braid_engine::{EmbeddedWorkflow, PersistentWorkflowExecutor, WorkflowDefinition, WorkflowExecutor};
use braid_nodes::{
    child_run_key, CallbackNode, HumanInputNode, InputMapping, SubWorkflowNode, SUB_WORKFLOW_KEY,
};
use braid_store::InMemoryStateRepository;
use braid_test_utils::{fail_node, set_node};

fn engine(repo: Arc<InMemoryStateRepository>) -> Arc<PersistentWorkflowExecutor> {
    Arc::new(PersistentWorkflowExecutor::new(WorkflowExecutor::new(), repo))
}

fn parent(child: WorkflowDefinition, engine: &Arc<PersistentWorkflowExecutor>) -> WorkflowDefinition {
    let embedded = EmbeddedWorkflow::new(Arc::new(child), engine.clone());
    WorkflowDefinition::builder("parent")
        .node("intake", set_node("ticket", json!("T-1")))
        .node(
            "review",
            Arc::new(
                SubWorkflowNode::new(Arc::new(embedded))
                    .mapping(InputMapping::fixed([("ticket", "$state.ticket")])),
            ),
        )
        .node("archive", set_node("archived", json!(true)))
        .edge("intake", "review")
        .edge("review", "archive")
        .entry("intake")
        .build()
        .unwrap()
}

#[tokio::test]
async fn completed_child_data_flows_into_parent() {
    let repo = Arc::new(InMemoryStateRepository::new());
    let engine = engine(repo.clone());
    let score = CallbackNode::from_fn(|input, _| {
        let mut out = DataMap::new();
        out.insert("score".into(), json!(7));
        out.insert(
            "scored_ticket".into(),
            input.get("ticket").cloned().unwrap_or_default(),
        );
        out
    });
    let child = WorkflowDefinition::builder("child")
        .node("score", Arc::new(score))
        .entry("score")
        .build()
        .unwrap();
    let def = parent(child, &engine);

    let result = engine.execute(&def, DataMap::new(), None).await.unwrap();

    assert!(result.is_completed());
    let data = &result.state().data;
    assert_eq!(data["score"], json!(7));
    assert_eq!(data["scored_ticket"], json!("T-1"));
    assert_eq!(data["ticket"], json!("T-1"));
    assert_eq!(data["archived"], json!(true));

    // parent and child are both recorded
    let runs = repo.list(&RunFilter::default()).await.unwrap();
    assert_eq!(runs.len(), 2);
    let child_run = runs.iter().find(|r| r.workflow_id == "child").unwrap();
    let child_state = repo.find(&child_run.run_id).await.unwrap().unwrap();
    // the mapped input reaches the child's entry node, not the child's state
    assert_eq!(child_state.data["scored_ticket"], json!("T-1"));
    assert!(!child_state.data.contains_key("ticket"));
    assert_eq!(
        child_state.metadata["parent_run_id"],
        json!(result.state().run_id.as_str())
    );
    assert_eq!(child_state.metadata["parent_node_id"], json!("review"));
}

#[tokio::test]
async fn failed_child_fails_parent() {
    let repo = Arc::new(InMemoryStateRepository::new());
    let engine = engine(repo);
    let child = WorkflowDefinition::builder("child")
        .node("boom", fail_node("quota exhausted"))
        .entry("boom")
        .build()
        .unwrap();
    let def = parent(child, &engine);

    let result = engine.execute(&def, DataMap::new(), None).await.unwrap();

    assert!(result.is_failed());
    let error = result.error().unwrap();
    assert!(error.contains("child"));
    assert!(error.contains("quota exhausted"));
    assert!(!result.state().data.contains_key("archived"));
}

#[tokio::test]
async fn child_pause_propagates_and_parent_resume_finishes_child() {
    let repo = Arc::new(InMemoryStateRepository::new());
    let engine = engine(repo.clone());
    let child = WorkflowDefinition::builder("child")
        .node("ask", Arc::new(HumanInputNode::new("Approve ticket?")))
        .node("stamp", set_node("approved_by", json!("reviewer")))
        .edge("ask", "stamp")
        .entry("ask")
        .build()
        .unwrap();
    let def = parent(child, &engine);

    let paused = engine.execute(&def, DataMap::new(), None).await.unwrap();
    assert!(paused.is_paused());
    assert_eq!(paused.state().current_node.as_deref(), Some("review"));

    let reason = paused.pause_reason().unwrap();
    assert_eq!(reason.message, "Approve ticket?");
    let nested = &reason.metadata[SUB_WORKFLOW_KEY];
    assert_eq!(nested["workflow_id"], json!("child"));
    assert_eq!(nested["node_id"], json!("review"));
    assert_eq!(nested["pause"]["awaiting_input"], json!(true));

    let child_run = RunId::from(
        paused.state().data[&child_run_key("review")]
            .as_str()
            .unwrap(),
    );
    assert_eq!(nested["run_id"], json!(child_run.as_str()));
    let child_state = repo.find(&child_run).await.unwrap().unwrap();
    assert_eq!(child_state.status, WorkflowStatus::Paused);

    let parent_run = paused.state().run_id.clone();
    let mut answer = DataMap::new();
    answer.insert("human_input".into(), json!("approve"));
    let done = engine
        .resume_by_run_id(&def, &parent_run, Some(answer))
        .await
        .unwrap();

    assert!(done.is_completed());
    let data = &done.state().data;
    assert_eq!(data["human_input"], json!("approve"));
    assert_eq!(data["approved_by"], json!("reviewer"));
    assert_eq!(data["archived"], json!(true));
    assert!(data[&child_run_key("review")].is_null());

    let child_state = repo.find(&child_run).await.unwrap().unwrap();
    assert_eq!(child_state.status, WorkflowStatus::Completed);
}
