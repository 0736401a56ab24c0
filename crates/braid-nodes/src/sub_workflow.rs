use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use braid_core::registry::{Reference, WorkflowRegistry};
use braid_core::traits::{Node, WorkflowRunner};
use braid_core::types::{
    DataMap, NodeResult, PauseReason, RunId, WorkflowContext, WorkflowResult, WorkflowState,
};

use crate::mapping::{into_output, to_object, InputMapping};

/// Pause-metadata key under which a child's pause is reported to the parent.
pub const SUB_WORKFLOW_KEY: &str = "sub_workflow";

/// Data key recording the paused child run for the node `node_id`.
pub fn child_run_key(node_id: &str) -> String {
    format!("_sub_workflow.{}.run_id", node_id)
}

/// Runs a nested workflow as one step.
///
/// The child's final data becomes this node's output (merged, or under
/// `output_key`). A child failure fails this node. A child pause pauses the
/// parent with the child's pause metadata nested under `sub_workflow`; when
/// the parent is resumed, the recorded child run is resumed with the same input.
pub struct SubWorkflowNode {
    workflow: Reference<dyn WorkflowRunner>,
    mapping: InputMapping,
    output_key: Option<String>,
}

impl SubWorkflowNode {
    pub fn new(workflow: Arc<dyn WorkflowRunner>) -> Self {
        Self::from_reference(Reference::bound(workflow))
    }

    pub fn registered(id: impl Into<String>, registry: Arc<WorkflowRegistry>) -> Self {
        Self::from_reference(Reference::registered(id, registry))
    }

    pub fn from_reference(workflow: Reference<dyn WorkflowRunner>) -> Self {
        Self {
            workflow,
            mapping: InputMapping::default(),
            output_key: None,
        }
    }

    pub fn mapping(mut self, mapping: InputMapping) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    fn child_context(&self, state: &WorkflowState, node_id: &str) -> WorkflowContext {
        WorkflowContext::new()
            .with_correlation_id(format!(
                "{}.{}.{}",
                state.run_id,
                node_id,
                Uuid::new_v4().simple()
            ))
            .with_metadata("parent_workflow_id", json!(state.workflow_id))
            .with_metadata("parent_run_id", json!(state.run_id.as_str()))
            .with_metadata("parent_node_id", json!(node_id))
    }
}

impl Node for SubWorkflowNode {
    fn execute<'a>(&'a self, input: DataMap, state: &'a WorkflowState) -> BoxFuture<'a, NodeResult> {
        Box::pin(async move {
            let runner = match self.workflow.resolve() {
                Ok(runner) => runner,
                Err(e) => return NodeResult::failure(e.to_string()),
            };
            let workflow_id = runner.workflow_id().to_string();
            let node_id = state
                .current_node
                .clone()
                .unwrap_or_else(|| workflow_id.clone());
            let run_key = child_run_key(&node_id);

            let pending = state.get_str(&run_key).map(RunId::from);
            let outcome = match &pending {
                Some(child_run) => {
                    info!(run_id = %state.run_id, child_run = %child_run, workflow = %workflow_id, "Resuming sub-workflow");
                    runner.resume(child_run, input).await
                }
                None => {
                    let args = self.mapping.resolve(&input, state);
                    let context = self.child_context(state, &node_id);
                    debug!(run_id = %state.run_id, workflow = %workflow_id, "Starting sub-workflow");
                    runner.run(args, context).await
                }
            };

            match outcome {
                Ok(WorkflowResult::Completed { state: child }) => {
                    debug!(run_id = %state.run_id, child_run = %child.run_id, "Sub-workflow completed");
                    let mut output =
                        into_output(to_object(child.data), self.output_key.as_deref(), "result");
                    if pending.is_some() {
                        output.insert(run_key, Value::Null);
                    }
                    NodeResult::success(output)
                }
                Ok(WorkflowResult::Paused {
                    state: child,
                    reason,
                }) => {
                    info!(run_id = %state.run_id, child_run = %child.run_id, "Sub-workflow paused");
                    let nested = json!({
                        "workflow_id": workflow_id,
                        "run_id": child.run_id.as_str(),
                        "node_id": node_id,
                        "pause": to_object(reason.metadata),
                    });
                    let parent_reason =
                        PauseReason::new(reason.message).with_metadata(SUB_WORKFLOW_KEY, nested);
                    let mut output = DataMap::new();
                    output.insert(run_key, Value::String(child.run_id.0));
                    NodeResult::pause(parent_reason, output)
                }
                Ok(WorkflowResult::Failed { reason, .. }) => {
                    warn!(run_id = %state.run_id, workflow = %workflow_id, reason = %reason, "Sub-workflow failed");
                    NodeResult::failure(format!("sub-workflow '{}' failed: {}", workflow_id, reason))
                }
                Ok(WorkflowResult::Cancelled { state: child }) => NodeResult::failure(format!(
                    "sub-workflow '{}' run {} was cancelled",
                    workflow_id, child.run_id
                )),
                Err(e) => {
                    warn!(run_id = %state.run_id, workflow = %workflow_id, error = %e, "Sub-workflow errored");
                    NodeResult::failure(e.to_string())
                }
            }
        })
    }

    fn kind(&self) -> &str {
        "sub_workflow"
    }
}
