use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::Result;
use crate::types::*;

/// Node: one unit of graph-scheduled work.
///
/// Nodes never return errors: collaborator failures are mapped to
/// `NodeResult::failure` so the executor loop only deals in values.
pub trait Node: Send + Sync + 'static {
    /// Execute against the incoming input and a snapshot of the run state.
    fn execute<'a>(&'a self, input: DataMap, state: &'a WorkflowState)
        -> BoxFuture<'a, NodeResult>;

    /// Short label used in logs and events.
    fn kind(&self) -> &str {
        "node"
    }

    /// Node ids this node may name as `next_node`. Checked when a definition is built.
    fn branch_targets(&self) -> Vec<String> {
        Vec::new()
    }
}

/// State repository: durable store for run state between segments.
///
/// `save` is latest-wins per run id.
pub trait StateRepository: Send + Sync + 'static {
    fn save<'a>(&'a self, state: &'a WorkflowState) -> BoxFuture<'a, Result<()>>;

    fn find<'a>(&'a self, run_id: &'a RunId) -> BoxFuture<'a, Result<Option<WorkflowState>>>;

    /// Runs matching the filter, most recently updated first.
    fn list<'a>(&'a self, filter: &'a RunFilter) -> BoxFuture<'a, Result<Vec<RunSummary>>>;

    fn delete<'a>(&'a self, run_id: &'a RunId) -> BoxFuture<'a, Result<bool>>;
}

/// Tool: external capability invoked by `ToolNode`.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (registry key by default).
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn execute(&self, input: DataMap) -> BoxFuture<'_, Result<Value>>;

    /// Execution timeout enforced by the calling node. `None` = unbounded.
    fn timeout_secs(&self) -> Option<u64> {
        None
    }
}

/// Response from an agent run.
#[derive(Debug, Clone, Default)]
pub struct AgentResponse {
    pub content: String,
    /// Structured extras merged into the node output.
    pub data: DataMap,
}

impl AgentResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            data: DataMap::new(),
        }
    }
}

/// Agent: language-model agent invoked by `AgentNode`.
pub trait Agent: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn run(&self, prompt: String, input: DataMap) -> BoxFuture<'_, Result<AgentResponse>>;
}

/// Workflow runner: a nested workflow invoked by `SubWorkflowNode`.
pub trait WorkflowRunner: Send + Sync + 'static {
    fn workflow_id(&self) -> &str;

    /// Start a new run of the nested workflow.
    fn run(&self, input: DataMap, context: WorkflowContext) -> BoxFuture<'_, Result<WorkflowResult>>;

    /// Continue a paused run of the nested workflow.
    fn resume<'a>(&'a self, run_id: &'a RunId, input: DataMap)
        -> BoxFuture<'a, Result<WorkflowResult>>;
}

/// Schema validator: validates human input against a JSON-schema object.
pub trait SchemaValidator: Send + Sync + 'static {
    /// `Err` carries one message per violation.
    fn validate(&self, value: &Value, schema: &Value) -> std::result::Result<(), Vec<String>>;
}
