use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::BraidError;

/// Run-scoped working memory: string keys, JSON values.
pub type DataMap = HashMap<String, Value>;

/// Output key a node uses to name the next node explicitly.
pub const NEXT_NODE_KEY: &str = "_next_node";

/// Unique run identifier. Also the resumption key.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RunId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    /// Completed, Failed and Cancelled runs never advance again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = BraidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(BraidError::Validation(format!(
                "unknown workflow status: {}",
                other
            ))),
        }
    }
}

/// Why a run is paused, plus whatever the caller needs to resume it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PauseReason {
    pub message: String,
    #[serde(default)]
    pub metadata: DataMap,
}

impl PauseReason {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            metadata: DataMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl std::fmt::Display for PauseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Mutable record of one run. Persisted between segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub workflow_id: String,
    pub run_id: RunId,
    /// Node to execute next; `None` once the run is terminal.
    pub current_node: Option<String>,
    pub status: WorkflowStatus,
    #[serde(default)]
    pub data: DataMap,
    /// Caller metadata copied from the context that started the run.
    #[serde(default)]
    pub metadata: DataMap,
    #[serde(default)]
    pub pause_reason: Option<PauseReason>,
    #[serde(default)]
    pub error: Option<String>,
    /// Node executions across all segments of this run.
    #[serde(default)]
    pub step_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    /// A fresh `Pending` run positioned at `entry_node`.
    pub fn new(workflow_id: impl Into<String>, run_id: RunId, entry_node: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            workflow_id: workflow_id.into(),
            run_id,
            current_node: Some(entry_node.into()),
            status: WorkflowStatus::Pending,
            data: DataMap::new(),
            metadata: DataMap::new(),
            pause_reason: None,
            error: None,
            step_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_metadata(mut self, metadata: DataMap) -> Self {
        self.metadata = metadata;
        self
    }

    /// New state with `partial` shallow-merged over `data` (overwrites on conflict).
    pub fn merge(&self, partial: &DataMap) -> Self {
        let mut next = self.clone();
        for (k, v) in partial {
            next.data.insert(k.clone(), v.clone());
        }
        next
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    pub fn is_paused(&self) -> bool {
        self.status == WorkflowStatus::Paused
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Mark the run as actively advancing and drop any stale pause.
    pub fn running(mut self) -> Self {
        self.status = WorkflowStatus::Running;
        self.pause_reason = None;
        self.touch();
        self
    }

    pub fn advance_to(mut self, node_id: impl Into<String>) -> Self {
        self.current_node = Some(node_id.into());
        self.status = WorkflowStatus::Running;
        self.touch();
        self
    }

    /// Pause in place: `current_node` stays on the node that asked for input.
    pub fn paused(mut self, reason: PauseReason) -> Self {
        self.status = WorkflowStatus::Paused;
        self.pause_reason = Some(reason);
        self.touch();
        self
    }

    pub fn completed(mut self) -> Self {
        self.status = WorkflowStatus::Completed;
        self.current_node = None;
        self.pause_reason = None;
        self.touch();
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.status = WorkflowStatus::Failed;
        self.current_node = None;
        self.pause_reason = None;
        self.error = Some(error.into());
        self.touch();
        self
    }

    pub fn cancelled(mut self) -> Self {
        self.status = WorkflowStatus::Cancelled;
        self.current_node = None;
        self.pause_reason = None;
        self.touch();
        self
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Outcome of one node execution. Only its effect on `WorkflowState` is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeResult {
    pub success: bool,
    pub output: DataMap,
    pub error: Option<String>,
    /// Independent of `success`: a node can succeed and still ask to pause.
    pub should_pause: bool,
    pub pause_reason: Option<PauseReason>,
    /// Explicit branch target, overriding the definition's edges.
    pub next_node: Option<String>,
}

impl NodeResult {
    pub fn success(output: DataMap) -> Self {
        Self {
            success: true,
            output,
            error: None,
            should_pause: false,
            pause_reason: None,
            next_node: None,
        }
    }

    pub fn empty() -> Self {
        Self::success(DataMap::new())
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: DataMap::new(),
            error: Some(error.into()),
            should_pause: false,
            pause_reason: None,
            next_node: None,
        }
    }

    pub fn pause(reason: PauseReason, output: DataMap) -> Self {
        Self {
            success: true,
            output,
            error: None,
            should_pause: true,
            pause_reason: Some(reason),
            next_node: None,
        }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: Value) -> Self {
        self.output.insert(key.into(), value);
        self
    }

    /// Name the next node. Recorded both on the result and under `_next_node`.
    pub fn with_next_node(mut self, node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        self.output
            .insert(NEXT_NODE_KEY.to_string(), Value::String(node_id.clone()));
        self.next_node = Some(node_id);
        self
    }

    /// The branch override, from the field or the `_next_node` output key.
    pub fn resolved_next_node(&self) -> Option<String> {
        self.next_node.clone().or_else(|| {
            self.output
                .get(NEXT_NODE_KEY)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
    }
}

/// Per-call context supplied by the caller. Never persisted as such.
#[derive(Debug, Clone, Default)]
pub struct WorkflowContext {
    /// Run id for a new run.
    pub correlation_id: Option<String>,
    pub metadata: DataMap,
}

impl WorkflowContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Outcome of one execution segment.
#[derive(Debug, Clone)]
pub enum WorkflowResult {
    Completed { state: WorkflowState },
    Failed { state: WorkflowState, reason: String },
    Paused { state: WorkflowState, reason: PauseReason },
    Cancelled { state: WorkflowState },
}

impl WorkflowResult {
    pub fn state(&self) -> &WorkflowState {
        match self {
            Self::Completed { state }
            | Self::Failed { state, .. }
            | Self::Paused { state, .. }
            | Self::Cancelled { state } => state,
        }
    }

    pub fn into_state(self) -> WorkflowState {
        match self {
            Self::Completed { state }
            | Self::Failed { state, .. }
            | Self::Paused { state, .. }
            | Self::Cancelled { state } => state,
        }
    }

    pub fn status(&self) -> WorkflowStatus {
        self.state().status
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { reason, .. } => Some(reason),
            _ => None,
        }
    }

    pub fn pause_reason(&self) -> Option<&PauseReason> {
        match self {
            Self::Paused { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Listing row for persisted runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub workflow_id: String,
    pub status: WorkflowStatus,
    pub current_node: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&WorkflowState> for RunSummary {
    fn from(state: &WorkflowState) -> Self {
        Self {
            run_id: state.run_id.clone(),
            workflow_id: state.workflow_id.clone(),
            status: state.status,
            current_node: state.current_node.clone(),
            updated_at: state.updated_at,
        }
    }
}

/// Filter for `StateRepository::list`.
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub status: Option<WorkflowStatus>,
    pub workflow_id: Option<String>,
    pub limit: Option<usize>,
}

impl RunFilter {
    pub fn matches(&self, state: &WorkflowState) -> bool {
        self.status.map_or(true, |s| s == state.status)
            && self
                .workflow_id
                .as_deref()
                .map_or(true, |w| w == state.workflow_id)
    }
}

/// Engine event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// A segment started (fresh run or resume).
    RunStarted {
        run_id: RunId,
        workflow_id: String,
        node_id: Option<String>,
    },
    NodeStarted {
        run_id: RunId,
        node_id: String,
        step: usize,
    },
    NodeCompleted {
        run_id: RunId,
        node_id: String,
        elapsed_ms: u64,
    },
    NodeFailed {
        run_id: RunId,
        node_id: String,
        error: String,
    },
    RunPaused {
        run_id: RunId,
        node_id: String,
        reason: String,
    },
    RunCompleted { run_id: RunId, steps: usize },
    RunFailed { run_id: RunId, error: String },
    RunCancelled { run_id: RunId },
}

impl WorkflowEvent {
    pub fn run_id(&self) -> &RunId {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::NodeStarted { run_id, .. }
            | Self::NodeCompleted { run_id, .. }
            | Self::NodeFailed { run_id, .. }
            | Self::RunPaused { run_id, .. }
            | Self::RunCompleted { run_id, .. }
            | Self::RunFailed { run_id, .. }
            | Self::RunCancelled { run_id } => run_id,
        }
    }

    /// True for events after which the segment is over.
    pub fn ends_segment(&self) -> bool {
        matches!(
            self,
            Self::RunPaused { .. }
                | Self::RunCompleted { .. }
                | Self::RunFailed { .. }
                | Self::RunCancelled { .. }
        )
    }
}
