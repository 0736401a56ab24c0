use std::sync::Arc;

use tracing::{debug, info, warn};

use braid_core::error::{BraidError, Result};
use braid_core::traits::StateRepository;
use braid_core::types::{
    DataMap, RunId, WorkflowContext, WorkflowEvent, WorkflowResult, WorkflowState, WorkflowStatus,
};

use crate::definition::WorkflowDefinition;
use crate::executor::WorkflowExecutor;

/// Persistence decorator around `WorkflowExecutor`.
///
/// Every `execute`/`resume` call writes the run exactly twice: the state it
/// is about to run, and the state the segment ended in. Nothing is written per
/// node, so the last durable snapshot is always a segment boundary.
pub struct PersistentWorkflowExecutor {
    executor: WorkflowExecutor,
    repository: Arc<dyn StateRepository>,
}

impl PersistentWorkflowExecutor {
    pub fn new(executor: WorkflowExecutor, repository: Arc<dyn StateRepository>) -> Self {
        Self {
            executor,
            repository,
        }
    }

    pub fn executor(&self) -> &WorkflowExecutor {
        &self.executor
    }

    pub fn repository(&self) -> &Arc<dyn StateRepository> {
        &self.repository
    }

    /// Start a new run. The run id is the context's correlation id, or a
    /// fresh uuid; the context metadata is copied into the run state.
    pub async fn execute(
        &self,
        definition: &WorkflowDefinition,
        input: DataMap,
        context: Option<WorkflowContext>,
    ) -> Result<WorkflowResult> {
        let context = context.unwrap_or_default();
        let run_id = context
            .correlation_id
            .map(RunId::from)
            .unwrap_or_default();
        let state = WorkflowState::new(definition.id.clone(), run_id, definition.entry_node())
            .with_metadata(context.metadata);

        debug!(run_id = %state.run_id, workflow = %definition.id, "Starting run");
        self.run_segment(definition, state, input).await
    }

    /// Continue a paused run. Any other status is rejected before anything is
    /// written or executed.
    pub async fn resume(
        &self,
        definition: &WorkflowDefinition,
        state: WorkflowState,
        input: Option<DataMap>,
    ) -> Result<WorkflowResult> {
        if !state.is_paused() {
            return Err(BraidError::WorkflowNotPaused {
                run_id: state.run_id.to_string(),
                status: state.status.to_string(),
            });
        }
        if state.workflow_id != definition.id {
            return Err(BraidError::InvalidDefinition(format!(
                "run {} belongs to workflow '{}', not '{}'",
                state.run_id, state.workflow_id, definition.id
            )));
        }

        info!(run_id = %state.run_id, node_id = ?state.current_node, "Resuming run");
        self.run_segment(definition, state, input.unwrap_or_default())
            .await
    }

    pub async fn resume_by_run_id(
        &self,
        definition: &WorkflowDefinition,
        run_id: &RunId,
        input: Option<DataMap>,
    ) -> Result<WorkflowResult> {
        let state = self.load(run_id).await?;
        self.resume(definition, state, input).await
    }

    /// Pass-through read; `None` when the run is unknown.
    pub async fn get_state(&self, run_id: &RunId) -> Result<Option<WorkflowState>> {
        self.repository.find(run_id).await
    }

    /// Mark a pending or paused run `Cancelled` (one write).
    pub async fn cancel(&self, run_id: &RunId) -> Result<WorkflowState> {
        let state = self.load(run_id).await?;
        if !matches!(state.status, WorkflowStatus::Pending | WorkflowStatus::Paused) {
            return Err(BraidError::WorkflowNotPaused {
                run_id: run_id.to_string(),
                status: state.status.to_string(),
            });
        }

        let state = state.cancelled();
        self.repository.save(&state).await?;
        info!(run_id = %run_id, "Run cancelled");
        self.executor.emit(WorkflowEvent::RunCancelled {
            run_id: run_id.clone(),
        });
        Ok(state)
    }

    async fn load(&self, run_id: &RunId) -> Result<WorkflowState> {
        self.repository
            .find(run_id)
            .await?
            .ok_or_else(|| BraidError::WorkflowNotFound(run_id.to_string()))
    }

    async fn run_segment(
        &self,
        definition: &WorkflowDefinition,
        state: WorkflowState,
        input: DataMap,
    ) -> Result<WorkflowResult> {
        self.repository.save(&state).await?;

        match self
            .executor
            .resume(definition, state.clone(), input)
            .await
        {
            Ok(result) => {
                self.repository.save(result.state()).await?;
                debug!(run_id = %result.state().run_id, status = %result.status(), "Segment persisted");
                Ok(result)
            }
            Err(e) => {
                let failed = state.failed(e.to_string());
                if let Err(save_err) = self.repository.save(&failed).await {
                    warn!(run_id = %failed.run_id, error = %save_err, "Failed to persist aborted run");
                }
                Err(e)
            }
        }
    }
}
