use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use braid_core::config::EngineConfig;
use braid_core::error::{BraidError, Result};
use braid_core::event::EventBus;
use braid_core::types::{
    DataMap, PauseReason, WorkflowEvent, WorkflowResult, WorkflowState, WorkflowStatus,
    NEXT_NODE_KEY,
};

use crate::definition::WorkflowDefinition;

const DEFAULT_MAX_STEPS: usize = 100;

/// Walks a workflow graph from a run's current node.
///
/// `resume` is the only entry point: a fresh `Pending` state positioned at the
/// entry node starts a run, a `Paused` state continues one. Each segment ends
/// in exactly one of completed, failed, paused or cancelled, or in a fatal
/// error (`NodeNotFound`, `MaxStepsExceeded`) that aborts the loop.
///
/// Nothing is persisted here; see `PersistentWorkflowExecutor`.
#[derive(Clone)]
pub struct WorkflowExecutor {
    max_steps: usize,
    event_bus: Option<Arc<EventBus>>,
    cancel: Option<CancellationToken>,
}

impl Default for WorkflowExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowExecutor {
    pub fn new() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            event_bus: None,
            cancel: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new().max_steps(config.max_steps)
    }

    /// Node executions allowed per segment.
    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Checked before every node; a cancelled token ends the run as `Cancelled`.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn step_limit(&self) -> usize {
        self.max_steps
    }

    pub fn event_bus(&self) -> Option<&Arc<EventBus>> {
        self.event_bus.as_ref()
    }

    pub(crate) fn emit(&self, event: WorkflowEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    /// Run one segment. Each node's output (minus `_next_node`) becomes the
    /// next node's input.
    pub async fn resume(
        &self,
        definition: &WorkflowDefinition,
        state: WorkflowState,
        input: DataMap,
    ) -> Result<WorkflowResult> {
        if state.workflow_id != definition.id {
            return Err(BraidError::InvalidDefinition(format!(
                "run {} belongs to workflow '{}', not '{}'",
                state.run_id, state.workflow_id, definition.id
            )));
        }
        if state.is_terminal() {
            debug!(run_id = %state.run_id, status = %state.status, "Run already terminal");
            return Ok(settled(state));
        }

        let mut state = state.running();
        let mut input = input;
        let mut steps = 0usize;
        let run_id = state.run_id.clone();

        info!(
            run_id = %run_id,
            workflow = %definition.id,
            node_id = ?state.current_node,
            "Workflow segment started"
        );
        self.emit(WorkflowEvent::RunStarted {
            run_id: run_id.clone(),
            workflow_id: definition.id.clone(),
            node_id: state.current_node.clone(),
        });

        loop {
            if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                info!(run_id = %run_id, "Workflow cancelled");
                self.emit(WorkflowEvent::RunCancelled {
                    run_id: run_id.clone(),
                });
                return Ok(WorkflowResult::Cancelled {
                    state: state.cancelled(),
                });
            }

            let Some(node_id) = state.current_node.clone() else {
                // A running state without a position has nothing left to do.
                self.emit(WorkflowEvent::RunCompleted {
                    run_id: run_id.clone(),
                    steps,
                });
                return Ok(WorkflowResult::Completed {
                    state: state.completed(),
                });
            };

            if steps >= self.max_steps {
                error!(run_id = %run_id, max_steps = self.max_steps, node_id = %node_id, "Step budget exceeded");
                let err = BraidError::MaxStepsExceeded(self.max_steps);
                self.emit(WorkflowEvent::RunFailed {
                    run_id: run_id.clone(),
                    error: err.to_string(),
                });
                return Err(err);
            }

            let Some(node) = definition.node(&node_id) else {
                error!(run_id = %run_id, node_id = %node_id, "Node not found");
                let err = BraidError::NodeNotFound {
                    workflow: definition.id.clone(),
                    node: node_id,
                };
                self.emit(WorkflowEvent::RunFailed {
                    run_id: run_id.clone(),
                    error: err.to_string(),
                });
                return Err(err);
            };

            steps += 1;
            state.step_count += 1;
            debug!(run_id = %run_id, node_id = %node_id, kind = node.kind(), step = steps, "Executing node");
            self.emit(WorkflowEvent::NodeStarted {
                run_id: run_id.clone(),
                node_id: node_id.clone(),
                step: state.step_count,
            });

            let node_start = Instant::now();
            let mut result = node.execute(input, &state).await;
            let elapsed_ms = node_start.elapsed().as_millis() as u64;

            let next_override = result.resolved_next_node();
            result.output.remove(NEXT_NODE_KEY);

            if result.should_pause {
                let reason = result
                    .pause_reason
                    .take()
                    .unwrap_or_else(|| PauseReason::new(format!("paused at node '{}'", node_id)));
                info!(run_id = %run_id, node_id = %node_id, reason = %reason, "Workflow paused");
                self.emit(WorkflowEvent::RunPaused {
                    run_id: run_id.clone(),
                    node_id,
                    reason: reason.message.clone(),
                });
                let state = state.merge(&result.output).paused(reason.clone());
                return Ok(WorkflowResult::Paused { state, reason });
            }

            if !result.success {
                let reason = result
                    .error
                    .take()
                    .unwrap_or_else(|| format!("node '{}' failed", node_id));
                warn!(run_id = %run_id, node_id = %node_id, error = %reason, "Node failed");
                self.emit(WorkflowEvent::NodeFailed {
                    run_id: run_id.clone(),
                    node_id,
                    error: reason.clone(),
                });
                self.emit(WorkflowEvent::RunFailed {
                    run_id: run_id.clone(),
                    error: reason.clone(),
                });
                return Ok(WorkflowResult::Failed {
                    state: state.failed(reason.clone()),
                    reason,
                });
            }

            self.emit(WorkflowEvent::NodeCompleted {
                run_id: run_id.clone(),
                node_id: node_id.clone(),
                elapsed_ms,
            });
            state = state.merge(&result.output);

            let next = next_override
                .or_else(|| definition.successor(&node_id, &state.data).map(str::to_string));
            match next {
                Some(next) => {
                    debug!(run_id = %run_id, from = %node_id, to = %next, "Advancing");
                    state = state.advance_to(next);
                    input = result.output;
                }
                None => {
                    info!(run_id = %run_id, steps = state.step_count, "Workflow completed");
                    self.emit(WorkflowEvent::RunCompleted {
                        run_id: run_id.clone(),
                        steps: state.step_count,
                    });
                    return Ok(WorkflowResult::Completed {
                        state: state.completed(),
                    });
                }
            }
        }
    }
}

/// Result for a state that is already terminal.
fn settled(state: WorkflowState) -> WorkflowResult {
    match state.status {
        WorkflowStatus::Failed => {
            let reason = state.error.clone().unwrap_or_default();
            WorkflowResult::Failed { state, reason }
        }
        WorkflowStatus::Cancelled => WorkflowResult::Cancelled { state },
        _ => WorkflowResult::Completed { state },
    }
}
