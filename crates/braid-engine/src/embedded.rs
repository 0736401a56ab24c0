use std::sync::Arc;

use futures::future::BoxFuture;

use braid_core::error::Result;
use braid_core::traits::WorkflowRunner;
use braid_core::types::{DataMap, RunId, WorkflowContext, WorkflowResult};

use crate::definition::WorkflowDefinition;
use crate::persistent::PersistentWorkflowExecutor;

/// A definition plus the executor that runs it, usable as a nested workflow.
///
/// Child runs go through the same persistence decorator as top-level runs, so
/// a paused child can be resumed by id from a later process.
pub struct EmbeddedWorkflow {
    definition: Arc<WorkflowDefinition>,
    executor: Arc<PersistentWorkflowExecutor>,
}

impl EmbeddedWorkflow {
    pub fn new(definition: Arc<WorkflowDefinition>, executor: Arc<PersistentWorkflowExecutor>) -> Self {
        Self {
            definition,
            executor,
        }
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }
}

impl WorkflowRunner for EmbeddedWorkflow {
    fn workflow_id(&self) -> &str {
        &self.definition.id
    }

    fn run(&self, input: DataMap, context: WorkflowContext) -> BoxFuture<'_, Result<WorkflowResult>> {
        Box::pin(async move {
            self.executor
                .execute(&self.definition, input, Some(context))
                .await
        })
    }

    fn resume<'a>(&'a self, run_id: &'a RunId, input: DataMap) -> BoxFuture<'a, Result<WorkflowResult>> {
        Box::pin(async move {
            self.executor
                .resume_by_run_id(&self.definition, run_id, Some(input))
                .await
        })
    }
}
