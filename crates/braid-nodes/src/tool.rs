use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tracing::{debug, warn};

use braid_core::error::BraidError;
use braid_core::registry::{Reference, ToolRegistry};
use braid_core::traits::{Node, Tool};
use braid_core::types::{DataMap, NodeResult, WorkflowState};

use crate::mapping::{into_output, InputMapping};

const DEFAULT_OUTPUT_KEY: &str = "result";

/// Invokes a tool with mapped input.
///
/// The tool's own `timeout_secs` is enforced here. Object results merge into
/// the node output; anything else lands under `output_key` (default `result`).
pub struct ToolNode {
    tool: Reference<dyn Tool>,
    mapping: InputMapping,
    output_key: Option<String>,
}

impl ToolNode {
    pub fn new(tool: Arc<dyn Tool>) -> Self {
        Self::from_reference(Reference::bound(tool))
    }

    /// Tool resolved by id from `registry` at execution time.
    pub fn registered(id: impl Into<String>, registry: Arc<ToolRegistry>) -> Self {
        Self::from_reference(Reference::registered(id, registry))
    }

    pub fn from_reference(tool: Reference<dyn Tool>) -> Self {
        Self {
            tool,
            mapping: InputMapping::default(),
            output_key: None,
        }
    }

    pub fn mapping(mut self, mapping: InputMapping) -> Self {
        self.mapping = mapping;
        self
    }

    /// Put the whole result under `key`, even when it is an object.
    pub fn output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }
}

impl Node for ToolNode {
    fn execute<'a>(&'a self, input: DataMap, state: &'a WorkflowState) -> BoxFuture<'a, NodeResult> {
        Box::pin(async move {
            let tool = match self.tool.resolve() {
                Ok(tool) => tool,
                Err(e) => return NodeResult::failure(e.to_string()),
            };
            let args = self.mapping.resolve(&input, state);
            let name = tool.name().to_string();
            debug!(run_id = %state.run_id, tool = %name, "Invoking tool");

            let start = Instant::now();
            let call = tool.execute(args);
            let outcome = match tool.timeout_secs() {
                Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), call).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(BraidError::ToolTimeout {
                        tool: name.clone(),
                        timeout_secs: secs,
                    }),
                },
                None => call.await,
            };

            match outcome {
                Ok(value) => {
                    debug!(
                        run_id = %state.run_id,
                        tool = %name,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Tool finished"
                    );
                    NodeResult::success(into_output(
                        value,
                        self.output_key.as_deref(),
                        DEFAULT_OUTPUT_KEY,
                    ))
                }
                Err(e) => {
                    warn!(run_id = %state.run_id, tool = %name, error = %e, "Tool failed");
                    NodeResult::failure(e.to_string())
                }
            }
        })
    }

    fn kind(&self) -> &str {
        "tool"
    }
}
