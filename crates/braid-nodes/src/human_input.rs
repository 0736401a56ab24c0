use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use braid_core::traits::{Node, SchemaValidator};
use braid_core::types::{DataMap, NodeResult, PauseReason, WorkflowState};

use crate::schema::BasicSchemaValidator;

/// Input key carrying the human's response on resume.
pub const HUMAN_INPUT_KEY: &str = "human_input";
/// Data key naming the human-input node a run is paused on.
pub const AWAITING_INPUT_KEY: &str = "_awaiting_input";

/// Human-in-the-loop checkpoint.
///
/// On first entry it pauses the run with `{awaiting_input, prompt, schema,
/// timeout}` as pause metadata and records its own id under
/// `_awaiting_input`. When re-entered with `human_input` in the input it
/// validates the response (if a schema is set) and records it.
///
/// A `human_input` value only counts as this node's answer while the marker is
/// absent or names this node, so a response forwarded from an earlier
/// checkpoint never satisfies a later one.
pub struct HumanInputNode {
    prompt: String,
    schema: Option<Value>,
    timeout_secs: Option<u64>,
    validator: Arc<dyn SchemaValidator>,
}

impl HumanInputNode {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            schema: None,
            timeout_secs: None,
            validator: Arc::new(BasicSchemaValidator),
        }
    }

    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Surfaced to the caller only; the engine does not enforce it.
    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    fn accepts_response(&self, input: &DataMap, state: &WorkflowState) -> bool {
        if !input.contains_key(HUMAN_INPUT_KEY) {
            return false;
        }
        match state.data.get(AWAITING_INPUT_KEY) {
            None => true,
            Some(Value::String(waiting_on)) => state.current_node.as_deref() == Some(waiting_on),
            Some(_) => false,
        }
    }

    fn request(&self, state: &WorkflowState) -> NodeResult {
        let payload = json!({
            "awaiting_input": true,
            "prompt": self.prompt,
            "schema": self.schema,
            "timeout": self.timeout_secs,
        });
        let mut reason = PauseReason::new(self.prompt.clone());
        if let Value::Object(map) = payload {
            reason.metadata.extend(map);
        }

        let marker = state
            .current_node
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null);
        info!(run_id = %state.run_id, node_id = ?state.current_node, "Awaiting human input");

        let mut output = DataMap::new();
        output.insert(AWAITING_INPUT_KEY.to_string(), marker);
        NodeResult::pause(reason, output)
    }
}

impl Node for HumanInputNode {
    fn execute<'a>(&'a self, input: DataMap, state: &'a WorkflowState) -> BoxFuture<'a, NodeResult> {
        Box::pin(async move {
            if !self.accepts_response(&input, state) {
                return self.request(state);
            }

            let response = input.get(HUMAN_INPUT_KEY).cloned().unwrap_or(Value::Null);
            if let Some(schema) = &self.schema {
                if let Err(errors) = self.validator.validate(&response, schema) {
                    warn!(run_id = %state.run_id, errors = ?errors, "Human input failed validation");
                    return NodeResult::failure(format!(
                        "human input failed validation: {}",
                        errors.join("; ")
                    ))
                    .with_output("validation_errors", json!(errors));
                }
            }

            debug!(run_id = %state.run_id, "Human input accepted");
            let mut output = DataMap::new();
            output.insert(HUMAN_INPUT_KEY.to_string(), response);
            output.insert(AWAITING_INPUT_KEY.to_string(), Value::Null);
            NodeResult::success(output)
        })
    }

    fn kind(&self) -> &str {
        "human_input"
    }
}
