use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, warn};

use braid_core::registry::{AgentRegistry, Reference};
use braid_core::traits::{Agent, Node};
use braid_core::types::{DataMap, NodeResult, WorkflowState};

use crate::mapping::InputMapping;

/// Runs an agent with a prompt and mapped context.
///
/// The prompt comes from the mapped input under `prompt_key` when present,
/// otherwise from the fixed prompt. Output holds the reply under
/// `output_key` (default `response`), the agent name under `agent`, and any
/// structured extras the agent returned.
pub struct AgentNode {
    agent: Reference<dyn Agent>,
    prompt: Option<String>,
    mapping: InputMapping,
    prompt_key: String,
    output_key: String,
}

impl AgentNode {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self::from_reference(Reference::bound(agent))
    }

    pub fn registered(id: impl Into<String>, registry: Arc<AgentRegistry>) -> Self {
        Self::from_reference(Reference::registered(id, registry))
    }

    pub fn from_reference(agent: Reference<dyn Agent>) -> Self {
        Self {
            agent,
            prompt: None,
            mapping: InputMapping::default(),
            prompt_key: "prompt".to_string(),
            output_key: "response".to_string(),
        }
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn mapping(mut self, mapping: InputMapping) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn prompt_key(mut self, key: impl Into<String>) -> Self {
        self.prompt_key = key.into();
        self
    }

    pub fn output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }
}

impl Node for AgentNode {
    fn execute<'a>(&'a self, input: DataMap, state: &'a WorkflowState) -> BoxFuture<'a, NodeResult> {
        Box::pin(async move {
            let agent = match self.agent.resolve() {
                Ok(agent) => agent,
                Err(e) => return NodeResult::failure(e.to_string()),
            };
            let args = self.mapping.resolve(&input, state);

            let prompt = args
                .get(&self.prompt_key)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .or_else(|| self.prompt.clone());
            let Some(prompt) = prompt else {
                return NodeResult::failure(format!(
                    "agent '{}' has no prompt (set one or map '{}')",
                    agent.name(),
                    self.prompt_key
                ));
            };

            let name = agent.name().to_string();
            debug!(run_id = %state.run_id, agent = %name, "Running agent");
            match agent.run(prompt, args).await {
                Ok(response) => {
                    let mut output = response.data;
                    output.insert(self.output_key.clone(), Value::String(response.content));
                    output.insert("agent".to_string(), Value::String(name));
                    NodeResult::success(output)
                }
                Err(e) => {
                    warn!(run_id = %state.run_id, agent = %name, error = %e, "Agent failed");
                    NodeResult::failure(e.to_string())
                }
            }
        })
    }

    fn kind(&self) -> &str {
        "agent"
    }
}
