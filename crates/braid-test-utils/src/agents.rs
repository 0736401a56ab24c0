use std::sync::Mutex;

use futures::future::BoxFuture;

use braid_core::error::Result;
use braid_core::traits::{Agent, AgentResponse};
use braid_core::types::DataMap;

/// Agent that always replies with the same text and records the prompts it saw.
pub struct StaticAgent {
    name: String,
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl StaticAgent {
    pub fn new(name: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reply: reply.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Agent for StaticAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, prompt: String, _input: DataMap) -> BoxFuture<'_, Result<AgentResponse>> {
        self.prompts.lock().unwrap().push(prompt);
        Box::pin(async move { Ok(AgentResponse::text(self.reply.clone())) })
    }
}
