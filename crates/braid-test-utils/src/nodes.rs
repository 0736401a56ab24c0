use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use braid_core::traits::Node;
use braid_core::types::{DataMap, NodeResult, PauseReason, WorkflowState};

struct SetNode {
    key: String,
    value: Value,
}

impl Node for SetNode {
    fn execute<'a>(&'a self, _input: DataMap, _state: &'a WorkflowState) -> BoxFuture<'a, NodeResult> {
        Box::pin(async move { NodeResult::empty().with_output(self.key.clone(), self.value.clone()) })
    }
}

/// Node writing `key = value`.
pub fn set_node(key: &str, value: Value) -> Arc<dyn Node> {
    Arc::new(SetNode {
        key: key.to_string(),
        value,
    })
}

struct FailNode(String);

impl Node for FailNode {
    fn execute<'a>(&'a self, _input: DataMap, _state: &'a WorkflowState) -> BoxFuture<'a, NodeResult> {
        Box::pin(async move { NodeResult::failure(self.0.clone()) })
    }
}

pub fn fail_node(message: &str) -> Arc<dyn Node> {
    Arc::new(FailNode(message.to_string()))
}

struct PauseNode(String);

impl Node for PauseNode {
    fn execute<'a>(&'a self, _input: DataMap, _state: &'a WorkflowState) -> BoxFuture<'a, NodeResult> {
        Box::pin(async move { NodeResult::pause(PauseReason::new(self.0.clone()), DataMap::new()) })
    }
}

/// Node that pauses on every entry.
pub fn pause_node(message: &str) -> Arc<dyn Node> {
    Arc::new(PauseNode(message.to_string()))
}

/// Counts its executions and records the count under `key`.
pub struct CountingNode {
    key: String,
    calls: AtomicUsize,
}

impl CountingNode {
    pub fn new(key: &str) -> Arc<Self> {
        Arc::new(Self {
            key: key.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Node for CountingNode {
    fn execute<'a>(&'a self, _input: DataMap, _state: &'a WorkflowState) -> BoxFuture<'a, NodeResult> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Box::pin(async move { NodeResult::empty().with_output(self.key.clone(), Value::from(n)) })
    }
}
