use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use braid_core::error::{BraidError, Result};
use braid_core::expr::{evaluate_condition, is_valid_condition};
use braid_core::traits::Node;
use braid_core::types::{DataMap, NodeResult, WorkflowState};

type Predicate = dyn Fn(&DataMap, &WorkflowState) -> bool + Send + Sync;

/// Two-way branch.
///
/// Emits `condition_result` and `branch` ("true"/"false") and, when a target is
/// configured for the taken branch, names it as the next node. Never fails.
pub struct ConditionNode {
    predicate: Box<Predicate>,
    on_true: Option<String>,
    on_false: Option<String>,
}

impl ConditionNode {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&DataMap, &WorkflowState) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Box::new(predicate),
            on_true: None,
            on_false: None,
        }
    }

    /// Predicate from an edge-style expression (`key == "v"`, `key != "v"`,
    /// `key contains "v"`), evaluated against the run data with the node
    /// input layered on top.
    pub fn expr(expr: impl Into<String>) -> Result<Self> {
        let expr = expr.into();
        if !is_valid_condition(&expr) {
            return Err(BraidError::InvalidDefinition(format!(
                "unsupported condition expression: {}",
                expr
            )));
        }
        Ok(Self::new(move |input, state| {
            let mut scope = state.data.clone();
            scope.extend(input.iter().map(|(k, v)| (k.clone(), v.clone())));
            evaluate_condition(&expr, &scope)
        }))
    }

    pub fn branches(mut self, on_true: impl Into<String>, on_false: impl Into<String>) -> Self {
        self.on_true = Some(on_true.into());
        self.on_false = Some(on_false.into());
        self
    }

    pub fn when_true(mut self, node_id: impl Into<String>) -> Self {
        self.on_true = Some(node_id.into());
        self
    }

    pub fn when_false(mut self, node_id: impl Into<String>) -> Self {
        self.on_false = Some(node_id.into());
        self
    }
}

impl Node for ConditionNode {
    fn execute<'a>(&'a self, input: DataMap, state: &'a WorkflowState) -> BoxFuture<'a, NodeResult> {
        Box::pin(async move {
            let outcome = (self.predicate)(&input, state);
            let (branch, target) = if outcome {
                ("true", self.on_true.as_ref())
            } else {
                ("false", self.on_false.as_ref())
            };
            debug!(run_id = %state.run_id, branch, target = ?target, "Condition evaluated");

            let result = NodeResult::empty()
                .with_output("condition_result", Value::Bool(outcome))
                .with_output("branch", Value::String(branch.to_string()));
            match target {
                Some(target) => result.with_next_node(target.clone()),
                None => result,
            }
        })
    }

    fn kind(&self) -> &str {
        "condition"
    }

    fn branch_targets(&self) -> Vec<String> {
        self.on_true.iter().chain(self.on_false.iter()).cloned().collect()
    }
}
