use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use serde_json::Value;
use tracing::{debug, warn};

use braid_core::config::EngineConfig;
use braid_core::traits::Node;
use braid_core::types::{DataMap, NodeResult, PauseReason, WorkflowState, NEXT_NODE_KEY};

use crate::mapping::to_object;

/// Per-child outcomes, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ParallelOutcome {
    pub results: Vec<(String, DataMap)>,
    pub errors: Vec<(String, String)>,
}

impl ParallelOutcome {
    /// `{child_id: output}` object.
    pub fn results_object(&self) -> Value {
        Value::Object(
            self.results
                .iter()
                .map(|(id, out)| (id.clone(), to_object(out.clone())))
                .collect(),
        )
    }

    pub fn errors_object(&self) -> Value {
        Value::Object(
            self.errors
                .iter()
                .map(|(id, e)| (id.clone(), Value::String(e.clone())))
                .collect(),
        )
    }

    /// Successful child outputs shallow-merged in declaration order.
    pub fn flattened(&self) -> DataMap {
        let mut merged = DataMap::new();
        for (_, output) in &self.results {
            merged.extend(output.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }

    fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|(id, e)| format!("{}: {}", id, e))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

type MergeFn = dyn Fn(&ParallelOutcome) -> NodeResult + Send + Sync;

/// How child outcomes combine into the parallel node's result.
#[derive(Clone)]
pub enum MergeStrategy {
    /// Every child must succeed.
    All,
    /// At least one child must succeed.
    Any,
    Custom(Arc<MergeFn>),
}

impl MergeStrategy {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&ParallelOutcome) -> NodeResult + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    fn merge(&self, outcome: &ParallelOutcome) -> NodeResult {
        match self {
            Self::All if !outcome.errors.is_empty() => {
                NodeResult::failure(format!("parallel children failed: {}", outcome.error_summary()))
                    .with_output("parallel_errors", outcome.errors_object())
            }
            Self::All => NodeResult::success(outcome.flattened())
                .with_output("parallel_results", outcome.results_object()),
            Self::Any if outcome.results.is_empty() => {
                let detail = if outcome.errors.is_empty() {
                    "no children".to_string()
                } else {
                    outcome.error_summary()
                };
                NodeResult::failure(format!("all parallel children failed: {}", detail))
            }
            Self::Any => NodeResult::success(outcome.flattened())
                .with_output("parallel_results", outcome.results_object())
                .with_output("parallel_errors", outcome.errors_object()),
            Self::Custom(f) => f(outcome),
        }
    }
}

impl std::fmt::Debug for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::Any => f.write_str("Any"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Fan-out over a fixed set of children.
///
/// Children run in declaration order by default; `concurrent(true)` runs them
/// together with `join_all`. Either way `ParallelOutcome` lists results in
/// declaration order, and `parallel_results` is an object keyed by child id
/// (JSON object keys carry no order). A child pause short-circuits the merge
/// and pauses the parallel node with the paused child's output plus whatever
/// results were already collected.
pub struct ParallelNode {
    children: Vec<(String, Arc<dyn Node>)>,
    strategy: MergeStrategy,
    concurrent: bool,
}

impl ParallelNode {
    pub fn new(strategy: MergeStrategy) -> Self {
        Self {
            children: Vec::new(),
            strategy,
            concurrent: false,
        }
    }

    /// Concurrency taken from `[engine] concurrent_parallel`.
    pub fn from_config(strategy: MergeStrategy, config: &EngineConfig) -> Self {
        Self::new(strategy).concurrent(config.concurrent_parallel)
    }

    pub fn child(mut self, id: impl Into<String>, node: Arc<dyn Node>) -> Self {
        self.children.push((id.into(), node));
        self
    }

    pub fn concurrent(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    async fn run_children(&self, input: &DataMap, state: &WorkflowState) -> Vec<(String, NodeResult)> {
        if self.concurrent {
            let calls = self.children.iter().map(|(id, node)| {
                let input = input.clone();
                async move { (id.clone(), node.execute(input, state).await) }
            });
            return join_all(calls).await;
        }

        let mut results = Vec::with_capacity(self.children.len());
        for (id, node) in &self.children {
            let result = node.execute(input.clone(), state).await;
            let paused = result.should_pause;
            results.push((id.clone(), result));
            if paused {
                break;
            }
        }
        results
    }
}

impl Node for ParallelNode {
    fn execute<'a>(&'a self, input: DataMap, state: &'a WorkflowState) -> BoxFuture<'a, NodeResult> {
        Box::pin(async move {
            let mut outcome = ParallelOutcome::default();
            let mut pause: Option<(String, PauseReason, DataMap)> = None;

            for (id, mut result) in self.run_children(&input, state).await {
                result.output.remove(NEXT_NODE_KEY);
                if result.should_pause {
                    if pause.is_none() {
                        let reason = result.pause_reason.unwrap_or_default();
                        pause = Some((id, reason, result.output));
                    }
                } else if result.success {
                    debug!(run_id = %state.run_id, child = %id, "Parallel child succeeded");
                    outcome.results.push((id, result.output));
                } else {
                    let error = result.error.unwrap_or_else(|| "unknown error".to_string());
                    warn!(run_id = %state.run_id, child = %id, error = %error, "Parallel child failed");
                    outcome.errors.push((id, error));
                }
            }

            if let Some((child, reason, child_output)) = pause {
                debug!(run_id = %state.run_id, child = %child, "Parallel child requested pause");
                let reason = reason.with_metadata("parallel_child", Value::String(child));
                // the paused child's own output (e.g. an input marker) must reach the run state
                let mut output = child_output;
                output.insert("parallel_results".to_string(), outcome.results_object());
                return NodeResult::pause(reason, output);
            }

            self.strategy.merge(&outcome)
        })
    }

    fn kind(&self) -> &str {
        "parallel"
    }
}
