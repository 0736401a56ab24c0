use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, warn};

use braid_core::traits::Node;
use braid_core::types::{DataMap, NodeResult, WorkflowState, NEXT_NODE_KEY};

use crate::mapping::to_object;

type LoopCondition = dyn Fn(&DataMap, &WorkflowState, usize) -> bool + Send + Sync;

const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Repeats a body node while a condition holds.
///
/// The condition sees the current input, the state threaded through earlier
/// iterations, and the zero-based iteration index. `max_iterations` is a hard
/// cap, not an error. A body pause or failure is surfaced immediately.
pub struct LoopNode {
    body: Arc<dyn Node>,
    condition: Box<LoopCondition>,
    max_iterations: usize,
}

impl LoopNode {
    pub fn new<F>(body: Arc<dyn Node>, condition: F) -> Self
    where
        F: Fn(&DataMap, &WorkflowState, usize) -> bool + Send + Sync + 'static,
    {
        Self {
            body,
            condition: Box::new(condition),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Run the body exactly `n` times (unless it pauses or fails).
    pub fn times(body: Arc<dyn Node>, n: usize) -> Self {
        Self::new(body, |_, _, _| true).max_iterations(n)
    }

    pub fn max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }
}

impl Node for LoopNode {
    fn execute<'a>(&'a self, input: DataMap, state: &'a WorkflowState) -> BoxFuture<'a, NodeResult> {
        Box::pin(async move {
            let mut current = state.clone();
            let mut input = input;
            let mut accumulated = DataMap::new();
            let mut iterations = Vec::new();

            while iterations.len() < self.max_iterations
                && (self.condition)(&input, &current, iterations.len())
            {
                let index = iterations.len();
                let mut result = self.body.execute(input.clone(), &current).await;
                result.output.remove(NEXT_NODE_KEY);
                result.next_node = None;

                if result.should_pause || !result.success {
                    debug!(
                        run_id = %state.run_id,
                        iteration = index,
                        paused = result.should_pause,
                        "Loop body interrupted"
                    );
                    let mut output = accumulated;
                    output.extend(std::mem::take(&mut result.output));
                    output.insert("iteration_count".to_string(), Value::from(index));
                    result.output = output;
                    return result;
                }

                current = current.merge(&result.output);
                for (k, v) in &result.output {
                    accumulated.insert(k.clone(), v.clone());
                    input.insert(k.clone(), v.clone());
                }
                iterations.push(to_object(result.output));
            }

            let count = iterations.len();
            if count == self.max_iterations {
                warn!(run_id = %state.run_id, max = self.max_iterations, "Loop hit iteration cap");
            }
            debug!(run_id = %state.run_id, iterations = count, "Loop finished");

            accumulated.insert("iterations".to_string(), Value::Array(iterations));
            accumulated.insert("iteration_count".to_string(), Value::from(count));
            NodeResult::success(accumulated)
        })
    }

    fn kind(&self) -> &str {
        "loop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::CallbackNode;
    use braid_core::types::{PauseReason, RunId};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn state() -> WorkflowState {
        WorkflowState::new("wf", RunId::from("r"), "loop")
    }

    fn counter_body() -> Arc<dyn Node> {
        Arc::new(CallbackNode::from_fn(|input, _| {
            let n = input.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
            let mut out = DataMap::new();
            out.insert("count".into(), json!(n + 1));
            out
        }))
    }

    #[tokio::test]
    async fn test_threads_output_between_iterations() {
        let node = LoopNode::new(counter_body(), |input, _, _| {
            input.get("count").and_then(|v| v.as_i64()).unwrap_or(0) < 3
        });
        let result = node.execute(DataMap::new(), &state()).await;

        assert!(result.success);
        assert_eq!(result.output["count"], json!(3));
        assert_eq!(result.output["iteration_count"], json!(3));
        assert_eq!(result.output["iterations"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_never_exceeds_max_iterations() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let body: Arc<dyn Node> = Arc::new(CallbackNode::from_fn(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
            DataMap::new()
        }));

        let node = LoopNode::new(body, |_, _, _| true).max_iterations(5);
        let result = node.execute(DataMap::new(), &state()).await;

        assert!(result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(result.output["iteration_count"], json!(5));
    }

    #[tokio::test]
    async fn test_condition_sees_merged_state_and_index() {
        let node = LoopNode::new(counter_body(), |_, state, index| {
            assert_eq!(
                state.get("count").and_then(|v| v.as_u64()).unwrap_or(0),
                index as u64
            );
            index < 2
        });
        let result = node.execute(DataMap::new(), &state()).await;
        assert_eq!(result.output["iteration_count"], json!(2));
    }

    #[tokio::test]
    async fn test_body_failure_surfaces_immediately() {
        let body: Arc<dyn Node> = Arc::new(CallbackNode::new(|input, _| {
            match input.get("count").and_then(|v| v.as_i64()) {
                Some(1) => Err(anyhow::anyhow!("second iteration failed")),
                other => Ok(NodeResult::empty().with_output("count", json!(other.unwrap_or(0) + 1))),
            }
        }));
        let node = LoopNode::times(body, 10);
        let result = node.execute(DataMap::new(), &state()).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("second iteration failed"));
    }

    #[tokio::test]
    async fn test_body_pause_carries_accumulated_output() {
        let body: Arc<dyn Node> = Arc::new(CallbackNode::new(|input, _| {
            let n = input.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
            if n == 2 {
                Ok(NodeResult::pause(PauseReason::new("halfway"), DataMap::new()))
            } else {
                Ok(NodeResult::empty().with_output("count", json!(n + 1)))
            }
        }));
        let node = LoopNode::times(body, 10);
        let result = node.execute(DataMap::new(), &state()).await;

        assert!(result.should_pause);
        assert_eq!(result.output["count"], json!(2));
        assert_eq!(result.output["iteration_count"], json!(2));
    }

    #[tokio::test]
    async fn test_body_branch_override_does_not_escape() {
        let body: Arc<dyn Node> = Arc::new(CallbackNode::new(|_, _| {
            Ok(NodeResult::empty().with_next_node("elsewhere"))
        }));
        let result = LoopNode::times(body, 2).execute(DataMap::new(), &state()).await;
        assert!(result.resolved_next_node().is_none());
    }
}
