use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::warn;

use braid_core::traits::Node;
use braid_core::types::{DataMap, NodeResult, WorkflowState};

type SyncCallback = dyn Fn(DataMap, &WorkflowState) -> anyhow::Result<NodeResult> + Send + Sync;
type AsyncCallback = dyn Fn(DataMap, WorkflowState) -> BoxFuture<'static, anyhow::Result<NodeResult>>
    + Send
    + Sync;

enum Callback {
    Sync(Box<SyncCallback>),
    Async(Box<AsyncCallback>),
}

/// Function-backed node.
///
/// Errors returned by the function and panics raised inside it both become
/// `NodeResult::failure`; nothing escapes to the executor.
pub struct CallbackNode {
    callback: Callback,
}

impl CallbackNode {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(DataMap, &WorkflowState) -> anyhow::Result<NodeResult> + Send + Sync + 'static,
    {
        Self {
            callback: Callback::Sync(Box::new(f)),
        }
    }

    /// Async variant. The future receives an owned snapshot of the state.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(DataMap, WorkflowState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<NodeResult>> + Send + 'static,
    {
        Self {
            callback: Callback::Async(Box::new(move |input, state| Box::pin(f(input, state)))),
        }
    }

    /// Infallible mapping from input/state to output.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(DataMap, &WorkflowState) -> DataMap + Send + Sync + 'static,
    {
        Self::new(move |input, state| Ok(NodeResult::success(f(input, state))))
    }
}

impl Node for CallbackNode {
    fn execute<'a>(&'a self, input: DataMap, state: &'a WorkflowState) -> BoxFuture<'a, NodeResult> {
        Box::pin(async move {
            let outcome = match &self.callback {
                Callback::Sync(f) => std::panic::catch_unwind(AssertUnwindSafe(|| f(input, state))),
                Callback::Async(f) => AssertUnwindSafe(f(input, state.clone())).catch_unwind().await,
            };

            match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    warn!(run_id = %state.run_id, error = %e, "Callback returned an error");
                    NodeResult::failure(format!("{:#}", e))
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(run_id = %state.run_id, panic = %message, "Callback panicked");
                    NodeResult::failure(format!("callback panicked: {}", message))
                }
            }
        })
    }

    fn kind(&self) -> &str {
        "callback"
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
