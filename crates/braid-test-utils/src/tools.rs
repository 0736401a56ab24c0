use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;

use braid_core::error::{BraidError, Result};
use braid_core::traits::Tool;
use braid_core::types::DataMap;

/// Returns its input as a JSON object.
pub struct EchoTool;

impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the input back"
    }

    fn execute(&self, input: DataMap) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move { Ok(Value::Object(input.into_iter().collect())) })
    }
}

/// Always fails with the configured message.
pub struct FailingTool {
    message: String,
}

impl FailingTool {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Tool for FailingTool {
    fn name(&self) -> &str {
        "failing"
    }

    fn execute(&self, _input: DataMap) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            Err(BraidError::ToolExecution {
                tool: "failing".into(),
                message: self.message.clone(),
            })
        })
    }
}

/// Sleeps for `delay` before answering, with a declared timeout.
pub struct SlowTool {
    delay: Duration,
    timeout_secs: u64,
}

impl SlowTool {
    pub fn new(delay: Duration, timeout_secs: u64) -> Self {
        Self {
            delay,
            timeout_secs,
        }
    }
}

impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow"
    }

    fn execute(&self, _input: DataMap) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(Value::String("done".into()))
        })
    }

    fn timeout_secs(&self) -> Option<u64> {
        Some(self.timeout_secs)
    }
}
