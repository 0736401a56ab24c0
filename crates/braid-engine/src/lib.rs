//! Workflow engine.
//!
//! A `WorkflowDefinition` is an immutable graph of nodes and edges. The
//! `WorkflowExecutor` walks it from a run's current node until the run
//! completes, fails, pauses or is cancelled. The `PersistentWorkflowExecutor`
//! wraps it with exactly two repository writes per segment so a paused run can
//! be resumed by id from another process.

pub mod definition;
pub mod edge;
pub mod embedded;
pub mod executor;
pub mod persistent;
pub mod run_log;

pub use definition::{WorkflowBuilder, WorkflowDefinition};
pub use edge::{Edge, EdgeCondition};
pub use embedded::EmbeddedWorkflow;
pub use executor::WorkflowExecutor;
pub use persistent::PersistentWorkflowExecutor;
pub use run_log::RunLogger;
