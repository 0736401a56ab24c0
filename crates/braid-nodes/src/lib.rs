//! Node variants.
//!
//! Every variant implements `braid_core::traits::Node`. Control-flow nodes
//! (condition, loop, parallel) compose other nodes; collaborator nodes (tool,
//! agent, sub-workflow) reach external capabilities through a `Reference`,
//! either bound directly or resolved from an injected registry.

pub mod agent;
pub mod callback;
pub mod condition;
pub mod human_input;
pub mod loop_node;
pub mod mapping;
pub mod parallel;
pub mod schema;
pub mod sub_workflow;
pub mod tool;

pub use agent::AgentNode;
pub use callback::CallbackNode;
pub use condition::ConditionNode;
pub use human_input::{HumanInputNode, AWAITING_INPUT_KEY, HUMAN_INPUT_KEY};
pub use loop_node::LoopNode;
pub use mapping::{resolve_mapping, InputMapping};
pub use parallel::{MergeStrategy, ParallelNode, ParallelOutcome};
pub use schema::BasicSchemaValidator;
pub use sub_workflow::{child_run_key, SubWorkflowNode, SUB_WORKFLOW_KEY};
pub use tool::ToolNode;
