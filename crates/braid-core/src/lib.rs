pub mod config;
pub mod error;
pub mod event;
pub mod expr;
pub mod registry;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{BraidError, Result};
pub use event::EventBus;
pub use registry::{AgentRegistry, Reference, Registry, ToolRegistry, WorkflowRegistry};
pub use types::*;
