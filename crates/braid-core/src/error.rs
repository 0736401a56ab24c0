use thiserror::Error;

#[derive(Debug, Error)]
pub enum BraidError {
    // Definition errors
    #[error("Invalid workflow definition: {0}")]
    InvalidDefinition(String),

    // Execution errors
    #[error("Node '{node}' not found in workflow '{workflow}'")]
    NodeNotFound { workflow: String, node: String },

    #[error("Workflow exceeded max steps ({0})")]
    MaxStepsExceeded(usize),

    // Resume errors
    #[error("Workflow run {run_id} is not paused (status: {status})")]
    WorkflowNotPaused { run_id: String, status: String },

    #[error("Workflow run not found: {0}")]
    WorkflowNotFound(String),

    // Collaborator errors
    #[error("{kind} not registered: {id}")]
    NotRegistered { kind: &'static str, id: String },

    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("Agent failed: {agent}: {message}")]
    Agent { agent: String, message: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BraidError>;
