use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{BraidError, Result};
use crate::traits::{Agent, Tool, WorkflowRunner};

/// Id-keyed registry of shared collaborators.
pub struct Registry<T: ?Sized> {
    kind: &'static str,
    entries: HashMap<String, Arc<T>>,
}

pub type ToolRegistry = Registry<dyn Tool>;
pub type AgentRegistry = Registry<dyn Agent>;
pub type WorkflowRegistry = Registry<dyn WorkflowRunner>;

impl<T: ?Sized> Registry<T> {
    /// `kind` names the entries in not-found errors ("tool", "agent", ...).
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
        }
    }

    pub fn register(&mut self, id: impl Into<String>, entry: Arc<T>) {
        self.entries.insert(id.into(), entry);
    }

    /// Builder-style `register`.
    pub fn with(mut self, id: impl Into<String>, entry: Arc<T>) -> Self {
        self.register(id, entry);
        self
    }

    pub fn unregister(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn get(&self, id: &str) -> Result<Arc<T>> {
        self.entries
            .get(id)
            .cloned()
            .ok_or_else(|| BraidError::NotRegistered {
                kind: self.kind,
                id: id.to_string(),
            })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.entries.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: ?Sized> std::fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("ids", &self.ids())
            .finish()
    }
}

impl Registry<dyn Tool> {
    pub fn tools() -> Self {
        Self::new("tool")
    }

    /// Register a tool under its own name.
    pub fn register_tool(&mut self, tool: impl Tool) {
        let name = tool.name().to_string();
        self.register(name, Arc::new(tool));
    }
}

impl Registry<dyn Agent> {
    pub fn agents() -> Self {
        Self::new("agent")
    }

    /// Register an agent under its own name.
    pub fn register_agent(&mut self, agent: impl Agent) {
        let name = agent.name().to_string();
        self.register(name, Arc::new(agent));
    }
}

impl Registry<dyn WorkflowRunner> {
    pub fn workflows() -> Self {
        Self::new("workflow")
    }

    /// Register a runner under its workflow id.
    pub fn register_workflow(&mut self, runner: impl WorkflowRunner) {
        let id = runner.workflow_id().to_string();
        self.register(id, Arc::new(runner));
    }
}

/// How a node reaches its collaborator: a bound instance, or an id resolved
/// against an injected registry at execution time.
pub enum Reference<T: ?Sized> {
    Bound(Arc<T>),
    Registered {
        id: String,
        registry: Arc<Registry<T>>,
    },
}

impl<T: ?Sized> Reference<T> {
    pub fn bound(entry: Arc<T>) -> Self {
        Self::Bound(entry)
    }

    pub fn registered(id: impl Into<String>, registry: Arc<Registry<T>>) -> Self {
        Self::Registered {
            id: id.into(),
            registry,
        }
    }

    pub fn resolve(&self) -> Result<Arc<T>> {
        match self {
            Self::Bound(entry) => Ok(Arc::clone(entry)),
            Self::Registered { id, registry } => registry.get(id),
        }
    }

    /// Registry id, if resolved by id.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Bound(_) => None,
            Self::Registered { id, .. } => Some(id),
        }
    }
}

impl<T: ?Sized> Clone for Reference<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Bound(entry) => Self::Bound(Arc::clone(entry)),
            Self::Registered { id, registry } => Self::Registered {
                id: id.clone(),
                registry: Arc::clone(registry),
            },
        }
    }
}

impl<T: ?Sized> From<Arc<T>> for Reference<T> {
    fn from(entry: Arc<T>) -> Self {
        Self::Bound(entry)
    }
}
