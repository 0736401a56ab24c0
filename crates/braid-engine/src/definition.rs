use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use braid_core::error::{BraidError, Result};
use braid_core::expr::is_valid_condition;
use braid_core::traits::Node;
use braid_core::types::DataMap;

use crate::edge::{Edge, EdgeCondition};

/// Immutable workflow graph.
///
/// Built only through `WorkflowBuilder`, so every edge endpoint, the entry
/// node and every declared branch target is known to exist.
#[derive(Clone)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    nodes: HashMap<String, Arc<dyn Node>>,
    edges: Vec<Edge>,
    entry_node: String,
}

impl WorkflowDefinition {
    pub fn builder(id: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder::new(id)
    }

    pub fn entry_node(&self) -> &str {
        &self.entry_node
    }

    pub fn node(&self, id: &str) -> Option<&Arc<dyn Node>> {
        self.nodes.get(id)
    }

    /// Node ids, sorted.
    pub fn node_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.nodes.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Outgoing edges of `from`, in declaration order.
    pub fn outgoing<'a>(&'a self, from: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.from == from)
    }

    /// Target of the first outgoing edge whose condition matches `data`.
    /// `None` means `from` is terminal for this data.
    pub fn successor(&self, from: &str, data: &DataMap) -> Option<&str> {
        self.edges
            .iter()
            .find(|e| e.from == from && e.matches(data))
            .map(|e| e.to.as_str())
    }
}

impl std::fmt::Debug for WorkflowDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowDefinition")
            .field("id", &self.id)
            .field("nodes", &self.node_ids())
            .field("edges", &self.edges)
            .field("entry_node", &self.entry_node)
            .finish()
    }
}

/// Builder for `WorkflowDefinition`. `build` performs all graph validation.
pub struct WorkflowBuilder {
    id: String,
    name: Option<String>,
    description: String,
    nodes: Vec<(String, Arc<dyn Node>)>,
    edges: Vec<Edge>,
    entry: Option<String>,
}

impl WorkflowBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: String::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            entry: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn node(mut self, id: impl Into<String>, node: Arc<dyn Node>) -> Self {
        self.nodes.push((id.into(), node));
        self
    }

    /// Unconditional edge.
    pub fn edge(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.add_edge(Edge::always(from, to))
    }

    pub fn conditional_edge(
        self,
        from: impl Into<String>,
        to: impl Into<String>,
        expr: impl Into<String>,
    ) -> Self {
        self.add_edge(Edge::conditional(from, to, expr))
    }

    pub fn add_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn entry(mut self, id: impl Into<String>) -> Self {
        self.entry = Some(id.into());
        self
    }

    pub fn build(self) -> Result<WorkflowDefinition> {
        let invalid = |msg: String| BraidError::InvalidDefinition(format!("{}: {}", self.id, msg));

        let entry_node = self
            .entry
            .clone()
            .ok_or_else(|| invalid("no entry node".to_string()))?;

        let mut nodes: HashMap<String, Arc<dyn Node>> = HashMap::with_capacity(self.nodes.len());
        for (id, node) in &self.nodes {
            if nodes.insert(id.clone(), Arc::clone(node)).is_some() {
                return Err(invalid(format!("duplicate node id '{}'", id)));
            }
        }

        if !nodes.contains_key(&entry_node) {
            return Err(invalid(format!("entry node '{}' is not defined", entry_node)));
        }

        for edge in &self.edges {
            for endpoint in [&edge.from, &edge.to] {
                if !nodes.contains_key(endpoint) {
                    return Err(invalid(format!(
                        "edge {} -> {} references unknown node '{}'",
                        edge.from, edge.to, endpoint
                    )));
                }
            }
            if let EdgeCondition::Conditional { expr } = &edge.condition {
                if !is_valid_condition(expr) {
                    return Err(invalid(format!(
                        "edge {} -> {} has unsupported condition '{}'",
                        edge.from, edge.to, expr
                    )));
                }
            }
        }

        let known: HashSet<&str> = nodes.keys().map(|s| s.as_str()).collect();
        for (id, node) in &self.nodes {
            if let Some(target) = node
                .branch_targets()
                .into_iter()
                .find(|t| !known.contains(t.as_str()))
            {
                return Err(invalid(format!(
                    "node '{}' branches to unknown node '{}'",
                    id, target
                )));
            }
        }

        Ok(WorkflowDefinition {
            name: self.name.clone().unwrap_or_else(|| self.id.clone()),
            id: self.id.clone(),
            description: self.description.clone(),
            nodes,
            edges: self.edges.clone(),
            entry_node,
        })
    }
}
