use serde::{Deserialize, Serialize};

use braid_core::expr::evaluate_condition;
use braid_core::types::DataMap;

/// A directed edge between two nodes of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node id.
    pub from: String,
    /// Target node id.
    pub to: String,
    /// Condition that must hold to traverse this edge.
    #[serde(default)]
    pub condition: EdgeCondition,
}

/// Condition for traversing an edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EdgeCondition {
    /// Always traverse this edge.
    #[default]
    Always,
    /// Traverse if a simple comparison against run data matches.
    /// Supported: `key == "value"`, `key != "value"`, `key contains "substr"`.
    Conditional { expr: String },
}

impl Edge {
    /// Create an unconditional edge.
    pub fn always(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: EdgeCondition::Always,
        }
    }

    /// Create a conditional edge.
    pub fn conditional(
        from: impl Into<String>,
        to: impl Into<String>,
        expr: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: EdgeCondition::Conditional { expr: expr.into() },
        }
    }

    pub fn matches(&self, data: &DataMap) -> bool {
        match &self.condition {
            EdgeCondition::Always => true,
            EdgeCondition::Conditional { expr } => evaluate_condition(expr, data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_edge_serde() {
        let edge = Edge::conditional("a", "b", r#"status == "done""#);
        let json = serde_json::to_string(&edge).unwrap();
        let parsed: Edge = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, edge);
    }

    #[test]
    fn test_condition_defaults_to_always() {
        let parsed: Edge = serde_json::from_str(r#"{"from": "a", "to": "b"}"#).unwrap();
        assert_eq!(parsed.condition, EdgeCondition::Always);
        assert!(parsed.matches(&DataMap::new()));
    }

    #[test]
    fn test_conditional_matches_data() {
        let edge = Edge::conditional("a", "b", r#"approved == "true""#);
        let mut data = DataMap::new();
        assert!(!edge.matches(&data));
        data.insert("approved".into(), json!(true));
        assert!(edge.matches(&data));
    }
}
