use serde_json::Value;

use crate::types::DataMap;

/// Evaluate a simple comparison against run data.
///
/// Supported expressions:
/// - `key == "value"`: exact match
/// - `key != "value"`: not equal
/// - `key contains "substr"`: substring match, or element match for arrays
///
/// Non-string values compare by their JSON text, so `count == 3` and
/// `done == true` work. Missing keys and unparseable expressions are `false`.
pub fn evaluate_condition(expr: &str, data: &DataMap) -> bool {
    let Some((key, op, value)) = parse(expr) else {
        return false;
    };
    let Some(actual) = data.get(key) else {
        return false;
    };

    match op {
        Op::Contains => match actual {
            Value::String(s) => s.contains(value),
            Value::Array(items) => items.iter().any(|v| display(v) == value),
            _ => false,
        },
        Op::NotEq => display(actual) != value,
        Op::Eq => display(actual) == value,
    }
}

/// Syntax check without evaluating.
pub fn is_valid_condition(expr: &str) -> bool {
    parse(expr).is_some_and(|(key, _, _)| !key.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Contains,
    NotEq,
    Eq,
}

const OPERATORS: [(&str, Op); 3] = [
    (" contains ", Op::Contains),
    ("!=", Op::NotEq),
    ("==", Op::Eq),
];

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Split `key OP "value"` on the leftmost operator, so operator text inside
/// the value stays part of the value.
fn parse(expr: &str) -> Option<(&str, Op, &str)> {
    let expr = expr.trim();
    let (at, token, op) = OPERATORS
        .iter()
        .filter_map(|(token, op)| expr.find(token).map(|at| (at, *token, *op)))
        .min_by_key(|(at, _, _)| *at)?;

    let key = expr[..at].trim();
    let value = expr[at + token.len()..].trim().trim_matches('"');
    Some((key, op, value))
}
