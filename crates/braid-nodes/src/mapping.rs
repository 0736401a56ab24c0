use std::sync::Arc;

use serde_json::Value;

use braid_core::types::{DataMap, WorkflowState};

/// Prefix resolving a value from `state.data`.
pub const STATE_PREFIX: &str = "$state.";
/// Prefix resolving a value from the node input.
pub const INPUT_PREFIX: &str = "$input.";

type MappingFn = dyn Fn(&DataMap, &WorkflowState) -> DataMap + Send + Sync;

/// How a collaborator node builds the input it hands to its collaborator.
#[derive(Clone, Default)]
pub enum InputMapping {
    /// Forward the node input unchanged.
    #[default]
    Passthrough,
    /// Key/value table resolved with the `$state.` / `$input.` prefixes.
    Static(DataMap),
    /// Arbitrary mapping function.
    Dynamic(Arc<MappingFn>),
}

impl InputMapping {
    /// Static mapping from `(key, value)` pairs.
    pub fn fixed<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Static(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&DataMap, &WorkflowState) -> DataMap + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(f))
    }

    pub fn resolve(&self, input: &DataMap, state: &WorkflowState) -> DataMap {
        match self {
            Self::Passthrough => input.clone(),
            Self::Static(mapping) => resolve_mapping(mapping, input, state),
            Self::Dynamic(f) => f(input, state),
        }
    }
}

impl std::fmt::Debug for InputMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passthrough => f.write_str("Passthrough"),
            Self::Static(m) => f.debug_tuple("Static").field(m).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Resolve a static mapping.
///
/// A string value `$state.<key>` reads `state.data[<key>]`, `$input.<key>`
/// reads `input[<key>]`; a missing key resolves to `null`. Anything else is a
/// literal. No nested paths.
pub fn resolve_mapping(mapping: &DataMap, input: &DataMap, state: &WorkflowState) -> DataMap {
    mapping
        .iter()
        .map(|(k, v)| (k.clone(), resolve_value(v, input, state)))
        .collect()
}

fn resolve_value(value: &Value, input: &DataMap, state: &WorkflowState) -> Value {
    let Some(text) = value.as_str() else {
        return value.clone();
    };
    if let Some(key) = text.strip_prefix(STATE_PREFIX) {
        return state.data.get(key).cloned().unwrap_or(Value::Null);
    }
    if let Some(key) = text.strip_prefix(INPUT_PREFIX) {
        return input.get(key).cloned().unwrap_or(Value::Null);
    }
    value.clone()
}

/// Shape a collaborator result into node output.
///
/// With an explicit key the whole value lands under it; otherwise objects are
/// merged key by key and anything else lands under `default_key`.
pub(crate) fn into_output(value: Value, key: Option<&str>, default_key: &str) -> DataMap {
    let mut output = DataMap::new();
    match (key, value) {
        (Some(key), value) => {
            output.insert(key.to_string(), value);
        }
        (None, Value::Object(map)) => output.extend(map),
        (None, value) => {
            output.insert(default_key.to_string(), value);
        }
    }
    output
}

pub(crate) fn to_object(map: DataMap) -> Value {
    Value::Object(map.into_iter().collect())
}
