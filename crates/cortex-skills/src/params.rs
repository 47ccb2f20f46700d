use std::collections::HashMap;

use serde_json::Value;

/// The shared parameter map passed to every skill in a pipeline run
/// (spec.md §4.4). Typed getters/setters cover the well-known keys
/// (`messageContent`, `availableCapabilities`, `maxInboundTier`,
/// `businessContext`); everything else is a skill-result deposit keyed by
/// skill id.
#[derive(Debug, Clone, Default)]
pub struct PipelineParams {
    values: HashMap<String, Value>,
}

impl PipelineParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.values.get(key).and_then(|v| v.as_str()).map(String::from)
    }

    pub fn set_str(&mut self, key: &str, value: impl Into<String>) {
        self.insert(key, Value::String(value.into()));
    }

    pub fn get_str_vec(&self, key: &str) -> Vec<String> {
        self.values
            .get(key)
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_str_vec(&mut self, key: &str, values: &[String]) {
        self.insert(
            key,
            Value::Array(values.iter().map(|s| Value::String(s.clone())).collect()),
        );
    }
}
