//! Ordered, case-insensitive input parameter map.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Input parameters of a skill request.
///
/// Keys are unique ignoring ASCII/Unicode case. The first spelling of a key
/// keeps its position; a later insert under another casing replaces the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputParameters {
    // lowercased key -> (original key, value)
    entries: IndexMap<String, (String, Value)>,
}

impl InputParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a parameter, returning the previous value for the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let folded = key.to_lowercase();
        match self.entries.get_mut(&folded) {
            Some((_, existing)) => Some(std::mem::replace(existing, value.into())),
            None => {
                self.entries.insert(folded, (key, value.into()));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(&key.to_lowercase()).map(|(_, v)| v)
    }

    /// String view of a parameter, if it holds a JSON string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in insertion order with the original key spelling.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.values().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for InputParameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

impl Serialize for InputParameters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

impl<'de> Deserialize<'de> for InputParameters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = IndexMap::<String, Value>::deserialize(deserializer)?;
        Ok(raw.into_iter().collect())
    }
}
