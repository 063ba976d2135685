//! Settings snapshots.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A snapshot of a view's settings object.
///
/// The host owns the live settings; applicability predicates only ever see
/// a copy taken at evaluation time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings {
    entries: IndexMap<String, Value>,
}

impl Settings {
    /// Create an empty settings snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a raw value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Get a string setting.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Get a boolean setting, falling back to `default` when unset or of
    /// another type.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    /// Get an integer setting.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    /// Check whether a key is present.
    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Set a value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Remove a value.
    pub fn erase(&mut self, key: &str) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    /// Builder-style setter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Convert into a `Value::Object`.
    pub fn to_value(&self) -> Value {
        Value::Object(self.entries.clone())
    }
}

impl FromIterator<(String, Value)> for Settings {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let settings = Settings::new()
            .with("syntax", "Markdown.sublime-syntax")
            .with("word_wrap", true)
            .with("tab_size", 4i64);

        assert_eq!(settings.get_str("syntax"), Some("Markdown.sublime-syntax"));
        assert!(settings.get_bool("word_wrap", false));
        assert!(settings.get_bool("missing", true));
        assert_eq!(settings.get_i64("tab_size"), Some(4));
    }

    #[test]
    fn test_erase() {
        let mut settings = Settings::new().with("a", 1i64);
        assert!(settings.erase("a").is_some());
        assert!(!settings.has("a"));
    }
}
