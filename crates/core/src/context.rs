//! Resolution context: the named scalar attributes conditional values switch on.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A read-only set of named scalar attributes, e.g. `level`, `build-type`
/// and `release-type`.
///
/// Values are stored as strings; numbers and booleans are stringified on the
/// way in so that `level: 3` and `level: "3"` resolve identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Context {
    values: BTreeMap<String, String>,
}

impl Context {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion of one attribute.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Insert or replace one attribute.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Look up an attribute.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Whether no attributes are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over all attributes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Build a context from a JSON mapping, keeping only scalar entries.
    ///
    /// Nulls, arrays and nested mappings are skipped.
    #[must_use]
    pub fn from_attributes(attributes: &Map<String, Value>) -> Self {
        let values = attributes
            .iter()
            .filter_map(|(key, value)| scalar_to_string(value).map(|v| (key.clone(), v)))
            .collect();
        Self { values }
    }

    /// Return a new context where `overlay` wins over `self`.
    #[must_use]
    pub fn layered(&self, overlay: &Self) -> Self {
        let mut values = self.values.clone();
        values.extend(
            overlay
                .values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        Self { values }
    }
}

impl<'de> Deserialize<'de> for Context {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        Ok(Self::from_attributes(&map))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// String form of a scalar JSON value, as used for discriminant matching.
#[must_use]
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_attributes_stringifies_scalars() {
        let attrs = json!({
            "level": 3,
            "build-type": "beta",
            "nightly": false,
            "platforms": ["android"],
            "missing": null,
        });
        let ctx = Context::from_attributes(attrs.as_object().unwrap());
        assert_eq!(ctx.get("level"), Some("3"));
        assert_eq!(ctx.get("build-type"), Some("beta"));
        assert_eq!(ctx.get("nightly"), Some("false"));
        assert_eq!(ctx.get("platforms"), None);
        assert_eq!(ctx.get("missing"), None);
    }

    #[test]
    fn test_layered_overlay_wins() {
        let global = Context::new().with("level", "3").with("build-type", "nightly");
        let task = Context::new().with("build-type", "beta");
        let merged = global.layered(&task);

        assert_eq!(merged.get("level"), Some("3"));
        assert_eq!(merged.get("build-type"), Some("beta"));
        // The inputs are untouched.
        assert_eq!(global.get("build-type"), Some("nightly"));
    }

    #[test]
    fn test_deserialize_from_yaml() {
        let ctx: Context = serde_yaml::from_str("level: 3\nrelease-type: beta\n").unwrap();
        assert_eq!(ctx.get("level"), Some("3"));
        assert_eq!(ctx.get("release-type"), Some("beta"));
    }

    #[test]
    fn test_from_iterator() {
        let ctx: Context = [("level", "1")].into_iter().collect();
        assert_eq!(ctx.iter().collect::<Vec<_>>(), vec![("level", "1")]);
    }
}
