//! Upstream task filters declared as `only-for-<attribute>s` and
//! `not-for-<attribute>s`.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::context::scalar_to_string;

const ONLY_FOR: &str = "only-for-";
const NOT_FOR: &str = "not-for-";

/// Whether a filter keeps or drops matching tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Keep only tasks whose attribute is in the set.
    Only,
    /// Drop tasks whose attribute is in the set.
    Not,
}

/// A predicate on one upstream task attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeFilter {
    attribute: String,
    values: BTreeSet<String>,
    mode: FilterMode,
}

impl AttributeFilter {
    /// Create a filter.
    pub fn new<I, S>(mode: FilterMode, attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            attribute: attribute.into(),
            values: values.into_iter().map(Into::into).collect(),
            mode,
        }
    }

    /// Parse a declaration entry.
    ///
    /// Returns `None` when the key is not a filter key. The attribute name is
    /// the key without its prefix and plural `s`: `only-for-build-types`
    /// filters on `build-type`.
    pub(super) fn from_entry(key: &str, value: &Value) -> Option<Result<Self, String>> {
        let (mode, rest) = if let Some(rest) = key.strip_prefix(ONLY_FOR) {
            (FilterMode::Only, rest)
        } else if let Some(rest) = key.strip_prefix(NOT_FOR) {
            (FilterMode::Not, rest)
        } else {
            return None;
        };
        let attribute = rest.strip_suffix('s').unwrap_or(rest);
        if attribute.is_empty() {
            return Some(Err(format!("filter '{key}' names no attribute")));
        }

        let values = match value {
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    scalar_to_string(item)
                        .ok_or_else(|| format!("filter '{key}' must list scalar values"))
                })
                .collect::<Result<BTreeSet<_>, _>>(),
            other => scalar_to_string(other)
                .map(|v| BTreeSet::from([v]))
                .ok_or_else(|| format!("filter '{key}' must be a list of values")),
        };
        Some(values.map(|values| Self {
            attribute: attribute.to_string(),
            values,
            mode,
        }))
    }

    /// The attribute this filter reads.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Filter mode.
    #[must_use]
    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    /// Whether a task with these attributes passes.
    ///
    /// A task without the attribute fails an `only-for` filter and passes a
    /// `not-for` filter.
    #[must_use]
    pub fn matches(&self, attributes: &Map<String, Value>) -> bool {
        let present = attributes
            .get(&self.attribute)
            .and_then(scalar_to_string)
            .is_some_and(|v| self.values.contains(&v));
        match self.mode {
            FilterMode::Only => present,
            FilterMode::Not => !present,
        }
    }
}
