//! Task documents: the loosely typed form threaded through transforms and the
//! typed form registered in the final graph.

use kindling_task_graph::GraphNodeData;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::context::scalar_to_string;

/// An in-progress task document.
///
/// Transforms receive and return documents; fields are accessed by their
/// kebab-case names and nested fields by dotted paths (`worker.github-project`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Create an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the underlying mapping.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Take the underlying mapping.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Get a top-level field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Get a top-level string field.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Get a nested field by dotted path.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Whether a top-level field is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Insert a top-level field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Insert a top-level field only if it is absent.
    pub fn set_default(&mut self, key: &str, value: impl Into<Value>) {
        if !self.0.contains_key(key) {
            self.0.insert(key.to_string(), value.into());
        }
    }

    /// Remove a top-level field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    /// Set a nested field by dotted path, creating intermediate mappings.
    ///
    /// Returns `false` without changing anything when an intermediate segment
    /// exists but is not a mapping.
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) -> bool {
        let segments: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            return false;
        };

        let mut current = &mut self.0;
        for segment in parents {
            let entry = current
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            let Some(next) = entry.as_object_mut() else {
                return false;
            };
            current = next;
        }
        current.insert((*last).to_string(), value.into());
        true
    }

    /// Mutable access to a top-level mapping field, creating it when absent.
    ///
    /// Returns `None` if the field exists but is not a mapping.
    pub fn object_mut(&mut self, key: &str) -> Option<&mut Map<String, Value>> {
        self.0
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
    }

    /// Deep-merge `overlay` into this document; overlay values win.
    pub fn merge(&mut self, overlay: Map<String, Value>) {
        merge_maps(&mut self.0, overlay);
    }

    /// Pretty JSON rendering used in diagnostics.
    #[must_use]
    pub fn to_pretty_string(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| format!("{:?}", self.0))
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Deep-merge two mappings. Nested mappings merge recursively; any other
/// value in `overlay` replaces the one in `base`.
pub fn merge_maps(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Object(base_child)), Value::Object(overlay_child)) => {
                merge_maps(base_child, overlay_child);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// A fully resolved, transformed task ready for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TaskDocument {
    /// Unique task id.
    pub label: String,
    /// The kind that generated this task.
    pub kind: String,
    /// Human readable description.
    pub description: String,
    /// Release phase this task belongs to, e.g. `promote` or `ship`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_phase: Option<String>,
    /// Pool of workers that runs the task, e.g. `b-android`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_type: Option<String>,
    /// Worker payload, opaque to the engine.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub worker: Map<String, Value>,
    /// Reporting metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treeherder: Option<Map<String, Value>>,
    /// Attributes downstream kinds filter and group on.
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Labels of the tasks this task depends on.
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    /// Any other field produced by the transforms.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskDocument {
    /// String form of a scalar attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.attributes.get(name).and_then(scalar_to_string)
    }
}

impl TryFrom<Document> for TaskDocument {
    type Error = serde_json::Error;

    fn try_from(document: Document) -> Result<Self, Self::Error> {
        serde_json::from_value(Value::Object(document.into_map()))
    }
}

impl GraphNodeData for TaskDocument {
    fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.dependencies.iter().map(String::as_str)
    }
}
