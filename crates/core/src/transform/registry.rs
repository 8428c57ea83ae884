//! Transform registry
//!
//! Maps the identifiers used in a kind's `transforms` list to transforms.

use std::collections::HashMap;
use std::fmt;

use super::{Pipeline, Transform, builtin};
use crate::Result;

/// Registry of named transforms.
///
/// # Example
///
/// ```ignore
/// let mut registry = TransformRegistry::with_builtins();
/// registry.register(Transform::map("signing", |doc, _| Ok(doc)));
/// let pipeline = registry.pipeline("release-github", &["multi-dep".into(), "task".into()])?;
/// ```
#[derive(Clone, Default)]
pub struct TransformRegistry {
    transforms: HashMap<String, Transform>,
}

impl TransformRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            transforms: HashMap::new(),
        }
    }

    /// Create a registry holding the built-in transforms.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(builtin::multi_dep());
        registry.register(builtin::github_release());
        registry.register(builtin::treeherder());
        registry.register(builtin::task());
        registry
    }

    /// Register a transform under its name, replacing any previous one.
    pub fn register(&mut self, transform: Transform) {
        self.transforms.insert(transform.name().to_string(), transform);
    }

    /// Get a transform by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Transform> {
        self.transforms.get(name)
    }

    /// Check if a transform is registered.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    /// All registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.transforms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered transforms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Build the pipeline for a kind's transform list.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidKindDeclaration`] for an unknown name.
    pub fn pipeline(&self, kind: &str, names: &[String]) -> Result<Pipeline> {
        Pipeline::from_names(kind, names, self)
    }
}

impl fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("transforms", &self.names())
            .finish()
    }
}
