//! Transform pipeline.
//!
//! A [`Transform`] maps one [`Document`] to zero or more documents. A
//! [`Pipeline`] applies its transforms in order, feeding every output of one
//! stage into the next and concatenating the results.

mod builtin;
mod registry;

pub use builtin::{github_release, multi_dep, task, treeherder};
pub use registry::TransformRegistry;

use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::context::Context;
use crate::document::Document;
use crate::{Error, Result};

/// Why a transform rejected a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}{message}", .field.as_deref().map(|f| format!("{f}: ")).unwrap_or_default())]
pub struct TransformError {
    message: String,
    field: Option<String>,
}

impl TransformError {
    /// Create an error not tied to a particular field.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    /// Create an error about one (dotted) field.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// A required field is absent.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::field(field, "required field is missing")
    }

    /// The error message without the field prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The offending field, if any.
    #[must_use]
    pub fn field_name(&self) -> Option<&str> {
        self.field.as_deref()
    }
}

impl From<Error> for TransformError {
    fn from(error: Error) -> Self {
        match error {
            Error::UnresolvedConditionKind { ref path, .. }
            | Error::MalformedCondition { ref path, .. } => Self::field(path.clone(), error.to_string()),
            other => Self::new(other.to_string()),
        }
    }
}

/// Read-only inputs shared by every transform invocation of one kind.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    kind: &'a str,
    config: &'a Map<String, Value>,
    parameters: &'a Context,
}

impl<'a> TransformContext<'a> {
    /// Create a context for `kind`.
    #[must_use]
    pub const fn new(kind: &'a str, config: &'a Map<String, Value>, parameters: &'a Context) -> Self {
        Self {
            kind,
            config,
            parameters,
        }
    }

    /// Name of the kind being transformed.
    #[must_use]
    pub const fn kind(&self) -> &'a str {
        self.kind
    }

    /// Extra keys of the kind declaration.
    #[must_use]
    pub const fn config(&self) -> &'a Map<String, Value> {
        self.config
    }

    /// Global parameters of the run.
    #[must_use]
    pub const fn parameters(&self) -> &'a Context {
        self.parameters
    }

    /// Parameters overlaid with a document's own scalar attributes, for
    /// transforms that resolve conditional fields late.
    #[must_use]
    pub fn resolution_context(&self, document: &Document) -> Context {
        match document.get("attributes").and_then(Value::as_object) {
            Some(attributes) => self.parameters.layered(&Context::from_attributes(attributes)),
            None => self.parameters.clone(),
        }
    }
}

type TransformFn =
    dyn Fn(Document, &TransformContext<'_>) -> std::result::Result<Vec<Document>, TransformError>
        + Send
        + Sync;

/// A named document transform.
#[derive(Clone)]
pub struct Transform {
    name: String,
    func: Arc<TransformFn>,
}

impl Transform {
    /// Create a transform that may emit any number of documents.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Document, &TransformContext<'_>) -> std::result::Result<Vec<Document>, TransformError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Create a transform that emits exactly one document per input.
    pub fn map<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Document, &TransformContext<'_>) -> std::result::Result<Document, TransformError>
            + Send
            + Sync
            + 'static,
    {
        Self::new(name, move |doc, ctx| func(doc, ctx).map(|d| vec![d]))
    }

    /// The identifier kinds refer to this transform by.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply to one document.
    ///
    /// # Errors
    ///
    /// Returns the transform's own error.
    pub fn apply(
        &self,
        document: Document,
        context: &TransformContext<'_>,
    ) -> std::result::Result<Vec<Document>, TransformError> {
        (self.func)(document, context)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform").field("name", &self.name).finish_non_exhaustive()
    }
}

/// An ordered sequence of transforms.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Transform>,
}

impl Pipeline {
    /// Create a pipeline from transforms in application order.
    #[must_use]
    pub fn new(stages: Vec<Transform>) -> Self {
        Self { stages }
    }

    /// Look every name up in `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKindDeclaration`] for the first unknown name.
    pub fn from_names(kind: &str, names: &[String], registry: &TransformRegistry) -> Result<Self> {
        names
            .iter()
            .map(|name| {
                registry.get(name).cloned().ok_or_else(|| {
                    Error::invalid_kind(
                        kind,
                        format!(
                            "unknown transform '{name}' (available: {})",
                            registry.names().join(", ")
                        ),
                    )
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }

    /// Append a transform.
    #[must_use]
    pub fn with(mut self, transform: Transform) -> Self {
        self.stages.push(transform);
        self
    }

    /// Concatenate two pipelines: `self` runs first.
    #[must_use]
    pub fn then(mut self, next: Self) -> Self {
        self.stages.extend(next.stages);
        self
    }

    /// Transform names in application order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(Transform::name)
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether there are no stages; applying an empty pipeline is the identity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every document through every stage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransformFailure`] naming the kind, the failing stage
    /// and the document it was given. No partial output is returned.
    pub fn apply(&self, documents: Vec<Document>, context: &TransformContext<'_>) -> Result<Vec<Document>> {
        let mut current = documents;
        for stage in &self.stages {
            let mut next = Vec::with_capacity(current.len());
            for document in current {
                let output = stage.apply(document.clone(), context).map_err(|source| {
                    Error::TransformFailure {
                        kind: context.kind().to_string(),
                        transform: stage.name().to_string(),
                        document: document.to_pretty_string(),
                        source,
                    }
                })?;
                next.extend(output);
            }
            debug!(kind = context.kind(), transform = stage.name(), documents = next.len(), "Applied transform");
            current = next;
        }
        Ok(current)
    }
}
