//! Kind loader: expands one kind into finished task documents.

use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::context::Context;
use crate::document::{Document, TaskDocument};
use crate::expand::{self, GroupRegistry, KindOutputs, TaskSkeleton};
use crate::kind::Kind;
use crate::resolve::resolve_document;
use crate::transform::{Pipeline, TransformContext, TransformError, TransformRegistry};
use crate::{Error, Result};

/// Runs expansion, template merge, resolution and transforms for a kind.
#[derive(Debug, Clone, Copy)]
pub struct KindLoader<'a> {
    transforms: &'a TransformRegistry,
    groups: &'a GroupRegistry,
    parameters: &'a Context,
}

impl<'a> KindLoader<'a> {
    /// Create a loader over the given registries and global parameters.
    #[must_use]
    pub const fn new(
        transforms: &'a TransformRegistry,
        groups: &'a GroupRegistry,
        parameters: &'a Context,
    ) -> Self {
        Self {
            transforms,
            groups,
            parameters,
        }
    }

    /// Produce the tasks of `kind` from the tasks of its upstream kinds.
    ///
    /// # Errors
    ///
    /// Returns the first error of any stage: an unknown transform or a
    /// missing primary kind ([`Error::InvalidKindDeclaration`]), an unknown
    /// grouping ([`Error::UnknownGroupStrategy`]), a conditional value
    /// without a match ([`Error::UnresolvedConditionKind`]) or a rejected
    /// document ([`Error::TransformFailure`]).
    #[instrument(name = "load_kind", skip_all, fields(kind = kind.name()))]
    pub fn load(&self, kind: &Kind, upstream: &KindOutputs) -> Result<Vec<TaskDocument>> {
        let pipeline = self.transforms.pipeline(kind.name(), kind.transforms())?;
        let skeletons = expand::expand(kind, upstream, self.groups)?;

        let documents = skeletons
            .iter()
            .map(|skeleton| self.prepare(kind, skeleton))
            .collect::<Result<Vec<_>>>()?;

        let context = TransformContext::new(kind.name(), kind.config(), self.parameters);
        let tasks = pipeline
            .apply(documents, &context)?
            .into_iter()
            .map(|document| finish(kind, &pipeline, document))
            .collect::<Result<Vec<_>>>()?;

        info!(kind = kind.name(), tasks = tasks.len(), "Loaded kind");
        Ok(tasks)
    }

    /// Merge the template under the skeleton and resolve conditional values.
    fn prepare(&self, kind: &Kind, skeleton: &TaskSkeleton<'_>) -> Result<Document> {
        let mut document = Document::from(kind.task_template().clone());
        document.merge(skeleton.to_document().into_map());

        let mut context = self.parameters.clone();
        if let Some(attributes) = skeleton.primary_attributes() {
            context = context.layered(&Context::from_attributes(attributes));
        }
        if let Some(attributes) = document.get("attributes").and_then(Value::as_object) {
            context = context.layered(&Context::from_attributes(attributes));
        }

        let root = format!("{}-{}", kind.name(), skeleton.name);
        debug!(task = %root, context = ?context, "Resolving task");
        resolve_document(document, &context, &root)
    }
}

/// Convert a pipeline output into a typed task.
fn finish(kind: &Kind, pipeline: &Pipeline, document: Document) -> Result<TaskDocument> {
    let snapshot = document.clone();
    TaskDocument::try_from(document).map_err(|e| Error::TransformFailure {
        kind: kind.name().to_string(),
        transform: pipeline.names().last().unwrap_or("<none>").to_string(),
        document: snapshot.to_pretty_string(),
        source: TransformError::new(format!("not a valid task: {e}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::KindDeclaration;
    use serde_json::json;

    fn kind(name: &str, value: Value) -> Kind {
        let declaration: KindDeclaration = serde_json::from_value(value).unwrap();
        Kind::from_declaration(name, declaration).unwrap()
    }

    fn build_kind() -> Kind {
        kind(
            "build",
            json!({
                "transforms": ["task"],
                "kind-dependencies": [],
                "task-template": {
                    "description": "Build",
                    "attributes": {"shipping-phase": "build"},
                },
                "tasks": {
                    "beta": {"attributes": {"build-type": "beta"}},
                    "release": {"attributes": {"build-type": "release"}},
                },
            }),
        )
    }

    #[test]
    fn test_default_loader() {
        let transforms = TransformRegistry::with_builtins();
        let groups = GroupRegistry::with_builtins();
        let params = Context::new();
        let loader = KindLoader::new(&transforms, &groups, &params);

        let tasks = loader.load(&build_kind(), &KindOutputs::new()).unwrap();
        let labels: Vec<&str> = tasks.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, ["build-beta", "build-release"]);
        assert_eq!(tasks[0].attribute("build-type").as_deref(), Some("beta"));
        assert_eq!(tasks[0].attribute("shipping-phase").as_deref(), Some("build"));
        assert!(tasks[0].dependencies.is_empty());
    }

    #[test]
    fn test_template_is_resolved_with_task_attributes() {
        let kind = kind(
            "build",
            json!({
                "transforms": ["task"],
                "kind-dependencies": [],
                "task-template": {
                    "description": {"by-build-type": {"beta": "Beta build", "default": "Build"}},
                },
                "tasks": {
                    "beta": {"attributes": {"build-type": "beta"}},
                    "nightly": {"attributes": {"build-type": "nightly"}},
                },
            }),
        );
        let transforms = TransformRegistry::with_builtins();
        let groups = GroupRegistry::new();
        let params = Context::new();
        let tasks = KindLoader::new(&transforms, &groups, &params)
            .load(&kind, &KindOutputs::new())
            .unwrap();
        assert_eq!(tasks[0].description, "Beta build");
        assert_eq!(tasks[1].description, "Build");
    }

    #[test]
    fn test_unresolved_condition_aborts_kind() {
        let kind = kind(
            "build",
            json!({
                "transforms": ["task"],
                "kind-dependencies": [],
                "task-template": {
                    "description": "Build",
                    "worker-type": {"by-level": {"3": "b-linux"}},
                },
                "tasks": {"beta": {}},
            }),
        );
        let transforms = TransformRegistry::with_builtins();
        let groups = GroupRegistry::new();
        let params = Context::new().with("level", "1");
        let err = KindLoader::new(&transforms, &groups, &params)
            .load(&kind, &KindOutputs::new())
            .unwrap_err();
        match err {
            Error::UnresolvedConditionKind { path, class, value } => {
                assert_eq!(path, "build-beta.worker-type");
                assert_eq!(class, "by-level");
                assert_eq!(value.as_deref(), Some("1"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_output_must_be_a_task() {
        let kind = kind(
            "build",
            json!({
                "transforms": [],
                "kind-dependencies": [],
                "tasks": {"beta": {}},
            }),
        );
        let transforms = TransformRegistry::with_builtins();
        let groups = GroupRegistry::new();
        let params = Context::new();
        let err = KindLoader::new(&transforms, &groups, &params)
            .load(&kind, &KindOutputs::new())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::TransformFailure { ref transform, .. } if transform == "<none>"
        ));
    }

    #[test]
    fn test_unknown_transform() {
        let kind = kind(
            "build",
            json!({
                "transforms": ["taskgraph.transforms.signing:transforms"],
                "kind-dependencies": [],
                "tasks": {"beta": {}},
            }),
        );
        let transforms = TransformRegistry::with_builtins();
        let groups = GroupRegistry::new();
        let params = Context::new();
        let err = KindLoader::new(&transforms, &groups, &params)
            .load(&kind, &KindOutputs::new())
            .unwrap_err();
        assert!(err.to_string().contains("unknown transform 'signing'"));
    }
}
