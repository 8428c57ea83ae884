//! Task graph generation across all kinds.

use kindling_task_graph::{DependencyGraph, Error as GraphError};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use tracing::{info, instrument, warn};

use crate::assemble::{GeneratedGraph, assemble};
use crate::config::GenerationConfig;
use crate::context::Context;
use crate::document::TaskDocument;
use crate::expand::{GroupRegistry, GroupStrategy, KindOutputs};
use crate::kind::Kind;
use crate::loader::KindLoader;
use crate::transform::{Transform, TransformRegistry};
use crate::{Error, Result};

/// Generates the task graph of a set of kinds.
///
/// # Example
///
/// ```ignore
/// let kinds = load_kinds(&config.kinds_path(root))?;
/// let graph = TaskGraphGenerator::new(config.parameters.clone())
///     .parallel(config.parallel)
///     .generate(&kinds)?;
/// ```
#[derive(Debug, Clone)]
pub struct TaskGraphGenerator {
    transforms: TransformRegistry,
    groups: GroupRegistry,
    parameters: Context,
    parallel: bool,
}

impl TaskGraphGenerator {
    /// Create a generator with the built-in transforms and groupings.
    #[must_use]
    pub fn new(parameters: Context) -> Self {
        Self {
            transforms: TransformRegistry::with_builtins(),
            groups: GroupRegistry::with_builtins(),
            parameters,
            parallel: true,
        }
    }

    /// Create a generator from a loaded configuration.
    #[must_use]
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self::new(config.parameters.clone()).parallel(config.parallel)
    }

    /// Enable or disable concurrent processing of independent kinds.
    #[must_use]
    pub const fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Register an additional transform.
    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transforms.register(transform);
        self
    }

    /// Register an additional grouping strategy.
    #[must_use]
    pub fn with_group(mut self, strategy: impl GroupStrategy + 'static) -> Self {
        self.groups.register(strategy);
        self
    }

    /// Global parameters.
    #[must_use]
    pub fn parameters(&self) -> &Context {
        &self.parameters
    }

    /// Order kinds into levels; a kind only depends on kinds of lower levels.
    ///
    /// Names within a level are sorted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKindDeclaration`] for duplicate kind names, a
    /// kind-dependency on an undeclared kind, or a cycle between kinds.
    pub fn kind_levels(kinds: &[Kind]) -> Result<Vec<Vec<String>>> {
        let mut graph = DependencyGraph::new();
        for kind in kinds {
            graph
                .add_node(kind.name(), kind.clone())
                .map_err(|_| Error::invalid_kind(kind.name(), "declared more than once"))?;
        }
        graph.add_dependency_edges().map_err(|e| {
            match e.into_missing_pairs().into_iter().next() {
                Some((kind, dependency)) => Error::invalid_kind(
                    kind,
                    format!("kind-dependency '{dependency}' is not a declared kind"),
                ),
                None => Error::config("kind dependencies could not be resolved"),
            }
        })?;

        let levels = graph.parallel_levels().map_err(|e| match e {
            GraphError::CycleDetected { cycle } => Error::invalid_kind(
                cycle.first().cloned().unwrap_or_default(),
                format!("kind-dependencies form a cycle: {}", cycle.join(" -> ")),
            ),
            other => Error::Graph(other),
        })?;

        Ok(levels
            .into_iter()
            .map(|level| {
                let mut names: Vec<String> = level.into_iter().map(|node| node.name).collect();
                names.sort_unstable();
                names
            })
            .collect())
    }

    /// Expand every kind and assemble the result.
    ///
    /// Kinds run level by level. A failing kind does not stop its siblings,
    /// but kinds depending on it are skipped, and the run fails once all
    /// runnable kinds are done.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KindAborted`] when one kind failed, [`Error::Generation`]
    /// when several did, and assembly errors otherwise.
    #[instrument(name = "generate", skip_all, fields(kinds = kinds.len(), parallel = self.parallel))]
    pub fn generate(&self, kinds: &[Kind]) -> Result<GeneratedGraph> {
        let levels = Self::kind_levels(kinds)?;
        let by_name: HashMap<&str, &Kind> = kinds.iter().map(|k| (k.name(), k)).collect();
        let loader = KindLoader::new(&self.transforms, &self.groups, &self.parameters);

        let mut outputs = KindOutputs::new();
        let mut unavailable: HashSet<&str> = HashSet::new();
        let mut errors = Vec::new();

        for level in &levels {
            let mut runnable = Vec::with_capacity(level.len());
            for name in level {
                let Some(kind) = by_name.get(name.as_str()).copied() else {
                    continue;
                };
                if let Some(dep) = kind
                    .kind_dependencies()
                    .iter()
                    .find(|d| unavailable.contains(d.as_str()))
                {
                    warn!(kind = kind.name(), dependency = %dep, "Skipping kind with a failed dependency");
                    unavailable.insert(kind.name());
                } else {
                    runnable.push(kind);
                }
            }

            let results: Vec<(&Kind, Result<Vec<TaskDocument>>)> = if self.parallel {
                runnable
                    .par_iter()
                    .map(|kind| (*kind, loader.load(kind, &outputs)))
                    .collect()
            } else {
                runnable
                    .iter()
                    .map(|kind| (*kind, loader.load(kind, &outputs)))
                    .collect()
            };

            for (kind, result) in results {
                match result {
                    Ok(tasks) => {
                        outputs.insert(kind.name().to_string(), tasks);
                    }
                    Err(error) => {
                        warn!(kind = kind.name(), error = %error, "Kind aborted");
                        unavailable.insert(kind.name());
                        errors.push(error.in_kind(kind.name()));
                    }
                }
            }
        }

        match errors.len() {
            0 => {}
            1 => return Err(errors.remove(0)),
            _ => return Err(Error::Generation { errors }),
        }

        let documents = levels
            .iter()
            .flatten()
            .filter_map(|name| outputs.remove(name))
            .flatten();
        let graph = assemble(documents)?;
        info!(tasks = graph.len(), "Generated task graph");
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::KindDeclaration;
    use serde_json::{Value, json};

    fn kind(name: &str, value: Value) -> Kind {
        let declaration: KindDeclaration = serde_json::from_value(value).unwrap();
        Kind::from_declaration(name, declaration).unwrap()
    }

    fn inline(name: &str, deps: &[&str]) -> Kind {
        kind(
            name,
            json!({
                "transforms": ["task"],
                "kind-dependencies": deps,
                "task-template": {"description": name},
                "tasks": {"one": {}},
            }),
        )
    }

    #[test]
    fn test_kind_levels() {
        let kinds = [
            inline("release-github", &["beetmover"]),
            inline("beetmover", &["build", "signing"]),
            inline("signing", &["build"]),
            inline("build", &[]),
            inline("docs", &[]),
        ];
        let levels = TaskGraphGenerator::kind_levels(&kinds).unwrap();
        assert_eq!(
            levels,
            vec![
                vec!["build".to_string(), "docs".to_string()],
                vec!["signing".to_string()],
                vec!["beetmover".to_string()],
                vec!["release-github".to_string()],
            ]
        );
    }

    #[test]
    fn test_undeclared_kind_dependency() {
        let err = TaskGraphGenerator::kind_levels(&[inline("beetmover", &["build"])]).unwrap_err();
        assert!(err.to_string().contains("kind-dependency 'build' is not a declared kind"));
    }

    #[test]
    fn test_kind_cycle() {
        let kinds = [inline("a", &["b"]), inline("b", &["a"])];
        let err = TaskGraphGenerator::kind_levels(&kinds).unwrap_err();
        assert!(matches!(err, Error::InvalidKindDeclaration { ref reason, .. } if reason.contains("cycle")));
    }

    #[test]
    fn test_duplicate_kind() {
        let kinds = [inline("a", &[]), inline("a", &[])];
        assert!(TaskGraphGenerator::kind_levels(&kinds).is_err());
    }

    #[test]
    fn test_single_failure_is_kind_aborted() {
        let broken = kind(
            "broken",
            json!({"transforms": ["task"], "kind-dependencies": [], "tasks": {"one": {}}}),
        );
        let kinds = [inline("build", &[]), broken];
        let err = TaskGraphGenerator::new(Context::new()).generate(&kinds).unwrap_err();
        match err {
            Error::KindAborted { kind, source } => {
                assert_eq!(kind, "broken");
                assert!(matches!(*source, Error::TransformFailure { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_failures_are_collected_and_dependents_skipped() {
        let broken = |name: &str| {
            kind(
                name,
                json!({"transforms": ["task"], "kind-dependencies": [], "tasks": {"one": {}}}),
            )
        };
        let kinds = [
            broken("a"),
            broken("b"),
            inline("c", &["a"]),
            inline("d", &[]),
        ];
        for parallel in [true, false] {
            let err = TaskGraphGenerator::new(Context::new())
                .parallel(parallel)
                .generate(&kinds)
                .unwrap_err();
            match err {
                Error::Generation { errors } => {
                    let kinds: Vec<&str> = errors
                        .iter()
                        .map(|e| match e {
                            Error::KindAborted { kind, .. } => kind.as_str(),
                            _ => "?",
                        })
                        .collect();
                    assert_eq!(kinds, ["a", "b"]);
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn test_serial_and_parallel_agree() {
        let kinds = [
            inline("build", &[]),
            inline("docs", &[]),
            inline("lint", &[]),
        ];
        let serial = TaskGraphGenerator::new(Context::new())
            .parallel(false)
            .generate(&kinds)
            .unwrap();
        let parallel = TaskGraphGenerator::new(Context::new())
            .parallel(true)
            .generate(&kinds)
            .unwrap();
        assert_eq!(serial, parallel);
        assert_eq!(serial.len(), 3);
    }
}
