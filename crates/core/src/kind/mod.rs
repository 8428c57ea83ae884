//! Kind declarations.
//!
//! A [`KindDeclaration`] is the raw `kind.yml` document; [`Kind`] is its
//! validated, immutable form used by the expander and the loader.

mod filter;
mod files;

pub use filter::{AttributeFilter, FilterMode};
pub use files::{load_kind_file, load_kinds, parse_kind_yaml, yaml_to_json};

use kindling_task_graph::GraphNodeData;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use tracing::warn;

use crate::{Error, Result};

/// Raw kind declaration as written in `kind.yml`.
///
/// Every field is optional at this level so that missing required fields are
/// reported as [`Error::InvalidKindDeclaration`] rather than parse errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KindDeclaration {
    /// Expansion strategy, e.g. `multi-dep`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loader: Option<String>,
    /// Ordered transform identifiers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transforms: Option<Vec<String>>,
    /// Upstream kinds this kind reads tasks from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind_dependencies: Option<Vec<String>>,
    /// Upstream kind(s) supplying the primary dependency of each task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_dependency: Option<PrimaryDependency>,
    /// Grouping strategy name for the `multi-dep` loader.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
    /// Template merged under every generated task.
    #[serde(default, alias = "task-defaults", skip_serializing_if = "Option::is_none")]
    pub task_template: Option<Value>,
    /// Inline tasks for the `default` loader.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Map<String, Value>>,
    /// Filter predicates (`only-for-*`, `not-for-*`) and any other key.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One upstream kind, or an ordered preference list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryDependency {
    /// A single kind.
    One(String),
    /// Kinds in order of preference.
    Many(Vec<String>),
}

impl PrimaryDependency {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(kind) => vec![kind],
            Self::Many(kinds) => kinds,
        }
    }
}

/// Expansion strategy of a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoaderKind {
    /// One task per entry of the kind's inline `tasks` mapping.
    Default,
    /// One task per matching upstream task of the primary kind.
    SingleDep,
    /// One task per group of matching upstream tasks.
    MultiDep,
}

impl LoaderKind {
    /// The canonical name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::SingleDep => "single-dep",
            Self::MultiDep => "multi-dep",
        }
    }
}

impl FromStr for LoaderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match normalize_reference(s).as_str() {
            "default" | "transform" => Ok(Self::Default),
            "single-dep" => Ok(Self::SingleDep),
            "multi-dep" => Ok(Self::MultiDep),
            other => Err(format!("unknown loader '{other}'")),
        }
    }
}

/// Normalise a loader or transform reference to its short name.
///
/// Python-style references keep their last module segment:
/// `android_taskgraph.loader.multi_dep:loader` becomes `multi-dep`.
#[must_use]
pub fn normalize_reference(reference: &str) -> String {
    let module = reference.split(':').next().unwrap_or(reference);
    let last = module.rsplit('.').next().unwrap_or(module);
    last.trim().replace('_', "-")
}

/// A validated kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Kind {
    name: String,
    loader: LoaderKind,
    transforms: Vec<String>,
    kind_dependencies: Vec<String>,
    primary_dependency: Vec<String>,
    filters: Vec<AttributeFilter>,
    group_by: Option<String>,
    task_template: Map<String, Value>,
    tasks: Vec<(String, Map<String, Value>)>,
    config: Map<String, Value>,
}

impl Kind {
    /// Validate a raw declaration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKindDeclaration`] when a required field is
    /// missing, `primary-dependency` is not listed in `kind-dependencies`,
    /// the loader is unknown or its loader-specific fields are missing.
    pub fn from_declaration(name: impl Into<String>, declaration: KindDeclaration) -> Result<Self> {
        let name = name.into();
        let invalid = |reason: String| Error::invalid_kind(&name, reason);

        let transforms = declaration
            .transforms
            .ok_or_else(|| invalid("missing required field `transforms`".into()))?
            .iter()
            .map(|t| normalize_reference(t))
            .collect();
        let kind_dependencies = declaration
            .kind_dependencies
            .ok_or_else(|| invalid("missing required field `kind-dependencies`".into()))?;

        let loader = match declaration.loader.as_deref() {
            None => LoaderKind::Default,
            Some(reference) => reference.parse().map_err(invalid)?,
        };

        let primary_dependency = declaration
            .primary_dependency
            .map(PrimaryDependency::into_vec)
            .unwrap_or_default();
        if let Some(primary) = primary_dependency
            .iter()
            .find(|p| !kind_dependencies.contains(p))
        {
            return Err(invalid(format!(
                "primary-dependency '{primary}' is not listed in kind-dependencies"
            )));
        }

        let task_template = match declaration.task_template {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(invalid("task-template must be a mapping".into())),
        };

        let mut tasks = Vec::new();
        for (task_name, body) in declaration.tasks.unwrap_or_default() {
            match body {
                Value::Object(map) => tasks.push((task_name, map)),
                Value::Null => tasks.push((task_name, Map::new())),
                _ => return Err(invalid(format!("task '{task_name}' must be a mapping"))),
            }
        }

        let mut filters = Vec::new();
        let mut config = Map::new();
        for (key, value) in declaration.extra {
            match AttributeFilter::from_entry(&key, &value) {
                Some(filter) => filters.push(filter.map_err(invalid)?),
                None => {
                    config.insert(key, value);
                }
            }
        }

        match loader {
            LoaderKind::Default if tasks.is_empty() => {
                return Err(invalid("the default loader requires a `tasks` mapping".into()));
            }
            LoaderKind::SingleDep | LoaderKind::MultiDep if kind_dependencies.is_empty() => {
                return Err(invalid(format!(
                    "the {} loader requires at least one kind-dependency",
                    loader.as_str()
                )));
            }
            LoaderKind::SingleDep if primary_dependency.is_empty() && kind_dependencies.len() > 1 => {
                return Err(invalid(
                    "primary-dependency is required when several kind-dependencies are listed"
                        .into(),
                ));
            }
            LoaderKind::MultiDep if declaration.group_by.is_none() => {
                return Err(invalid("the multi-dep loader requires `group-by`".into()));
            }
            _ => {}
        }
        if declaration.group_by.is_some() && loader != LoaderKind::MultiDep {
            warn!(kind = %name, loader = loader.as_str(), "Ignoring group-by outside the multi-dep loader");
        }

        Ok(Self {
            name,
            loader,
            transforms,
            kind_dependencies,
            primary_dependency,
            filters,
            group_by: declaration.group_by,
            task_template,
            tasks,
            config,
        })
    }

    /// The kind name (its directory name).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The expansion strategy.
    #[must_use]
    pub fn loader(&self) -> LoaderKind {
        self.loader
    }

    /// Normalised transform identifiers in declaration order.
    #[must_use]
    pub fn transforms(&self) -> &[String] {
        &self.transforms
    }

    /// Upstream kinds.
    #[must_use]
    pub fn kind_dependencies(&self) -> &[String] {
        &self.kind_dependencies
    }

    /// Primary dependency kinds in order of preference (may be empty).
    #[must_use]
    pub fn primary_dependency(&self) -> &[String] {
        &self.primary_dependency
    }

    /// Upstream task filters.
    #[must_use]
    pub fn filters(&self) -> &[AttributeFilter] {
        &self.filters
    }

    /// Grouping strategy name, for the `multi-dep` loader.
    #[must_use]
    pub fn group_by(&self) -> Option<&str> {
        self.group_by.as_deref()
    }

    /// Template merged under every generated task.
    #[must_use]
    pub fn task_template(&self) -> &Map<String, Value> {
        &self.task_template
    }

    /// Inline tasks of the `default` loader, in declaration order.
    #[must_use]
    pub fn tasks(&self) -> &[(String, Map<String, Value>)] {
        &self.tasks
    }

    /// Any other top-level key of the declaration, for transforms to read.
    #[must_use]
    pub fn config(&self) -> &Map<String, Value> {
        &self.config
    }

    /// Whether an upstream task's attributes satisfy every filter.
    #[must_use]
    pub fn accepts(&self, attributes: &Map<String, Value>) -> bool {
        self.filters.iter().all(|filter| filter.matches(attributes))
    }
}

impl GraphNodeData for Kind {
    fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.kind_dependencies.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn declaration(value: Value) -> KindDeclaration {
        serde_json::from_value(value).unwrap()
    }

    fn release_github() -> Value {
        json!({
            "loader": "android_taskgraph.loader.multi_dep:loader",
            "transforms": ["android_taskgraph.transforms.multi_dep:transforms", "task"],
            "kind-dependencies": ["beetmover"],
            "primary-dependency": "beetmover",
            "group-by": "build-type",
            "only-for-build-types": ["beta", "release"],
            "task-template": {"description": "Create/Update Github release"},
        })
    }

    #[test]
    fn test_normalize_reference() {
        assert_eq!(
            normalize_reference("android_taskgraph.loader.multi_dep:loader"),
            "multi-dep"
        );
        assert_eq!(normalize_reference("taskgraph.transforms.task:transforms"), "task");
        assert_eq!(normalize_reference("github-release"), "github-release");
    }

    #[test]
    fn test_valid_multi_dep_kind() {
        let kind = Kind::from_declaration("release-github", declaration(release_github())).unwrap();
        assert_eq!(kind.name(), "release-github");
        assert_eq!(kind.loader(), LoaderKind::MultiDep);
        assert_eq!(kind.transforms(), ["multi-dep", "task"]);
        assert_eq!(kind.primary_dependency(), ["beetmover"]);
        assert_eq!(kind.group_by(), Some("build-type"));
        assert_eq!(kind.filters().len(), 1);
        assert!(kind.accepts(json!({"build-type": "beta"}).as_object().unwrap()));
        assert!(!kind.accepts(json!({"build-type": "nightly"}).as_object().unwrap()));
    }

    #[test]
    fn test_missing_transforms() {
        let mut value = release_github();
        value.as_object_mut().unwrap().remove("transforms");
        let err = Kind::from_declaration("release-github", declaration(value)).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidKindDeclaration { ref reason, .. } if reason.contains("`transforms`")
        ));
    }

    #[test]
    fn test_missing_kind_dependencies() {
        let mut value = release_github();
        value.as_object_mut().unwrap().remove("kind-dependencies");
        assert!(matches!(
            Kind::from_declaration("release-github", declaration(value)),
            Err(Error::InvalidKindDeclaration { .. })
        ));
    }

    #[test]
    fn test_primary_dependency_must_be_a_kind_dependency() {
        let mut value = release_github();
        value["primary-dependency"] = json!("signing");
        let err = Kind::from_declaration("release-github", declaration(value)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid kind declaration 'release-github': primary-dependency 'signing' is not listed in kind-dependencies"
        );
    }

    #[test]
    fn test_primary_dependency_list() {
        let mut value = release_github();
        value["kind-dependencies"] = json!(["beetmover", "signing"]);
        value["primary-dependency"] = json!(["signing", "beetmover"]);
        let kind = Kind::from_declaration("release-github", declaration(value)).unwrap();
        assert_eq!(kind.primary_dependency(), ["signing", "beetmover"]);
    }

    #[test]
    fn test_multi_dep_requires_group_by() {
        let mut value = release_github();
        value.as_object_mut().unwrap().remove("group-by");
        assert!(matches!(
            Kind::from_declaration("release-github", declaration(value)),
            Err(Error::InvalidKindDeclaration { .. })
        ));
    }

    #[test]
    fn test_unknown_loader() {
        let mut value = release_github();
        value["loader"] = json!("taskgraph.loader.mystery:loader");
        let err = Kind::from_declaration("release-github", declaration(value)).unwrap_err();
        assert!(err.to_string().contains("unknown loader 'mystery'"));
    }

    #[test]
    fn test_default_loader_reads_tasks_in_order() {
        let value = json!({
            "transforms": ["task"],
            "kind-dependencies": [],
            "task-defaults": {"description": "Build"},
            "tasks": {
                "release": {"attributes": {"build-type": "release"}},
                "beta": {"attributes": {"build-type": "beta"}},
            },
            "treeherder-group": "B",
        });
        let kind = Kind::from_declaration("build", declaration(value)).unwrap();
        assert_eq!(kind.loader(), LoaderKind::Default);
        let names: Vec<&str> = kind.tasks().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["release", "beta"]);
        assert_eq!(kind.task_template()["description"], json!("Build"));
        assert_eq!(kind.config()["treeherder-group"], json!("B"));
    }

    #[test]
    fn test_single_dep_needs_primary_with_several_dependencies() {
        let value = json!({
            "loader": "single-dep",
            "transforms": [],
            "kind-dependencies": ["build", "signing"],
        });
        assert!(matches!(
            Kind::from_declaration("beetmover", declaration(value)),
            Err(Error::InvalidKindDeclaration { .. })
        ));
    }

    #[test]
    fn test_task_template_must_be_mapping() {
        let mut value = release_github();
        value["task-template"] = json!(["not", "a", "mapping"]);
        assert!(matches!(
            Kind::from_declaration("release-github", declaration(value)),
            Err(Error::InvalidKindDeclaration { .. })
        ));
    }
}
