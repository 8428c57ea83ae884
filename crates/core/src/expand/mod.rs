//! Dependency expansion: turning upstream tasks into task skeletons.

mod group;

pub use group::{AttributeGroup, GroupRegistry, GroupStrategy, SingleGroup, TaskGroup};

use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use tracing::debug;

use crate::document::{Document, TaskDocument};
use crate::kind::{Kind, LoaderKind};
use crate::{Error, Result};

/// Skeleton key holding the provisional name.
pub const NAME_KEY: &str = "name";
/// Skeleton key holding the primary dependency (`label`, `kind`, `attributes`).
pub const PRIMARY_DEPENDENCY_KEY: &str = "primary-dependency";
/// Skeleton key holding the dependent tasks as a `label -> kind` mapping.
pub const DEPENDENT_TASKS_KEY: &str = "dependent-tasks";

/// Tasks already generated, per kind, in generation order.
pub type KindOutputs = BTreeMap<String, Vec<TaskDocument>>;

/// A generated task of an upstream kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpstreamTask<'a> {
    /// The kind that generated it.
    pub kind: &'a str,
    /// The task itself.
    pub task: &'a TaskDocument,
}

impl<'a> UpstreamTask<'a> {
    /// Pair a task with its kind.
    #[must_use]
    pub const fn new(kind: &'a str, task: &'a TaskDocument) -> Self {
        Self { kind, task }
    }
}

/// An in-progress task, before template merge and transforms.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSkeleton<'a> {
    /// Provisional identity, e.g. the group key `beta`.
    pub name: String,
    /// The upstream task this one primarily derives from.
    pub primary: Option<UpstreamTask<'a>>,
    /// Every upstream task it depends on, primary included.
    pub dependencies: Vec<UpstreamTask<'a>>,
    /// Inline body from the kind's `tasks` mapping.
    pub body: Map<String, Value>,
}

impl TaskSkeleton<'_> {
    /// The skeleton as a document, with upstream metadata under the
    /// loader-only keys.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut document = Document::from(self.body.clone());
        document.insert(NAME_KEY, self.name.clone());
        if let Some(primary) = self.primary {
            document.insert(
                PRIMARY_DEPENDENCY_KEY,
                json!({
                    "label": primary.task.label,
                    "kind": primary.kind,
                    "attributes": primary.task.attributes,
                }),
            );
        }
        if !self.dependencies.is_empty() {
            let dependents: Map<String, Value> = self
                .dependencies
                .iter()
                .map(|dep| (dep.task.label.clone(), Value::from(dep.kind)))
                .collect();
            document.insert(DEPENDENT_TASKS_KEY, dependents);
        }
        document
    }

    /// Attributes of the primary dependency, if any.
    #[must_use]
    pub fn primary_attributes(&self) -> Option<&Map<String, Value>> {
        self.primary.map(|p| &p.task.attributes)
    }
}

/// Expand a kind into skeletons.
///
/// The `default` loader yields one skeleton per inline task. `single-dep`
/// yields one per accepted task of the primary kind. `multi-dep` collects the
/// accepted tasks of every kind-dependency and yields one per group.
/// `upstream` is only read.
///
/// # Errors
///
/// Returns [`Error::UnknownGroupStrategy`] when `group-by` is not registered
/// and [`Error::InvalidKindDeclaration`] when a group has no task of any
/// primary kind.
pub fn expand<'a>(
    kind: &'a Kind,
    upstream: &'a KindOutputs,
    groups: &GroupRegistry,
) -> Result<Vec<TaskSkeleton<'a>>> {
    let skeletons = match kind.loader() {
        LoaderKind::Default => expand_inline(kind),
        LoaderKind::SingleDep => expand_single(kind, upstream)?,
        LoaderKind::MultiDep => expand_grouped(kind, upstream, groups)?,
    };
    debug!(kind = kind.name(), skeletons = skeletons.len(), "Expanded kind");
    Ok(skeletons)
}

fn expand_inline(kind: &Kind) -> Vec<TaskSkeleton<'_>> {
    kind.tasks()
        .iter()
        .map(|(name, body)| TaskSkeleton {
            name: name.clone(),
            primary: None,
            dependencies: Vec::new(),
            body: body.clone(),
        })
        .collect()
}

fn accepted<'a>(kind: &Kind, upstream: &'a KindOutputs, dep_kind: &'a str) -> Vec<UpstreamTask<'a>> {
    upstream
        .get(dep_kind)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter(|task| {
            let keep = kind.accepts(&task.attributes);
            if !keep {
                debug!(kind = kind.name(), task = %task.label, "Filtered out upstream task");
            }
            keep
        })
        .map(|task| UpstreamTask::new(dep_kind, task))
        .collect()
}

fn expand_single<'a>(kind: &'a Kind, upstream: &'a KindOutputs) -> Result<Vec<TaskSkeleton<'a>>> {
    let primary_kind = kind
        .primary_dependency()
        .first()
        .or_else(|| kind.kind_dependencies().first())
        .ok_or_else(|| Error::invalid_kind(kind.name(), "no kind to depend on"))?;

    Ok(accepted(kind, upstream, primary_kind)
        .into_iter()
        .map(|task| {
            let prefix = format!("{primary_kind}-");
            let name = task
                .task
                .label
                .strip_prefix(&prefix)
                .unwrap_or(&task.task.label)
                .to_string();
            TaskSkeleton {
                name,
                primary: Some(task),
                dependencies: vec![task],
                body: Map::new(),
            }
        })
        .collect())
}

fn expand_grouped<'a>(
    kind: &'a Kind,
    upstream: &'a KindOutputs,
    groups: &GroupRegistry,
) -> Result<Vec<TaskSkeleton<'a>>> {
    let strategy_name = kind.group_by().unwrap_or_default();
    let strategy = groups
        .get(strategy_name)
        .ok_or_else(|| Error::UnknownGroupStrategy {
            kind: kind.name().to_string(),
            strategy: strategy_name.to_string(),
            available: groups.names().join(", "),
        })?;

    let tasks: Vec<UpstreamTask<'a>> = kind
        .kind_dependencies()
        .iter()
        .flat_map(|dep_kind| accepted(kind, upstream, dep_kind))
        .collect();

    strategy
        .group(&tasks)
        .into_iter()
        .map(|group| -> Result<TaskSkeleton<'a>> {
            let primary = select_primary(kind, &group)?;
            Ok(TaskSkeleton {
                name: group.key,
                primary: Some(primary),
                dependencies: group.members,
                body: Map::new(),
            })
        })
        .collect()
}

/// The first member of the first listed primary kind present in the group,
/// or the first member when no primary kind is declared.
fn select_primary<'a>(kind: &Kind, group: &TaskGroup<'a>) -> Result<UpstreamTask<'a>> {
    if kind.primary_dependency().is_empty() {
        return group
            .members
            .first()
            .copied()
            .ok_or_else(|| Error::invalid_kind(kind.name(), format!("group '{}' is empty", group.key)));
    }
    kind.primary_dependency()
        .iter()
        .find_map(|primary| group.members.iter().find(|m| m.kind == primary.as_str()))
        .copied()
        .ok_or_else(|| {
            Error::invalid_kind(
                kind.name(),
                format!(
                    "group '{}' has no task of primary-dependency {}",
                    group.key,
                    kind.primary_dependency().join(", ")
                ),
            )
        })
}
