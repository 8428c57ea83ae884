//! Grouping strategies for the `multi-dep` loader.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::UpstreamTask;

/// Upstream tasks that become one downstream task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskGroup<'a> {
    /// Group key; becomes the provisional name of the downstream task.
    pub key: String,
    /// Members in upstream order.
    pub members: Vec<UpstreamTask<'a>>,
}

/// Partitions upstream tasks into groups.
///
/// Implementations must be deterministic: groups appear in the order their
/// first member appears in `tasks`, and members keep their relative order.
pub trait GroupStrategy: Send + Sync {
    /// Name used by `group-by`.
    fn name(&self) -> &str;

    /// Partition `tasks`. Tasks may be left out of every group.
    fn group<'a>(&self, tasks: &[UpstreamTask<'a>]) -> Vec<TaskGroup<'a>>;
}

/// One group per upstream task, keyed by its label.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleGroup;

impl GroupStrategy for SingleGroup {
    fn name(&self) -> &str {
        "single"
    }

    fn group<'a>(&self, tasks: &[UpstreamTask<'a>]) -> Vec<TaskGroup<'a>> {
        tasks
            .iter()
            .map(|task| TaskGroup {
                key: task.task.label.clone(),
                members: vec![*task],
            })
            .collect()
    }
}

/// One group per distinct value of an upstream attribute.
///
/// Tasks without the attribute are skipped.
#[derive(Debug, Clone)]
pub struct AttributeGroup {
    name: String,
    attribute: String,
}

impl AttributeGroup {
    /// Group on `attribute`, registered as `name`.
    pub fn new(name: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attribute: attribute.into(),
        }
    }

    /// Group on `attribute`, registered under the same name.
    pub fn on(attribute: impl Into<String>) -> Self {
        let attribute = attribute.into();
        Self::new(attribute.clone(), attribute)
    }
}

impl GroupStrategy for AttributeGroup {
    fn name(&self) -> &str {
        &self.name
    }

    fn group<'a>(&self, tasks: &[UpstreamTask<'a>]) -> Vec<TaskGroup<'a>> {
        let mut groups: Vec<TaskGroup<'a>> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for task in tasks {
            let Some(key) = task.task.attribute(&self.attribute) else {
                debug!(task = %task.task.label, attribute = %self.attribute, "Skipping task without grouping attribute");
                continue;
            };
            if let Some(&i) = index.get(&key) {
                groups[i].members.push(*task);
            } else {
                index.insert(key.clone(), groups.len());
                groups.push(TaskGroup {
                    key,
                    members: vec![*task],
                });
            }
        }
        groups
    }
}

/// Registry of grouping strategies by name.
#[derive(Clone, Default)]
pub struct GroupRegistry {
    strategies: HashMap<String, Arc<dyn GroupStrategy>>,
}

impl GroupRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `single`, `build-type`, `release-type` and `component`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(SingleGroup);
        for attribute in ["build-type", "release-type", "component"] {
            registry.register(AttributeGroup::on(attribute));
        }
        registry
    }

    /// Register a strategy under its name, replacing any previous one.
    pub fn register(&mut self, strategy: impl GroupStrategy + 'static) {
        self.strategies
            .insert(strategy.name().to_string(), Arc::new(strategy));
    }

    /// Look a strategy up.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn GroupStrategy> {
        self.strategies.get(name).map(Arc::as_ref)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.strategies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for GroupRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TaskDocument;
    use serde_json::json;

    fn task(label: &str, build_type: Option<&str>) -> TaskDocument {
        let mut value = json!({
            "label": label,
            "kind": "beetmover",
            "description": "upload",
            "attributes": {},
        });
        if let Some(bt) = build_type {
            value["attributes"]["build-type"] = json!(bt);
        }
        serde_json::from_value(value).unwrap()
    }

    fn labels<'a>(group: &'a TaskGroup<'_>) -> Vec<&'a str> {
        group.members.iter().map(|m| m.task.label.as_str()).collect()
    }

    #[test]
    fn test_group_by_build_type() {
        let tasks = [
            task("t1", Some("beta")),
            task("t2", Some("release")),
            task("t3", Some("beta")),
        ];
        let upstream: Vec<UpstreamTask<'_>> = tasks
            .iter()
            .map(|t| UpstreamTask::new("beetmover", t))
            .collect();

        let groups = AttributeGroup::on("build-type").group(&upstream);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, "beta");
        assert_eq!(labels(&groups[0]), ["t1", "t3"]);
        assert_eq!(groups[1].key, "release");
        assert_eq!(labels(&groups[1]), ["t2"]);
    }

    #[test]
    fn test_tasks_without_attribute_are_skipped() {
        let tasks = [task("t1", None), task("t2", Some("beta"))];
        let upstream: Vec<_> = tasks.iter().map(|t| UpstreamTask::new("b", t)).collect();
        let groups = AttributeGroup::on("build-type").group(&upstream);
        assert_eq!(groups.len(), 1);
        assert_eq!(labels(&groups[0]), ["t2"]);
    }

    #[test]
    fn test_single_group() {
        let tasks = [task("t1", None), task("t2", None)];
        let upstream: Vec<_> = tasks.iter().map(|t| UpstreamTask::new("b", t)).collect();
        let groups = SingleGroup.group(&upstream);
        let keys: Vec<&str> = groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, ["t1", "t2"]);
    }

    #[test]
    fn test_registry_builtins() {
        let registry = GroupRegistry::with_builtins();
        assert_eq!(
            registry.names(),
            ["build-type", "component", "release-type", "single"]
        );
        assert!(registry.get("platform").is_none());
    }
}
