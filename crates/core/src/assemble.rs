//! Task graph assembly: registers documents and checks edge closure.

use kindling_task_graph::{DependencyGraph, Error as GraphError, transitive_closure};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::document::TaskDocument;
use crate::{Error, Result};

/// A closed, acyclic task graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedGraph {
    tasks: BTreeMap<String, TaskDocument>,
    /// `(dependency, dependent)` label pairs, sorted.
    edges: Vec<(String, String)>,
    /// Labels in topological order.
    order: Vec<String>,
}

impl GeneratedGraph {
    /// Look a task up by label.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<&TaskDocument> {
        self.tasks.get(label)
    }

    /// All tasks keyed by label.
    #[must_use]
    pub fn tasks(&self) -> &BTreeMap<String, TaskDocument> {
        &self.tasks
    }

    /// Number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the graph holds no task.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Edges as `(dependency, dependent)` pairs.
    #[must_use]
    pub fn edges(&self) -> &[(String, String)] {
        &self.edges
    }

    /// Labels such that every task comes after its dependencies.
    #[must_use]
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Direct dependencies of a task, sorted.
    #[must_use]
    pub fn dependencies(&self, label: &str) -> Vec<&str> {
        self.tasks
            .get(label)
            .map(|task| task.dependencies.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Tasks that directly depend on a task, sorted.
    #[must_use]
    pub fn dependents(&self, label: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(dependency, _)| dependency == label)
            .map(|(_, dependent)| dependent.as_str())
            .collect()
    }

    /// The graph restricted to `targets` and everything they depend on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a target is not a task of this graph.
    pub fn subgraph<'a>(&self, targets: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let targets: Vec<&str> = targets.into_iter().collect();
        if let Some(unknown) = targets.iter().find(|t| !self.tasks.contains_key(**t)) {
            return Err(Error::config(format!("unknown target task '{unknown}'")));
        }

        let dependencies: HashMap<&str, Vec<String>> = self
            .tasks
            .iter()
            .map(|(label, task)| (label.as_str(), task.dependencies.iter().cloned().collect()))
            .collect();
        let closure = transitive_closure(targets, |label| {
            dependencies.get(label).map(Vec::as_slice)
        });

        assemble(
            self.order
                .iter()
                .filter(|label| closure.contains(label.as_str()))
                .filter_map(|label| self.tasks.get(label).cloned()),
        )
    }
}

/// Register task documents and check that they form a closed, acyclic graph.
///
/// # Errors
///
/// Returns [`Error::DuplicateTaskId`] when two documents share a label,
/// [`Error::DanglingDependency`] for the first dependency on a missing label
/// and [`Error::Graph`] for a dependency cycle. No partial graph is returned.
pub fn assemble(documents: impl IntoIterator<Item = TaskDocument>) -> Result<GeneratedGraph> {
    let mut graph = DependencyGraph::new();
    for document in documents {
        let label = document.label.clone();
        graph.add_node(&label, document).map_err(|e| match e {
            GraphError::DuplicateNode { name } => Error::DuplicateTaskId { id: name },
            other => Error::Graph(other),
        })?;
    }

    graph.add_dependency_edges().map_err(|e| {
        match e.into_missing_pairs().into_iter().next() {
            Some((task, dependency)) => Error::DanglingDependency { task, dependency },
            None => Error::config("dependency edges could not be added"),
        }
    })?;
    graph.validate().into_result()?;

    let order: Vec<String> = graph
        .topological_sort()?
        .into_iter()
        .map(|node| node.name)
        .collect();
    let mut edges: Vec<(String, String)> = graph
        .edges()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect();
    edges.sort_unstable();
    let tasks: BTreeMap<String, TaskDocument> = graph
        .nodes()
        .map(|node| (node.name.clone(), node.data.clone()))
        .collect();

    debug!(tasks = tasks.len(), edges = edges.len(), "Assembled task graph");
    Ok(GeneratedGraph { tasks, edges, order })
}
