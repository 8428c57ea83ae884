//! Dependency graph builder using petgraph.
//!
//! Nodes are registered by name first; edges are derived afterwards from each
//! payload's dependency names so that missing dependencies and cycles can be
//! reported over the whole graph at once.

use crate::{Error, GraphNodeData, Result};
use petgraph::algo::{is_cyclic_directed, tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{EdgeRef, IntoNodeReferences};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// A node in the dependency graph.
#[derive(Debug, Clone)]
pub struct GraphNode<T> {
    /// Name of the node.
    pub name: String,
    /// The node payload.
    pub data: T,
}

/// A topologically sorted sequence of nodes.
///
/// Every node appears after all of the nodes it depends on.
pub type TopologicalOrder<T> = Vec<GraphNode<T>>;

/// Levels of nodes that do not depend on each other.
///
/// All nodes of level N only depend on nodes of levels below N, so the nodes
/// inside one level may be processed concurrently.
pub type ParallelLevels<T> = Vec<Vec<GraphNode<T>>>;

/// Dependency graph for ordering and closure validation.
///
/// Generic over any payload implementing [`GraphNodeData`]. Edges point from
/// a dependency to its dependent.
pub struct DependencyGraph<T: GraphNodeData> {
    graph: DiGraph<GraphNode<T>, ()>,
    name_to_node: HashMap<String, NodeIndex>,
}

impl<T: GraphNodeData> DependencyGraph<T> {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            name_to_node: HashMap::new(),
        }
    }

    /// Add a single node to the graph.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateNode`] if a node with the same name exists.
    pub fn add_node(&mut self, name: &str, data: T) -> Result<NodeIndex> {
        if self.name_to_node.contains_key(name) {
            return Err(Error::DuplicateNode {
                name: name.to_string(),
            });
        }

        let node_index = self.graph.add_node(GraphNode {
            name: name.to_string(),
            data,
        });
        self.name_to_node.insert(name.to_string(), node_index);
        debug!("Added graph node '{}'", name);

        Ok(node_index)
    }

    /// Get a reference to a node by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&GraphNode<T>> {
        self.name_to_node
            .get(name)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    /// Add dependency edges after all nodes have been added.
    ///
    /// A dependency listed twice by the same node produces a single edge.
    ///
    /// # Errors
    ///
    /// Returns an error listing every dependency that names a missing node.
    /// No edge is added in that case.
    pub fn add_dependency_edges(&mut self) -> Result<()> {
        let mut missing_deps = Vec::new();
        let mut edges_to_add = Vec::new();

        for (node_index, node) in self.graph.node_references() {
            for dep_name in node.data.dependency_names() {
                if let Some(&dep_index) = self.name_to_node.get(dep_name) {
                    edges_to_add.push((dep_index, node_index));
                } else {
                    missing_deps.push((node.name.clone(), dep_name.to_string()));
                }
            }
        }

        match missing_deps.len() {
            0 => {}
            1 => {
                let (node, dependency) = missing_deps.remove(0);
                return Err(Error::MissingDependency { node, dependency });
            }
            _ => {
                return Err(Error::MissingDependencies {
                    missing: missing_deps,
                });
            }
        }

        for (from, to) in edges_to_add {
            self.graph.update_edge(from, to, ());
        }

        Ok(())
    }

    /// Check if the graph has cycles.
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Names of the nodes in one dependency cycle, if the graph has any.
    ///
    /// The first name is repeated at the end so the result reads as a path.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        tarjan_scc(&self.graph).into_iter().find_map(|component| {
            let is_cycle = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&idx| self.graph.contains_edge(idx, idx));
            if !is_cycle {
                return None;
            }
            let mut names: Vec<String> = component
                .iter()
                .map(|&idx| self.graph[idx].name.clone())
                .collect();
            names.sort();
            if let Some(first) = names.first().cloned() {
                names.push(first);
            }
            Some(names)
        })
    }

    fn cycle_error(&self) -> Error {
        Error::CycleDetected {
            cycle: self.find_cycle().unwrap_or_default(),
        }
    }

    /// Get the nodes in topological order.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph contains cycles.
    pub fn topological_sort(&self) -> Result<TopologicalOrder<T>> {
        if self.has_cycles() {
            return Err(self.cycle_error());
        }

        match toposort(&self.graph, None) {
            Ok(sorted_indices) => Ok(sorted_indices
                .into_iter()
                .map(|idx| self.graph[idx].clone())
                .collect()),
            Err(_) => Err(Error::TopologicalSortFailed {
                reason: "petgraph toposort failed".to_string(),
            }),
        }
    }

    /// Group nodes into dependency levels.
    ///
    /// Level 0 holds nodes without dependencies; every other node sits one
    /// level above its deepest dependency.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph contains cycles.
    pub fn parallel_levels(&self) -> Result<ParallelLevels<T>> {
        let sorted = self.topological_sort()?;

        let mut levels: ParallelLevels<T> = Vec::new();
        let mut processed: HashMap<String, usize> = HashMap::new();

        for node in sorted {
            let mut level = 0;
            for dep in node.data.dependency_names() {
                if let Some(&dep_level) = processed.get(dep) {
                    level = level.max(dep_level + 1);
                }
            }

            if level >= levels.len() {
                levels.resize_with(level + 1, Vec::new);
            }
            processed.insert(node.name.clone(), level);
            levels[level].push(node);
        }

        Ok(levels)
    }

    /// Get the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Check if a node exists in the graph.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.name_to_node.contains_key(name)
    }

    /// Iterate over all nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode<T>> {
        self.graph.node_references().map(|(_, node)| node)
    }

    /// Iterate over all edges as `(dependency, dependent)` name pairs.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.graph.edge_references().map(|edge| {
            (
                self.graph[edge.source()].name.as_str(),
                self.graph[edge.target()].name.as_str(),
            )
        })
    }
}

impl<T: GraphNodeData> Default for DependencyGraph<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the transitive closure of dependencies from an initial set.
///
/// Given a set of starting nodes and a function to retrieve dependencies,
/// returns all nodes reachable by following dependency edges, including the
/// starting nodes themselves.
///
/// # Example
///
/// ```ignore
/// use kindling_task_graph::transitive_closure;
/// use std::collections::HashMap;
///
/// let deps: HashMap<&str, Vec<String>> = [
///     ("build-beta", vec![]),
///     ("beetmover-beta", vec!["build-beta".to_string()]),
///     ("release-github-beta", vec!["beetmover-beta".to_string()]),
/// ].into_iter().collect();
///
/// let closure = transitive_closure(
///     ["release-github-beta"],
///     |name| deps.get(name).map(|v| v.as_slice()),
/// );
/// // closure contains all three labels
/// ```
#[must_use]
pub fn transitive_closure<'a>(
    initial: impl IntoIterator<Item = &'a str>,
    get_deps: impl Fn(&str) -> Option<&'a [String]>,
) -> HashSet<String> {
    let mut all = HashSet::new();
    let mut frontier: Vec<&str> = Vec::new();

    for name in initial {
        if all.insert(name.to_string()) {
            frontier.push(name);
        }
    }

    while let Some(current) = frontier.pop() {
        if let Some(deps) = get_deps(current) {
            for dep in deps {
                if all.insert(dep.clone()) {
                    frontier.push(dep.as_str());
                }
            }
        }
    }

    all
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, Default)]
    struct TestNode {
        depends_on: Vec<String>,
    }

    impl TestNode {
        fn new(deps: &[&str]) -> Self {
            Self {
                depends_on: deps.iter().map(|s| (*s).to_string()).collect(),
            }
        }
    }

    impl GraphNodeData for TestNode {
        fn dependency_names(&self) -> impl Iterator<Item = &str> {
            self.depends_on.iter().map(String::as_str)
        }
    }

    fn positions(sorted: &[GraphNode<TestNode>]) -> HashMap<String, usize> {
        sorted
            .iter()
            .enumerate()
            .map(|(i, node)| (node.name.clone(), i))
            .collect()
    }

    #[test]
    fn test_graph_new() {
        let graph: DependencyGraph<TestNode> = DependencyGraph::new();
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn test_add_single_node() {
        let mut graph = DependencyGraph::new();
        graph.add_node("build", TestNode::new(&[])).unwrap();
        assert!(graph.contains("build"));
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.get("build").unwrap().name, "build");
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut graph = DependencyGraph::new();
        graph
            .add_node("release-github-beta", TestNode::new(&[]))
            .unwrap();

        let err = graph
            .add_node("release-github-beta", TestNode::new(&[]))
            .unwrap_err();
        assert_eq!(
            err,
            Error::DuplicateNode {
                name: "release-github-beta".to_string()
            }
        );
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_dependencies_are_ordered() {
        let mut graph = DependencyGraph::new();
        graph.add_node("build", TestNode::new(&[])).unwrap();
        graph.add_node("beetmover", TestNode::new(&["build"])).unwrap();
        graph
            .add_node("release-github", TestNode::new(&["build", "beetmover"]))
            .unwrap();
        graph.add_dependency_edges().unwrap();

        assert!(!graph.has_cycles());
        let sorted = graph.topological_sort().unwrap();
        let positions = positions(&sorted);

        assert!(positions["build"] < positions["beetmover"]);
        assert!(positions["beetmover"] < positions["release-github"]);
    }

    #[test]
    fn test_cycle_detection() {
        let mut graph = DependencyGraph::new();
        graph.add_node("a", TestNode::new(&["c"])).unwrap();
        graph.add_node("b", TestNode::new(&["a"])).unwrap();
        graph.add_node("c", TestNode::new(&["b"])).unwrap();
        graph.add_dependency_edges().unwrap();

        assert!(graph.has_cycles());
        assert_eq!(
            graph.find_cycle(),
            Some(vec!["a".into(), "b".into(), "c".into(), "a".into()])
        );
        assert!(matches!(
            graph.topological_sort(),
            Err(Error::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_self_dependency_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_node("self_ref", TestNode::new(&["self_ref"])).unwrap();
        graph.add_dependency_edges().unwrap();

        assert!(graph.has_cycles());
        assert_eq!(
            graph.find_cycle(),
            Some(vec!["self_ref".into(), "self_ref".into()])
        );
        assert!(graph.parallel_levels().is_err());
    }

    #[test]
    fn test_acyclic_graph_has_no_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_node("a", TestNode::new(&[])).unwrap();
        graph.add_node("b", TestNode::new(&["a"])).unwrap();
        graph.add_dependency_edges().unwrap();
        assert_eq!(graph.find_cycle(), None);
    }

    #[test]
    fn test_parallel_levels() {
        let mut graph = DependencyGraph::new();

        // Level 0: a, b
        // Level 1: c (a), d (b)
        // Level 2: e (c, d)
        graph.add_node("a", TestNode::new(&[])).unwrap();
        graph.add_node("b", TestNode::new(&[])).unwrap();
        graph.add_node("c", TestNode::new(&["a"])).unwrap();
        graph.add_node("d", TestNode::new(&["b"])).unwrap();
        graph.add_node("e", TestNode::new(&["c", "d"])).unwrap();
        graph.add_dependency_edges().unwrap();

        let levels = graph.parallel_levels().unwrap();
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0].len(), 2);
        assert_eq!(levels[1].len(), 2);
        assert_eq!(levels[2].len(), 1);
        assert_eq!(levels[2][0].name, "e");
    }

    #[test]
    fn test_diamond_dependency() {
        let mut graph = DependencyGraph::new();

        //     a
        //    / \
        //   b   c
        //    \ /
        //     d
        graph.add_node("a", TestNode::new(&[])).unwrap();
        graph.add_node("b", TestNode::new(&["a"])).unwrap();
        graph.add_node("c", TestNode::new(&["a"])).unwrap();
        graph.add_node("d", TestNode::new(&["b", "c"])).unwrap();
        graph.add_dependency_edges().unwrap();

        let levels = graph.parallel_levels().unwrap();
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[1].len(), 2);
        let mut edges: Vec<_> = graph.edges().collect();
        edges.sort_unstable();
        assert_eq!(edges, vec![("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]);
    }

    #[test]
    fn test_single_missing_dependency() {
        let mut graph = DependencyGraph::new();
        graph
            .add_node("release-github-beta", TestNode::new(&["beetmover-beta"]))
            .unwrap();

        let err = graph.add_dependency_edges().unwrap_err();
        assert_eq!(
            err,
            Error::MissingDependency {
                node: "release-github-beta".to_string(),
                dependency: "beetmover-beta".to_string(),
            }
        );
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_multiple_missing_dependencies() {
        let mut graph = DependencyGraph::new();
        graph.add_node("a", TestNode::new(&["x"])).unwrap();
        graph.add_node("b", TestNode::new(&["y"])).unwrap();

        let err = graph.add_dependency_edges().unwrap_err();
        assert_eq!(err.into_missing_pairs().len(), 2);
    }

    #[test]
    fn test_repeated_dependency_single_edge() {
        let mut graph = DependencyGraph::new();
        graph.add_node("a", TestNode::new(&[])).unwrap();
        graph.add_node("b", TestNode::new(&["a", "a"])).unwrap();
        graph.add_dependency_edges().unwrap();

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edges().collect::<Vec<_>>(), vec![("a", "b")]);
    }

    #[test]
    fn test_empty_graph() {
        let graph: DependencyGraph<TestNode> = DependencyGraph::new();
        assert!(!graph.has_cycles());
        assert!(graph.parallel_levels().unwrap().is_empty());
        assert_eq!(graph.edges().count(), 0);
    }

    #[test]
    fn test_transitive_closure() {
        let deps: HashMap<&str, Vec<String>> = [
            ("a", vec![]),
            ("b", vec!["a".to_string()]),
            ("c", vec!["b".to_string()]),
            ("d", vec![]),
        ]
        .into_iter()
        .collect();

        let closure = transitive_closure(["c"], |name| deps.get(name).map(Vec::as_slice));
        assert_eq!(closure.len(), 3);
        assert!(closure.contains("a"));
        assert!(!closure.contains("d"));
    }
}
