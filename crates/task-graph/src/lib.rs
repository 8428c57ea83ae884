//! Dependency DAG algorithms for kindling.
//!
//! This crate provides a directed acyclic graph built on petgraph. The same
//! graph type orders kinds by their `kind-dependencies` and checks closure of
//! the final task graph, so it is generic over the node payload.
//!
//! # Key Types
//!
//! - [`DependencyGraph`]: the graph structure for registering nodes and querying order
//! - [`GraphNodeData`]: trait that node payloads implement to expose their dependencies
//! - [`GraphNode`]: a node in the graph containing the node name and payload
//!
//! # Example
//!
//! ```ignore
//! use kindling_task_graph::{DependencyGraph, GraphNodeData};
//!
//! struct KindNode {
//!     depends_on: Vec<String>,
//! }
//!
//! impl GraphNodeData for KindNode {
//!     fn dependency_names(&self) -> impl Iterator<Item = &str> {
//!         self.depends_on.iter().map(String::as_str)
//!     }
//! }
//!
//! let mut graph = DependencyGraph::new();
//! graph.add_node("build", KindNode { depends_on: vec![] })?;
//! graph.add_node("beetmover", KindNode { depends_on: vec!["build".to_string()] })?;
//! graph.add_dependency_edges()?;
//!
//! let levels = graph.parallel_levels()?;
//! ```

mod error;
mod graph;
mod validation;

pub use error::{Error, Result};
pub use graph::{DependencyGraph, GraphNode, ParallelLevels, TopologicalOrder, transitive_closure};
pub use validation::ValidationResult;

/// Trait for payloads that can be stored in a [`DependencyGraph`].
///
/// Implement this for a node type so it can take part in dependency
/// resolution. Dependencies are referenced by node name.
pub trait GraphNodeData: Clone {
    /// Returns the names of the nodes this node depends on.
    fn dependency_names(&self) -> impl Iterator<Item = &str>;
}
