//! Error types for dependency graph operations.

use thiserror::Error;

/// Result type for dependency graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or ordering a dependency graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A dependency cycle was detected in the graph.
    #[error("Cycle detected in dependency graph: {}", .cycle.join(" -> "))]
    CycleDetected {
        /// Names of the nodes taking part in the cycle.
        cycle: Vec<String>,
    },

    /// Two nodes were registered under the same name.
    #[error("Node '{name}' is already registered")]
    DuplicateNode {
        /// The duplicated node name.
        name: String,
    },

    /// A node depends on another node that doesn't exist.
    #[error("'{node}' depends on missing node '{dependency}'")]
    MissingDependency {
        /// The node that has the missing dependency.
        node: String,
        /// The name of the missing dependency.
        dependency: String,
    },

    /// Multiple missing dependencies were found.
    #[error("Missing dependencies: {}", format_missing(.missing))]
    MissingDependencies {
        /// List of (node, missing_dependency) pairs.
        missing: Vec<(String, String)>,
    },

    /// Failed to perform topological sort.
    #[error("Failed to sort nodes topologically: {reason}")]
    TopologicalSortFailed {
        /// Reason for the failure.
        reason: String,
    },
}

fn format_missing(missing: &[(String, String)]) -> String {
    missing
        .iter()
        .map(|(node, dep)| format!("'{node}' depends on missing node '{dep}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Split an aggregated missing-dependency error into single entries.
    ///
    /// Other variants are returned unchanged as a one-element list.
    #[must_use]
    pub fn into_missing_pairs(self) -> Vec<(String, String)> {
        match self {
            Self::MissingDependency { node, dependency } => vec![(node, dependency)],
            Self::MissingDependencies { missing } => missing,
            _ => Vec::new(),
        }
    }
}
