//! Error types for kind loading and task graph generation.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

use crate::transform::TransformError;

/// Result type alias for kindling operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while expanding kinds into a task graph.
///
/// Every variant is fatal to a generation run. Kind-level variants abort the
/// kind they occur in; the generator then fails the whole run.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Structural validation of a kind declaration failed.
    #[error("Invalid kind declaration '{kind}': {reason}")]
    #[diagnostic(
        code(kindling::kind::invalid),
        help("Check the kind.yml of '{kind}' against the kind declaration format")
    )]
    InvalidKindDeclaration {
        /// The kind being validated
        kind: String,
        /// What is wrong with it
        reason: String,
    },

    /// A conditional value has no matching case and no `default`.
    #[error(
        "No case of '{class}' at '{path}' matches {}",
        .value.as_deref().map_or_else(|| "an unset attribute".to_string(), |v| format!("'{v}'"))
    )]
    #[diagnostic(
        code(kindling::resolve::unresolved),
        help("Add a case for this value or a `default` branch")
    )]
    UnresolvedConditionKind {
        /// Dotted path of the conditional field
        path: String,
        /// The discriminant class, e.g. `by-level`
        class: String,
        /// The discriminant value found in the context, if any
        value: Option<String>,
    },

    /// A mapping looks like a conditional value but is not well formed.
    #[error("Malformed conditional value at '{path}': {reason}")]
    #[diagnostic(
        code(kindling::resolve::malformed),
        help("A conditional value is a mapping with a single `by-<attribute>` key whose value is a mapping of cases, and a value may match at most one case pattern")
    )]
    MalformedCondition {
        /// Dotted path of the offending field
        path: String,
        /// What is wrong with it
        reason: String,
    },

    /// `group-by` names a grouping function that is not registered.
    #[error("Kind '{kind}' uses unknown group-by strategy '{strategy}'")]
    #[diagnostic(
        code(kindling::expand::unknown_group),
        help("Available strategies: {available}")
    )]
    UnknownGroupStrategy {
        /// The kind declaring the strategy
        kind: String,
        /// The unknown strategy name
        strategy: String,
        /// Comma separated list of registered strategies
        available: String,
    },

    /// A transform rejected a task document.
    #[error("Transform '{transform}' failed in kind '{kind}': {source}")]
    #[diagnostic(code(kindling::transform::failed), help("Offending document:\n{document}"))]
    TransformFailure {
        /// The kind whose pipeline failed
        kind: String,
        /// The failing transform identifier
        transform: String,
        /// The document handed to the transform, as pretty JSON
        document: String,
        /// The underlying transform error
        #[source]
        source: TransformError,
    },

    /// Two task documents share a label.
    #[error("Duplicate task id '{id}'")]
    #[diagnostic(
        code(kindling::graph::duplicate_task),
        help("Two kinds or two groups produced the same label; check group-by and label derivation")
    )]
    DuplicateTaskId {
        /// The duplicated label
        id: String,
    },

    /// A task depends on a label that is not part of the graph.
    #[error("Task '{task}' depends on missing task '{dependency}'")]
    #[diagnostic(code(kindling::graph::dangling_dependency))]
    DanglingDependency {
        /// The referring task
        task: String,
        /// The missing label
        dependency: String,
    },

    /// A kind failed; its tasks are missing from the run.
    #[error("Kind '{kind}' aborted")]
    #[diagnostic(code(kindling::kind::aborted))]
    KindAborted {
        /// The failed kind
        kind: String,
        /// Why it failed
        #[source]
        source: Box<Error>,
    },

    /// Several kinds failed in one run.
    #[error("Task graph generation failed: {} kinds aborted", .errors.len())]
    #[diagnostic(code(kindling::generation_failed))]
    Generation {
        /// Every kind failure, in kind order
        #[related]
        errors: Vec<Error>,
    },

    /// Graph-level failure (cycles between tasks).
    #[error(transparent)]
    #[diagnostic(code(kindling::graph))]
    Graph(#[from] kindling_task_graph::Error),

    /// Configuration or parameters could not be used.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(kindling::config))]
    Config {
        /// The error message
        message: String,
    },

    /// Failed to read a declaration or configuration file.
    #[error("Failed to read {}", .path.display())]
    #[diagnostic(code(kindling::io))]
    Io {
        /// The file being read
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A YAML file could not be parsed.
    #[error("Invalid YAML in {}", .path.display())]
    #[diagnostic(code(kindling::yaml))]
    Yaml {
        /// The file being parsed
        path: PathBuf,
        /// The underlying parse error
        #[source]
        source: serde_yaml::Error,
    },

    /// A document did not have the expected shape.
    #[error("Invalid document: {0}")]
    #[diagnostic(code(kindling::json))]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create an [`Error::InvalidKindDeclaration`].
    pub fn invalid_kind(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKindDeclaration {
            kind: kind.into(),
            reason: reason.into(),
        }
    }

    /// Create an [`Error::MalformedCondition`].
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedCondition {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an [`Error::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Wrap this error as the reason a kind was aborted.
    #[must_use]
    pub fn in_kind(self, kind: impl Into<String>) -> Self {
        Self::KindAborted {
            kind: kind.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through [`Error::KindAborted`].
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::KindAborted { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_message_with_value() {
        let err = Error::UnresolvedConditionKind {
            path: "worker.github-project".into(),
            class: "by-level".into(),
            value: Some("2".into()),
        };
        assert_eq!(
            err.to_string(),
            "No case of 'by-level' at 'worker.github-project' matches '2'"
        );
    }

    #[test]
    fn test_unresolved_message_without_value() {
        let err = Error::UnresolvedConditionKind {
            path: "treeherder.job-symbol".into(),
            class: "by-build-type".into(),
            value: None,
        };
        assert!(err.to_string().ends_with("matches an unset attribute"));
    }

    #[test]
    fn test_root_cause_unwraps_kind() {
        let err = Error::DuplicateTaskId { id: "a".into() }
            .in_kind("release-github")
            .in_kind("outer");
        assert!(matches!(err.root_cause(), Error::DuplicateTaskId { id } if id == "a"));
        assert_eq!(err.to_string(), "Kind 'outer' aborted");
    }

    #[test]
    fn test_diagnostic_codes() {
        let err = Error::invalid_kind("beetmover", "missing field `transforms`");
        assert_eq!(
            err.code().map(|c| c.to_string()).as_deref(),
            Some("kindling::kind::invalid")
        );

        let err = Error::Generation {
            errors: vec![Error::config("a"), Error::config("b")],
        };
        assert_eq!(err.related().map(Iterator::count), Some(2));
    }
}
