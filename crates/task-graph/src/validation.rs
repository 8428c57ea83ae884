//! Validation utilities for dependency graphs.

use crate::{DependencyGraph, Error, GraphNodeData};

/// Result of graph validation.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether the graph is valid.
    pub is_valid: bool,
    /// List of validation errors, if any.
    pub errors: Vec<Error>,
}

impl ValidationResult {
    /// Create a valid result.
    #[must_use]
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: vec![],
        }
    }

    /// Create an invalid result with errors.
    #[must_use]
    pub fn invalid(errors: Vec<Error>) -> Self {
        Self {
            is_valid: false,
            errors,
        }
    }

    /// Convert into a `Result`, keeping the first error.
    ///
    /// # Errors
    ///
    /// Returns the first recorded error when the graph is invalid.
    pub fn into_result(self) -> crate::Result<()> {
        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<T: GraphNodeData> DependencyGraph<T> {
    /// Validate the graph structure.
    ///
    /// Missing dependencies are caught by `add_dependency_edges()`, so this
    /// checks what can only be seen once edges exist: cycles.
    #[must_use]
    pub fn validate(&self) -> ValidationResult {
        match self.find_cycle() {
            Some(cycle) => ValidationResult::invalid(vec![Error::CycleDetected { cycle }]),
            None => ValidationResult::valid(),
        }
    }
}
