//! Declarative task-graph expansion for kindling.
//!
//! Kinds are declared in YAML. Each kind expands the tasks of the kinds it
//! depends on into task skeletons, merges them with a template, resolves
//! conditional (`by-<attribute>`) values and runs an ordered list of
//! transforms. The resulting task documents are assembled into a closed,
//! acyclic graph.
//!
//! # Key Types
//!
//! - [`Kind`]: a validated kind declaration
//! - [`ConditionalValue`]: a value that switches on a context attribute
//! - [`Pipeline`] and [`TransformRegistry`]: ordered document transforms
//! - [`GroupRegistry`]: grouping strategies for the `multi-dep` loader
//! - [`TaskGraphGenerator`]: runs every kind and returns a [`GeneratedGraph`]
//!
//! # Example
//!
//! ```ignore
//! use kindling_core::{GenerationConfig, TaskGraphGenerator, load_kinds};
//!
//! let config = GenerationConfig::load(root)?;
//! let kinds = load_kinds(&config.kinds_path(root))?;
//! let graph = TaskGraphGenerator::from_config(&config).generate(&kinds)?;
//! for label in graph.order() {
//!     println!("{label}");
//! }
//! ```

pub mod assemble;
pub mod config;
pub mod context;
pub mod document;
pub mod error;
pub mod expand;
pub mod generator;
pub mod kind;
pub mod loader;
pub mod resolve;
pub mod transform;

pub use assemble::{GeneratedGraph, assemble};
pub use config::{GenerationConfig, load_parameters};
pub use context::Context;
pub use document::{Document, TaskDocument};
pub use error::{Error, Result};
pub use expand::{GroupRegistry, GroupStrategy, TaskSkeleton, UpstreamTask, expand};
pub use generator::TaskGraphGenerator;
pub use kind::{Kind, KindDeclaration, LoaderKind, load_kinds};
pub use loader::KindLoader;
pub use resolve::{ConditionalValue, resolve_document, resolve_keyed_by, resolve_value};
pub use transform::{Pipeline, Transform, TransformContext, TransformError, TransformRegistry};
