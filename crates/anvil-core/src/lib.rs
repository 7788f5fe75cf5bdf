//! Anvil Core - model types and shared utilities for the Anvil build tool.
//!
//! This crate provides:
//! - Plugin coordinates, dependencies and resolved artifacts
//! - Order-sensitive structural equality used by every cache key
//! - Snapshot version normalization
//! - Repository contexts and dependency filters
//! - The built project, settings and session model
//! - Attribute/child configuration trees with dominant/recessive merge
//! - Dynamic values and named-property access for expression evaluation
//! - A cycle-detecting dependency graph
//! - A phased parallel task executor

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod artifact;
pub mod config_node;
pub mod coordinate;
pub mod equality;
pub mod graph;
pub mod phasing;
pub mod project;
pub mod repository;
pub mod session;
pub mod settings;
pub mod value;
pub mod version;

pub use artifact::Artifact;
pub use config_node::ConfigNode;
pub use coordinate::{DEFAULT_TYPE, Dependency, Exclusion, PluginCoordinate};
pub use graph::{CycleError, DependencyGraph};
pub use phasing::{ExecutorError, ExecutorResult, Phase, PhasingExecutor};
pub use project::{
    Build, DuplicateArtifactAttachment, PluginDeclaration, PluginExecutionDeclaration, Project,
};
pub use repository::{DependencyFilter, LocalRepository, RemoteRepository, RepositoryContext};
pub use session::{ExecutionRequest, PluginContext, Session};
pub use settings::Settings;
pub use value::{PropertyAccess, PropertyError, PropertyResult, PropertyTable, Value};
