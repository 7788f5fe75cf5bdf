//! Prelude module - commonly used types for convenient import.
//!
//! Use `use anvil_core::prelude::*;` to import all essential types.

// Coordinates and artifacts
pub use crate::{Artifact, Dependency, Exclusion, PluginCoordinate};

// Repositories
pub use crate::{DependencyFilter, LocalRepository, RemoteRepository, RepositoryContext};

// Build model
pub use crate::{
    Build, ConfigNode, ExecutionRequest, PluginDeclaration, PluginExecutionDeclaration, Project,
    Session, Settings,
};

// Dynamic values
pub use crate::{PropertyAccess, PropertyResult, Value};

// Utilities
pub use crate::{CycleError, DependencyGraph, PhasingExecutor};
