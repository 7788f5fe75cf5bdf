//! Prelude module - commonly used types for convenient import.
//!
//! Use `use anvil_plugin::prelude::*;` to import all essential types.

// Errors
pub use crate::{PluginError, PluginResult};

// Managers
pub use crate::{BuildPluginManager, LegacyPluginManager, PluginManager, PluginManagerOptions};

// Mojo contract
pub use crate::{ComponentRegistry, Mojo, MojoContext, MojoError, MojoExecution, MojoLog};

// Descriptors
pub use crate::{MojoDescriptor, ParamType, Parameter, PluginDescriptor};

// Collaborators
pub use crate::{ArtifactContents, ArtifactResolver, ResolutionError, ResolutionRequest};

// Realms
pub use crate::{ClassRealm, ContextRealm, LegacySupport};
