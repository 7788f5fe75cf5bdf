//! Plugin resolution, realm isolation and mojo execution for the Anvil build
//! tool.
//!
//! Running a goal goes through these steps:
//!
//! - [`PluginDependenciesResolver`]: resolve the plugin artifact and its
//!   dependency closure through an external [`ArtifactResolver`]
//! - [`RealmManager`]: build an isolated [`ClassRealm`] from the closure,
//!   importing only the core exports, requested foreign imports and a fixed
//!   set of compatibility classes
//! - [`PluginManager`]: parse and validate the [`PluginDescriptor`] bundled
//!   in the plugin, instantiate the mojo and configure its fields through a
//!   [`ComponentConfigurator`] and the [`ExpressionEvaluator`]
//! - [`BuildPluginManager`]: run the configured mojo with the plugin realm
//!   installed as the thread's context realm, notify listeners and restore
//!   every piece of per-thread state afterwards
//!
//! Each step is cached in [`PluginCaches`]. Keys compare plugin coordinates
//! structurally, dependency and exclusion order included, and a failed
//! population is cached and returned again for the same key.
//!
//! # Errors
//!
//! Failures are reported as [`PluginError`], split into resolution,
//! container, configuration and mojo failures so a build driver can decide
//! which ones are build failures and which are internal errors.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod build_manager;
pub mod cache;
pub mod configurator;
pub mod descriptor;
pub mod error;
pub mod execution;
pub mod expression;
mod invoke;
pub mod legacy;
pub mod legacy_manager;
pub mod manager;
pub mod mojo;
pub mod options;
pub mod project_deps;
pub mod realm;
pub mod resolver;
mod scoped;

pub use build_manager::BuildPluginManager;
pub use cache::{PluginCaches, RecordCache, UsageHook};
pub use configurator::{
    BASIC_CONFIGURATOR, BasicConfigurator, ComponentConfigurator, ConfigurationContext,
    ConfiguratorRegistry,
};
pub use descriptor::{
    DescriptorParser, ExtensionDescriptor, MojoDescriptor, ParamType, Parameter,
    PluginDescriptor, RuntimePluginDescriptor, TomlDescriptorParser,
};
pub use error::{PluginError, PluginResult};
pub use execution::{
    CompoundListener, ListenerList, MojoExecution, MojoExecutionEvent, MojoExecutionListener,
};
pub use expression::{EvaluationMode, ExpressionEvaluator};
pub use legacy::LegacySupport;
pub use legacy_manager::LegacyPluginManager;
pub use manager::PluginManager;
pub use mojo::{ComponentRegistry, Mojo, MojoContext, MojoError, MojoFactory, MojoLog};
pub use options::PluginManagerOptions;
pub use project_deps::ProjectDependencyResolver;
pub use realm::{
    ArtifactContents, ClassRealm, ClassWorld, ContextRealm, CoreExports, DirectoryContents,
    ForeignImport, ImportPattern, RealmId, RealmManager,
};
pub use resolver::{
    ArtifactResolver, PluginDependenciesResolver, ResolutionError, ResolutionRequest,
};
