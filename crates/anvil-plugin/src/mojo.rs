//! The mojo contract and component lookup.

use std::fmt;
use std::sync::Arc;

use anvil_core::project::DuplicateArtifactAttachment;
use anvil_core::{PluginContext, Project, Session, Value};
use dashmap::DashMap;

use crate::descriptor::MojoDescriptor;
use crate::execution::MojoExecution;
use crate::realm::ClassRealm;

/// Class every mojo implementation must implement, as seen by the core realm.
pub const MOJO_API_CLASS: &str = "anvil.api.Mojo";

/// Errors a mojo reports.
#[derive(Debug, thiserror::Error)]
pub enum MojoError {
    /// Expected build failure, such as failing tests.
    #[error("{message}")]
    Failure {
        /// Short message.
        message: String,
        /// Longer explanation.
        long_message: Option<String>,
    },

    /// Unexpected failure inside the mojo.
    #[error("{message}")]
    Execution {
        /// Failure reason.
        message: String,
    },

    /// The mojo attached an artifact that was already attached with a
    /// different file.
    #[error(transparent)]
    DuplicateAttachment(#[from] DuplicateArtifactAttachment),

    /// A class seen by the plugin is not the one the host provides.
    #[error("class {class_name} could not be linked: {message}")]
    Linkage {
        /// Class that failed to link.
        class_name: String,
        /// Failure reason.
        message: String,
    },

    /// A configured value does not fit the mojo field.
    #[error("invalid value for field '{field}': {message}")]
    InvalidField {
        /// Field name.
        field: String,
        /// Failure reason.
        message: String,
    },
}

impl MojoError {
    /// An expected build failure.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
            long_message: None,
        }
    }

    /// An unexpected failure.
    #[must_use]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// A field rejecting a value.
    #[must_use]
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Log handle given to each mojo.
///
/// Messages go to `tracing` under the `anvil::mojo` target, tagged with the
/// plugin and goal.
#[derive(Debug, Clone)]
pub struct MojoLog {
    plugin: Arc<str>,
    goal: Arc<str>,
}

impl MojoLog {
    /// A log for `plugin:goal`.
    #[must_use]
    pub fn new(plugin: &str, goal: &str) -> Self {
        Self {
            plugin: Arc::from(plugin),
            goal: Arc::from(goal),
        }
    }

    /// Log at debug level.
    pub fn debug(&self, message: &str) {
        tracing::debug!(target: "anvil::mojo", plugin = %self.plugin, goal = %self.goal, "{message}");
    }

    /// Log at info level.
    pub fn info(&self, message: &str) {
        tracing::info!(target: "anvil::mojo", plugin = %self.plugin, goal = %self.goal, "{message}");
    }

    /// Log at warn level.
    pub fn warn(&self, message: &str) {
        tracing::warn!(target: "anvil::mojo", plugin = %self.plugin, goal = %self.goal, "{message}");
    }

    /// Log at error level.
    pub fn error(&self, message: &str) {
        tracing::error!(target: "anvil::mojo", plugin = %self.plugin, goal = %self.goal, "{message}");
    }
}

/// What a running mojo can see.
#[derive(Debug, Clone, Copy)]
pub struct MojoContext<'a> {
    /// Build session.
    pub session: &'a Session,
    /// Project the goal runs for.
    pub project: Option<&'a Arc<Project>>,
    /// The execution being run.
    pub execution: &'a MojoExecution,
    /// Realm the mojo was loaded from.
    pub realm: &'a Arc<ClassRealm>,
}

/// A build step contributed by a plugin.
pub trait Mojo: Send {
    /// Run the goal.
    ///
    /// # Errors
    ///
    /// [`MojoError::Failure`] for an expected build failure; any other
    /// variant for an unexpected one.
    fn execute(&mut self, context: &MojoContext<'_>) -> Result<(), MojoError>;

    /// Assign one configured field.
    ///
    /// # Errors
    ///
    /// Returns an error if the field does not exist or rejects the value.
    fn configure_field(&mut self, name: &str, value: Value) -> Result<(), MojoError>;

    /// Receive the log handle before configuration.
    fn set_log(&mut self, _log: MojoLog) {}

    /// Whether the mojo wants the shared plugin context.
    fn wants_plugin_context(&self) -> bool {
        false
    }

    /// Receive the plugin context shared by this plugin's mojos on the
    /// current project.
    fn set_plugin_context(&mut self, _context: Arc<PluginContext>) {}

    /// Release resources once the mojo is done.
    ///
    /// # Errors
    ///
    /// Errors are logged by the caller and never fail the build.
    fn dispose(&mut self) -> Result<(), MojoError> {
        Ok(())
    }
}

/// Creates mojo instances for one implementation class.
pub trait MojoFactory: Send + Sync {
    /// Create a fresh, unconfigured instance.
    fn create(&self, descriptor: &MojoDescriptor) -> Box<dyn Mojo>;
}

impl<F> MojoFactory for F
where
    F: Fn(&MojoDescriptor) -> Box<dyn Mojo> + Send + Sync,
{
    fn create(&self, descriptor: &MojoDescriptor) -> Box<dyn Mojo> {
        self(descriptor)
    }
}

/// Mojo factories keyed by implementation class name.
#[derive(Default, Clone)]
pub struct ComponentRegistry {
    factories: Arc<DashMap<String, Arc<dyn MojoFactory>>>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any existing one for the class.
    pub fn register(&self, implementation: impl Into<String>, factory: impl MojoFactory + 'static) {
        self.factories
            .insert(implementation.into(), Arc::new(factory));
    }

    /// Factory for a class.
    #[must_use]
    pub fn lookup(&self, implementation: &str) -> Option<Arc<dyn MojoFactory>> {
        self.factories.get(implementation).map(|f| f.value().clone())
    }

    /// Whether a factory is registered for the class.
    #[must_use]
    pub fn contains(&self, implementation: &str) -> bool {
        self.factories.contains_key(implementation)
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        f.debug_struct("ComponentRegistry")
            .field("implementations", &names)
            .finish()
    }
}
