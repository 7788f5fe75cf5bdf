//! Plugin error types.
//!
//! Errors are `Clone` so a cache can hand a captured failure back to every
//! later caller asking for the same key.

/// Errors from plugin resolution, realm setup, configuration and execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PluginError {
    /// The plugin artifact is absent from every reachable repository.
    #[error("plugin {plugin} or one of its dependencies could not be found in {repositories}")]
    NotFound {
        /// Plugin id.
        plugin: String,
        /// Repositories that were searched.
        repositories: String,
    },

    /// The plugin artifact exists but its dependency graph could not be resolved.
    #[error("plugin {plugin} or one of its dependencies could not be resolved: {message}")]
    Resolution {
        /// Plugin id.
        plugin: String,
        /// Failure reason.
        message: String,
    },

    /// The plugin's embedded descriptor is malformed or missing.
    #[error("failed to parse plugin descriptor for {plugin} ({source_path}): {message}")]
    DescriptorParsing {
        /// Plugin id.
        plugin: String,
        /// Where the descriptor was read from.
        source_path: String,
        /// Parse error.
        message: String,
    },

    /// The descriptor parsed but does not describe this plugin correctly.
    #[error("plugin descriptor for {plugin} is invalid: {}", .problems.join("; "))]
    InvalidDescriptor {
        /// Plugin id.
        plugin: String,
        /// Every problem found.
        problems: Vec<String>,
    },

    /// The plugin has no mojo for the goal.
    #[error("could not find goal '{goal}' in plugin {plugin} among available goals {}", .available.join(", "))]
    MojoNotFound {
        /// Plugin id.
        plugin: String,
        /// Requested goal.
        goal: String,
        /// Goals the plugin does provide.
        available: Vec<String>,
    },

    /// The plugin requires a different runtime version.
    #[error("plugin {plugin} requires runtime version {required}, running {actual}")]
    Incompatible {
        /// Plugin id.
        plugin: String,
        /// Requirement declared by the plugin.
        required: String,
        /// Running version.
        actual: String,
    },

    /// The plugin realm could not be built.
    #[error("failed to create realm for plugin {plugin}: {message}")]
    Manager {
        /// Plugin id.
        plugin: String,
        /// Failure reason.
        message: String,
    },

    /// The realm was built but the compatibility imports could not be wired.
    #[error("failed to import compatibility classes into realm of plugin {plugin}: {message}")]
    CompatibilityImport {
        /// Plugin id.
        plugin: String,
        /// Failure reason.
        message: String,
    },

    /// Component lookup or class linkage failed inside the plugin realm.
    #[error("{message} (plugin {plugin}{})", goal_suffix(.goal.as_deref()))]
    Container {
        /// Plugin id.
        plugin: String,
        /// Goal being prepared or executed.
        goal: Option<String>,
        /// Failure reason.
        message: String,
        /// Realm classpath dump, when the failure is a class mismatch.
        diagnostics: Option<String>,
    },

    /// A mojo parameter could not be satisfied.
    #[error("unable to configure {plugin}{}: {message}", goal_suffix(.goal.as_deref()))]
    Configuration {
        /// Plugin id.
        plugin: String,
        /// Goal being configured.
        goal: Option<String>,
        /// Failure reason.
        message: String,
        /// Realm classpath dump, when the failure is a class mismatch.
        diagnostics: Option<String>,
    },

    /// Evaluating a parameter expression failed.
    #[error("error evaluating expression '{expression}': {message}")]
    ExpressionEvaluation {
        /// The expression.
        expression: String,
        /// Failure reason.
        message: String,
    },

    /// The mojo reported an expected build failure.
    #[error("{message}")]
    MojoFailure {
        /// Plugin id.
        plugin: String,
        /// Goal that failed.
        goal: String,
        /// Project the goal ran for.
        project: Option<String>,
        /// Short failure message.
        message: String,
        /// Longer explanation from the mojo.
        long_message: Option<String>,
    },

    /// The mojo failed unexpectedly.
    #[error("execution of goal {plugin}:{goal} failed: {message}")]
    Execution {
        /// Plugin id.
        plugin: String,
        /// Goal that failed.
        goal: String,
        /// Project the goal ran for.
        project: Option<String>,
        /// Failure reason.
        message: String,
    },

    /// A cache key was populated twice.
    #[error("duplicate record in {cache} cache for key {key}")]
    DuplicateRecord {
        /// Cache name.
        cache: &'static str,
        /// Rendered key.
        key: String,
    },
}

fn goal_suffix(goal: Option<&str>) -> String {
    goal.map(|g| format!(":{g}")).unwrap_or_default()
}

impl PluginError {
    /// Whether the failure happened while resolving the plugin.
    #[must_use]
    pub fn is_resolution_failure(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Resolution { .. }
                | Self::DescriptorParsing { .. }
                | Self::InvalidDescriptor { .. }
                | Self::MojoNotFound { .. }
        )
    }

    /// Whether the failure came from realm construction or class linkage.
    #[must_use]
    pub fn is_container_failure(&self) -> bool {
        matches!(
            self,
            Self::Manager { .. } | Self::CompatibilityImport { .. } | Self::Container { .. }
        )
    }

    /// Whether the mojo itself declared the failure.
    #[must_use]
    pub fn is_mojo_failure(&self) -> bool {
        matches!(self, Self::MojoFailure { .. })
    }

    /// Realm diagnostics attached to a linkage failure, if any.
    #[must_use]
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::Container { diagnostics, .. } | Self::Configuration { diagnostics, .. } => {
                diagnostics.as_deref()
            },
            _ => None,
        }
    }
}

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let not_found = PluginError::NotFound {
            plugin: "g:a:1".into(),
            repositories: "[central]".into(),
        };
        assert!(not_found.is_resolution_failure());
        assert!(!not_found.is_container_failure());

        let container = PluginError::Container {
            plugin: "g:a:1".into(),
            goal: Some("compile".into()),
            message: "class mismatch".into(),
            diagnostics: Some("realm dump".into()),
        };
        assert!(container.is_container_failure());
        assert_eq!(container.diagnostics(), Some("realm dump"));
        assert_eq!(container.to_string(), "class mismatch (plugin g:a:1:compile)");
    }

    #[test]
    fn test_mojo_not_found_lists_goals() {
        let err = PluginError::MojoNotFound {
            plugin: "g:a:1".into(),
            goal: "run".into(),
            available: vec!["compile".into(), "test".into()],
        };
        assert!(err.to_string().ends_with("compile, test"));
    }
}
