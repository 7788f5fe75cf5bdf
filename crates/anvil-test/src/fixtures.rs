//! Test fixtures for plugins, projects and sessions.

use std::path::PathBuf;
use std::sync::Arc;

use anvil_core::{
    Artifact, Dependency, ExecutionRequest, LocalRepository, PluginCoordinate, Project,
    RepositoryContext, Session, Settings,
};
use anvil_plugin::descriptor::{EXTENSION_DESCRIPTOR_PATH, PLUGIN_DESCRIPTOR_PATH};
use anvil_plugin::mojo::MOJO_API_CLASS;
use anvil_plugin::{
    ComponentRegistry, ExtensionDescriptor, MojoDescriptor, PluginDescriptor, PluginManager,
    PluginManagerOptions,
};

use crate::contents::MemoryArtifactContents;
use crate::resolver::InMemoryArtifactResolver;

/// Local repository root used by every fixture.
pub const TEST_REPOSITORY: &str = "/repo";

/// Directory projects are created under.
pub const TEST_WORKSPACE: &str = "/work";

/// Group id of test projects.
pub const TEST_GROUP: &str = "org.example.test";

/// Location of an installed artifact.
#[must_use]
pub fn artifact_location(group_id: &str, artifact_id: &str, version: &str) -> PathBuf {
    PathBuf::from(TEST_REPOSITORY)
        .join(group_id)
        .join(artifact_id)
        .join(version)
}

/// In-memory repository, artifact contents and component registry.
#[derive(Debug, Clone, Default)]
pub struct TestEnvironment {
    /// Artifacts and their dependencies.
    pub resolver: InMemoryArtifactResolver,
    /// Entries of installed artifacts.
    pub contents: MemoryArtifactContents,
    /// Mojo factories shared with every manager built from this environment.
    pub components: ComponentRegistry,
}

impl TestEnvironment {
    /// Create an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A plugin manager with default options.
    #[must_use]
    pub fn manager(&self) -> PluginManager {
        self.manager_with(PluginManagerOptions::default())
    }

    /// A plugin manager with `options`.
    #[must_use]
    pub fn manager_with(&self, options: PluginManagerOptions) -> PluginManager {
        PluginManager::new(
            Arc::new(self.resolver.clone()),
            Arc::new(self.contents.clone()),
            options,
        )
        .with_components(self.components.clone())
    }

    /// Install a plain library defining `classes`.
    pub fn add_library(
        &self,
        group_id: &str,
        artifact_id: &str,
        version: &str,
        classes: &[&str],
        dependencies: Vec<Dependency>,
    ) -> Artifact {
        let location = artifact_location(group_id, artifact_id, version);
        self.contents.add_location(&location);
        for class in classes {
            self.contents.add_class(&location, class);
        }
        let artifact = Artifact::new(group_id, artifact_id, version);
        self.resolver.add(artifact.clone(), &location, dependencies);
        artifact.with_file(location)
    }
}

/// Builder for a plugin artifact and its descriptor.
#[derive(Debug, Clone)]
pub struct PluginFixture {
    descriptor: PluginDescriptor,
    classes: Vec<String>,
    dependencies: Vec<Dependency>,
    extension: Option<ExtensionDescriptor>,
    raw_descriptor: Option<String>,
}

impl PluginFixture {
    /// A plugin with no goals.
    #[must_use]
    pub fn new(group_id: &str, artifact_id: &str, version: &str) -> Self {
        Self {
            descriptor: PluginDescriptor::new(group_id, artifact_id, version),
            classes: Vec::new(),
            dependencies: Vec::new(),
            extension: None,
            raw_descriptor: None,
        }
    }

    /// Add a goal; its implementation class is packaged with the plugin.
    #[must_use]
    pub fn with_mojo(mut self, mojo: MojoDescriptor) -> Self {
        self.classes.push(mojo.implementation.clone());
        self.descriptor.mojos.push(mojo);
        self
    }

    /// Add a goal without packaging its implementation class.
    #[must_use]
    pub fn with_unpackaged_mojo(mut self, mojo: MojoDescriptor) -> Self {
        self.descriptor.mojos.push(mojo);
        self
    }

    /// Package an extra class.
    #[must_use]
    pub fn with_class(mut self, class_name: &str) -> Self {
        self.classes.push(class_name.to_string());
        self
    }

    /// Package a private copy of the mojo API.
    #[must_use]
    pub fn bundling_mojo_api(self) -> Self {
        self.with_class(MOJO_API_CLASS)
    }

    /// Add a runtime dependency of the plugin artifact.
    #[must_use]
    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Require a runtime version.
    #[must_use]
    pub fn requiring_runtime(mut self, requirement: &str) -> Self {
        self.descriptor.required_runtime_version = Some(requirement.to_string());
        self
    }

    /// Give every project its own realm.
    #[must_use]
    pub fn isolated(mut self) -> Self {
        self.descriptor.isolated_realm = true;
        self
    }

    /// Set the goal prefix.
    #[must_use]
    pub fn with_goal_prefix(mut self, prefix: &str) -> Self {
        self.descriptor.goal_prefix = Some(prefix.to_string());
        self
    }

    /// Package an extension descriptor.
    #[must_use]
    pub fn with_extension(mut self, extension: ExtensionDescriptor) -> Self {
        self.extension = Some(extension);
        self
    }

    /// Package `text` verbatim as the plugin descriptor.
    #[must_use]
    pub fn with_raw_descriptor(mut self, text: &str) -> Self {
        self.raw_descriptor = Some(text.to_string());
        self
    }

    /// The descriptor that will be packaged.
    #[must_use]
    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    /// Coordinate referring to this plugin.
    #[must_use]
    pub fn coordinate(&self) -> PluginCoordinate {
        PluginCoordinate::new(
            &self.descriptor.group_id,
            &self.descriptor.artifact_id,
            &self.descriptor.version,
        )
    }

    /// Where the plugin artifact is installed.
    #[must_use]
    pub fn location(&self) -> PathBuf {
        artifact_location(
            &self.descriptor.group_id,
            &self.descriptor.artifact_id,
            &self.descriptor.version,
        )
    }

    /// Install the plugin into `env` and return its coordinate.
    ///
    /// # Errors
    ///
    /// Returns an error if a descriptor cannot be serialized.
    pub fn install(&self, env: &TestEnvironment) -> Result<PluginCoordinate, toml::ser::Error> {
        let location = self.location();
        env.contents.add_location(&location);
        for class in &self.classes {
            env.contents.add_class(&location, class);
        }
        let descriptor = match &self.raw_descriptor {
            Some(text) => text.clone(),
            None => toml::to_string(&self.descriptor)?,
        };
        env.contents
            .add_entry(&location, PLUGIN_DESCRIPTOR_PATH, descriptor);
        if let Some(extension) = &self.extension {
            env.contents
                .add_entry(&location, EXTENSION_DESCRIPTOR_PATH, toml::to_string(extension)?);
        }
        env.resolver.add(
            Artifact::new(
                &self.descriptor.group_id,
                &self.descriptor.artifact_id,
                &self.descriptor.version,
            ),
            &location,
            self.dependencies.clone(),
        );
        tracing::debug!(plugin = %self.descriptor.id(), location = %location.display(), "Installed test plugin");
        Ok(self.coordinate())
    }
}

/// Repository context over [`TEST_REPOSITORY`].
#[must_use]
pub fn test_repositories() -> RepositoryContext {
    RepositoryContext::new(LocalRepository::new(TEST_REPOSITORY))
}

/// A project under [`TEST_WORKSPACE`].
#[must_use]
pub fn test_project(artifact_id: &str) -> Project {
    Project::new(
        TEST_GROUP,
        artifact_id,
        "1.0",
        PathBuf::from(TEST_WORKSPACE).join(artifact_id),
    )
}

/// A session over `projects`; the first one is current.
#[must_use]
pub fn test_session(projects: Vec<Project>) -> Session {
    test_session_with(ExecutionRequest::new(TEST_WORKSPACE), projects)
}

/// A session for `request` over `projects`.
#[must_use]
pub fn test_session_with(request: ExecutionRequest, projects: Vec<Project>) -> Session {
    Session::new(request, Settings::new(TEST_REPOSITORY), test_repositories())
        .with_projects(projects.into_iter().map(Arc::new).collect())
}

/// Route `tracing` output to the test writer. Safe to call repeatedly.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use anvil_plugin::{Parameter, ParamType};

    use super::*;

    #[test]
    fn test_installed_plugin_loads() {
        init_test_logging();
        let env = TestEnvironment::new();
        let plugin = PluginFixture::new("org.example", "echo-plugin", "1.0")
            .with_mojo(
                MojoDescriptor::new("echo", "org.example.Echo")
                    .with_parameter(Parameter::new("message", ParamType::String).required()),
            )
            .install(&env)
            .unwrap();

        let descriptor = env.manager().load_plugin(&plugin, &test_repositories()).unwrap();
        assert_eq!(descriptor.goals(), vec!["echo".to_string()]);
        assert_eq!(descriptor.goal_prefix(), "echo");
        assert!(descriptor.mojo("echo").unwrap().parameters[0].required);
    }

    #[test]
    fn test_session_current_project() {
        let session = test_session(vec![test_project("app"), test_project("lib")]);
        assert_eq!(session.current_project().unwrap().artifact_id, "app");
        assert_eq!(session.projects().len(), 2);
    }
}
