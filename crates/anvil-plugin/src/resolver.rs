//! Plugin artifact resolution on top of an external resolver.

use std::fmt;
use std::sync::Arc;

use anvil_core::{Artifact, Dependency, DependencyFilter, PluginCoordinate, RepositoryContext};

use crate::error::{PluginError, PluginResult};

/// What to resolve.
#[derive(Debug, Clone)]
pub struct ResolutionRequest {
    /// Root artifact.
    pub artifact: Artifact,
    /// Dependencies replacing the root's declared ones.
    pub overrides: Vec<Dependency>,
    /// Filter applied to every artifact but the root.
    pub filter: Option<DependencyFilter>,
    /// Whether to follow dependencies at all.
    pub transitive: bool,
    /// Where to resolve from.
    pub repositories: RepositoryContext,
}

impl ResolutionRequest {
    /// Resolve only `artifact` itself.
    #[must_use]
    pub fn single(artifact: Artifact, repositories: &RepositoryContext) -> Self {
        Self {
            artifact,
            overrides: Vec::new(),
            filter: None,
            transitive: false,
            repositories: repositories.clone(),
        }
    }

    /// Resolve `artifact` and its dependency closure.
    #[must_use]
    pub fn transitive(artifact: Artifact, repositories: &RepositoryContext) -> Self {
        Self {
            transitive: true,
            ..Self::single(artifact, repositories)
        }
    }

    /// Set dependency overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: Vec<Dependency>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Set the filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Option<DependencyFilter>) -> Self {
        self.filter = filter;
        self
    }
}

/// Failures reported by an [`ArtifactResolver`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    /// No repository has the artifact.
    #[error("artifact {artifact} not found")]
    NotFound {
        /// Missing artifact id.
        artifact: String,
    },

    /// The artifact exists but something in its graph failed.
    #[error("failed to resolve {artifact}: {message}")]
    Failed {
        /// Artifact being resolved.
        artifact: String,
        /// Failure reason.
        message: String,
    },
}

/// The dependency resolution engine.
pub trait ArtifactResolver: Send + Sync + fmt::Debug {
    /// Resolve a request to artifacts with files, root first.
    ///
    /// # Errors
    ///
    /// [`ResolutionError::NotFound`] if the root or a required dependency is
    /// absent, [`ResolutionError::Failed`] for any other problem.
    fn resolve(&self, request: &ResolutionRequest) -> Result<Vec<Artifact>, ResolutionError>;
}

/// Resolves plugin artifacts and their closures.
#[derive(Debug, Clone)]
pub struct PluginDependenciesResolver {
    resolver: Arc<dyn ArtifactResolver>,
    core_filter: DependencyFilter,
}

impl PluginDependenciesResolver {
    /// Wrap a resolver. `core_filter` removes host-provided artifacts from
    /// every plugin closure.
    #[must_use]
    pub fn new(resolver: Arc<dyn ArtifactResolver>, core_filter: DependencyFilter) -> Self {
        Self {
            resolver,
            core_filter,
        }
    }

    /// The underlying resolver.
    #[must_use]
    pub fn resolver(&self) -> &Arc<dyn ArtifactResolver> {
        &self.resolver
    }

    /// Resolve the plugin artifact alone.
    ///
    /// # Errors
    ///
    /// [`PluginError::NotFound`] if no repository has it,
    /// [`PluginError::Resolution`] for a missing version or any other
    /// failure.
    pub fn resolve_plugin(
        &self,
        plugin: &PluginCoordinate,
        repositories: &RepositoryContext,
    ) -> PluginResult<Artifact> {
        let artifact = Artifact::from_plugin(plugin).ok_or_else(|| PluginError::Resolution {
            plugin: plugin.id(),
            message: "plugin version is not set".to_string(),
        })?;

        let request = ResolutionRequest::single(artifact, repositories);
        let resolved = self
            .resolver
            .resolve(&request)
            .map_err(|e| translate(plugin, repositories, e))?;

        let artifact = resolved
            .into_iter()
            .find(|a| a.same_identity(&request.artifact))
            .ok_or_else(|| PluginError::Resolution {
                plugin: plugin.id(),
                message: "resolver did not return the plugin artifact".to_string(),
            })?;
        tracing::debug!(plugin = %plugin, file = ?artifact.file, "Resolved plugin artifact");
        Ok(artifact)
    }

    /// Resolve the plugin's closure with its declared dependencies as
    /// overrides. The plugin artifact comes first in the result.
    ///
    /// # Errors
    ///
    /// Same as [`PluginDependenciesResolver::resolve_plugin`].
    pub fn resolve_closure(
        &self,
        plugin: &PluginCoordinate,
        plugin_artifact: &Artifact,
        filter: Option<&DependencyFilter>,
        repositories: &RepositoryContext,
    ) -> PluginResult<Vec<Artifact>> {
        let filter = DependencyFilter::and(
            DependencyFilter::and(filter.cloned(), repositories.filter.clone()),
            Some(self.core_filter.clone()),
        );
        let request = ResolutionRequest::transitive(plugin_artifact.clone(), repositories)
            .with_overrides(plugin.dependencies.clone())
            .with_filter(filter);

        let resolved = self
            .resolver
            .resolve(&request)
            .map_err(|e| translate(plugin, repositories, e))?;

        let mut artifacts = Vec::with_capacity(resolved.len().saturating_add(1));
        artifacts.push(plugin_artifact.clone());
        artifacts.extend(
            resolved
                .into_iter()
                .filter(|a| !a.same_identity(plugin_artifact)),
        );
        tracing::debug!(
            plugin = %plugin,
            artifacts = artifacts.len(),
            "Resolved plugin dependencies"
        );
        Ok(artifacts)
    }
}

fn translate(
    plugin: &PluginCoordinate,
    repositories: &RepositoryContext,
    error: ResolutionError,
) -> PluginError {
    match error {
        ResolutionError::NotFound { .. } => PluginError::NotFound {
            plugin: plugin.id(),
            repositories: repositories.describe_remotes(),
        },
        ResolutionError::Failed { .. } => PluginError::Resolution {
            plugin: plugin.id(),
            message: error.to_string(),
        },
    }
}
