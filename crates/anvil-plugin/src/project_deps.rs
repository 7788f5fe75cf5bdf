//! Project dependency resolution with caching.

use std::collections::BTreeSet;
use std::sync::Arc;

use anvil_core::{Artifact, DependencyFilter, Project, RepositoryContext};

use crate::cache::{PluginCaches, ProjectArtifactsKey};
use crate::error::{PluginError, PluginResult};
use crate::resolver::{ArtifactResolver, ResolutionError, ResolutionRequest};

/// Resolves a project's dependencies for a set of scopes.
#[derive(Debug, Clone)]
pub struct ProjectDependencyResolver {
    resolver: Arc<dyn ArtifactResolver>,
    caches: Arc<PluginCaches>,
}

impl ProjectDependencyResolver {
    /// Create a resolver sharing `caches`.
    #[must_use]
    pub fn new(resolver: Arc<dyn ArtifactResolver>, caches: Arc<PluginCaches>) -> Self {
        Self { resolver, caches }
    }

    /// Resolved dependencies of `project` in `scopes`, excluding the project
    /// itself. An empty scope set accepts every scope.
    ///
    /// # Errors
    ///
    /// [`PluginError::Resolution`] naming the project; repeated calls with
    /// the same inputs return the same failure.
    pub fn resolve(
        &self,
        project: &Project,
        scopes: &BTreeSet<String>,
        repositories: &RepositoryContext,
    ) -> PluginResult<Arc<Vec<Artifact>>> {
        let key = ProjectArtifactsKey::new(project, scopes, repositories);
        let project_id = project.id();
        self.caches
            .project_artifacts
            .get_or_populate(Some(&project_id), key, || {
                let root = Artifact::new(&project.group_id, &project.artifact_id, &project.version);
                let filter = DependencyFilter::and(
                    Some(DependencyFilter::scopes(scopes.iter().cloned())),
                    repositories.filter.clone(),
                );
                let request = ResolutionRequest::transitive(root.clone(), repositories)
                    .with_overrides(project.dependencies.clone())
                    .with_filter(filter);
                let resolved = self.resolver.resolve(&request).map_err(|e| {
                    let message = match &e {
                        ResolutionError::NotFound { artifact } => {
                            format!("dependency {artifact} not found in {}", repositories.describe_remotes())
                        },
                        ResolutionError::Failed { .. } => e.to_string(),
                    };
                    PluginError::Resolution {
                        plugin: project_id.clone(),
                        message,
                    }
                })?;
                let artifacts: Vec<Artifact> = resolved
                    .into_iter()
                    .filter(|a| !a.same_identity(&root))
                    .collect();
                tracing::debug!(
                    project = %project_id,
                    artifacts = artifacts.len(),
                    "Resolved project dependencies"
                );
                Ok(Arc::new(artifacts))
            })
    }
}
