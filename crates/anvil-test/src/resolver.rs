//! In-memory artifact resolver.

use std::collections::{BTreeSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anvil_core::{Artifact, Dependency};
use anvil_plugin::{ArtifactResolver, ResolutionError, ResolutionRequest};
use dashmap::DashMap;

#[derive(Debug, Clone)]
struct Entry {
    artifact: Artifact,
    dependencies: Vec<Dependency>,
}

/// Resolver over artifacts registered in memory.
///
/// Resolution is breadth-first, nearest wins, honoring dependency
/// exclusions and the request filter. Request overrides replace the root's
/// registered dependencies of the same key and are visited first. Every call is counted so tests can
/// assert that caches prevent repeated resolution.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifactResolver {
    artifacts: Arc<DashMap<String, Entry>>,
    failures: Arc<DashMap<String, String>>,
    calls: Arc<AtomicUsize>,
}

fn coordinate_id(group_id: &str, artifact_id: &str, version: &str) -> String {
    format!("{group_id}:{artifact_id}:{version}")
}

impl InMemoryArtifactResolver {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an artifact, located at `file`, with its dependencies.
    pub fn add(&self, artifact: Artifact, file: impl Into<PathBuf>, dependencies: Vec<Dependency>) {
        let id = coordinate_id(&artifact.group_id, &artifact.artifact_id, &artifact.version);
        self.artifacts.insert(
            id,
            Entry {
                artifact: artifact.with_file(file),
                dependencies,
            },
        );
    }

    /// Make every resolution rooted at or passing through the artifact fail
    /// with `message`.
    pub fn fail(&self, group_id: &str, artifact_id: &str, version: &str, message: impl Into<String>) {
        self.failures
            .insert(coordinate_id(group_id, artifact_id, version), message.into());
    }

    /// Number of `resolve` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lookup(&self, group_id: &str, artifact_id: &str, version: &str) -> Result<Entry, ResolutionError> {
        let id = coordinate_id(group_id, artifact_id, version);
        if let Some(message) = self.failures.get(&id) {
            return Err(ResolutionError::Failed {
                artifact: id,
                message: message.value().clone(),
            });
        }
        self.artifacts
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(ResolutionError::NotFound { artifact: id })
    }
}

impl ArtifactResolver for InMemoryArtifactResolver {
    fn resolve(&self, request: &ResolutionRequest) -> Result<Vec<Artifact>, ResolutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let root = &request.artifact;
        let entry = self.lookup(&root.group_id, &root.artifact_id, &root.version)?;
        let mut resolved = vec![entry.artifact.clone()];
        if !request.transitive {
            return Ok(resolved);
        }

        let mut seen: BTreeSet<String> = BTreeSet::from([root.key()]);
        let overridden: BTreeSet<(String, String)> = request
            .overrides
            .iter()
            .map(|d| (d.group_id.clone(), d.artifact_id.clone()))
            .collect();
        let root_dependencies = request.overrides.iter().cloned().chain(
            entry
                .dependencies
                .into_iter()
                .filter(|d| !overridden.contains(&(d.group_id.clone(), d.artifact_id.clone()))),
        );
        let mut queue: VecDeque<(Dependency, Vec<Dependency>)> = root_dependencies
            .into_iter()
            .map(|d| (d, Vec::new()))
            .collect();

        while let Some((dependency, path)) = queue.pop_front() {
            if dependency.optional && !path.is_empty() {
                continue;
            }
            if path
                .iter()
                .any(|p| p.excludes(&dependency.group_id, &dependency.artifact_id))
            {
                continue;
            }
            let Some(candidate) = Artifact::from_dependency(&dependency) else {
                continue;
            };
            if seen.contains(&candidate.key()) {
                continue;
            }
            if let Some(filter) = &request.filter
                && !filter.accept(&candidate)
            {
                continue;
            }
            seen.insert(candidate.key());

            let entry = self.lookup(&candidate.group_id, &candidate.artifact_id, &candidate.version)?;
            let mut artifact = entry.artifact.clone();
            artifact.scope = candidate.scope.clone();
            resolved.push(artifact);

            let mut child_path = path.clone();
            child_path.push(dependency.clone());
            for child in entry.dependencies {
                queue.push_back((child, child_path.clone()));
            }
        }
        Ok(resolved)
    }
}
