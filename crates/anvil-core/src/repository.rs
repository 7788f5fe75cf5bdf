//! Repository configuration and dependency filters.
//!
//! A [`RepositoryContext`] captures everything about *where* artifacts come
//! from that can change the outcome of a resolution. It participates in cache
//! keys next to the plugin coordinate.

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::coordinate::Exclusion;

/// The local artifact repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalRepository {
    /// Root directory of the repository.
    pub basedir: PathBuf,
}

impl LocalRepository {
    /// Create a local repository rooted at `basedir`.
    #[must_use]
    pub fn new(basedir: impl Into<PathBuf>) -> Self {
        Self {
            basedir: basedir.into(),
        }
    }
}

/// A remote repository, possibly a repository manager fronting others.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteRepository {
    /// Repository id.
    pub id: String,
    /// Base URL.
    pub url: String,
    /// Layout name.
    #[serde(default = "default_layout")]
    pub layout: String,
    /// Whether this entry is a repository manager (mirror) for `mirrored`.
    #[serde(default)]
    pub repository_manager: bool,
    /// Repositories this mirror stands in for.
    #[serde(default)]
    pub mirrored: Vec<RemoteRepository>,
}

fn default_layout() -> String {
    "default".to_string()
}

impl RemoteRepository {
    /// Create a plain remote repository.
    #[must_use]
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            layout: default_layout(),
            repository_manager: false,
            mirrored: Vec::new(),
        }
    }

    /// Turn this repository into a repository manager mirroring `mirrored`.
    #[must_use]
    pub fn as_manager_of(mut self, mirrored: Vec<RemoteRepository>) -> Self {
        self.repository_manager = true;
        self.mirrored = mirrored;
        self
    }
}

/// Expand repository managers into the repositories they mirror.
#[must_use]
pub fn expand_repositories(repositories: &[RemoteRepository]) -> Vec<RemoteRepository> {
    let mut expanded = Vec::with_capacity(repositories.len());
    for repo in repositories {
        if repo.repository_manager {
            expanded.extend(expand_repositories(&repo.mirrored));
        } else {
            expanded.push(repo.clone());
        }
    }
    expanded
}

/// Restricts which artifacts of a dependency closure are kept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DependencyFilter {
    /// Keep artifacts whose scope is included and not excluded.
    /// An empty `included` set accepts every scope.
    Scopes {
        /// Accepted scopes.
        included: BTreeSet<String>,
        /// Rejected scopes.
        excluded: BTreeSet<String>,
    },
    /// Drop artifacts matching any exclusion pattern.
    Exclusions(Vec<Exclusion>),
    /// Drop artifacts whose `groupId:artifactId` key is listed.
    Artifacts(BTreeSet<String>),
    /// Keep artifacts accepted by every filter.
    All(Vec<DependencyFilter>),
}

impl DependencyFilter {
    /// A scope filter that accepts only the given scopes.
    #[must_use]
    pub fn scopes<I, S>(included: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Scopes {
            included: included.into_iter().map(Into::into).collect(),
            excluded: BTreeSet::new(),
        }
    }

    /// Combine two optional filters into one.
    #[must_use]
    pub fn and(first: Option<Self>, second: Option<Self>) -> Option<Self> {
        match (first, second) {
            (None, None) => None,
            (Some(f), None) | (None, Some(f)) => Some(f),
            (Some(a), Some(b)) => Some(Self::All(vec![a, b])),
        }
    }

    /// Whether the artifact passes this filter.
    #[must_use]
    pub fn accept(&self, artifact: &Artifact) -> bool {
        match self {
            Self::Scopes { included, excluded } => {
                let scope = artifact.scope.as_deref().unwrap_or("compile");
                (included.is_empty() || included.contains(scope)) && !excluded.contains(scope)
            },
            Self::Exclusions(exclusions) => !exclusions
                .iter()
                .any(|e| e.matches(&artifact.group_id, &artifact.artifact_id)),
            Self::Artifacts(keys) => !keys.contains(&artifact.key()),
            Self::All(filters) => filters.iter().all(|f| f.accept(artifact)),
        }
    }
}

/// Where artifacts are resolved from.
///
/// Two contexts are equal when their local repository, their remote
/// repositories *after* expanding repository managers, their workspace
/// reader identity and their filter are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryContext {
    /// Local repository.
    pub local: LocalRepository,
    /// Ordered remote repositories as configured.
    pub remotes: Vec<RemoteRepository>,
    /// Identity of the reactor workspace reader, if any.
    pub workspace: Option<String>,
    /// Optional filter applied to every resolution in this context.
    pub filter: Option<DependencyFilter>,
}

impl RepositoryContext {
    /// Create a context with no remotes.
    #[must_use]
    pub fn new(local: LocalRepository) -> Self {
        Self {
            local,
            remotes: Vec::new(),
            workspace: None,
            filter: None,
        }
    }

    /// Append a remote repository.
    #[must_use]
    pub fn with_remote(mut self, remote: RemoteRepository) -> Self {
        self.remotes.push(remote);
        self
    }

    /// Set the workspace reader identity.
    #[must_use]
    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    /// Set the context-wide filter.
    #[must_use]
    pub fn with_filter(mut self, filter: DependencyFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Remote repositories with managers expanded to their mirrored set.
    #[must_use]
    pub fn expanded_remotes(&self) -> Vec<RemoteRepository> {
        expand_repositories(&self.remotes)
    }

    /// Human-readable list of remote ids, for error messages.
    #[must_use]
    pub fn describe_remotes(&self) -> String {
        let ids: Vec<String> = self
            .remotes
            .iter()
            .map(|r| format!("{} ({})", r.id, r.url))
            .collect();
        if ids.is_empty() {
            "[]".to_string()
        } else {
            format!("[{}]", ids.join(", "))
        }
    }
}

impl PartialEq for RepositoryContext {
    fn eq(&self, other: &Self) -> bool {
        self.local == other.local
            && self.expanded_remotes() == other.expanded_remotes()
            && self.workspace == other.workspace
            && self.filter == other.filter
    }
}

impl Eq for RepositoryContext {}

impl Hash for RepositoryContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.local.hash(state);
        self.expanded_remotes().hash(state);
        self.workspace.hash(state);
        self.filter.hash(state);
    }
}
