//! Structural cache keys.
//!
//! Every key computes its hash once at construction. Equality compares the
//! stored hash first and then every field, so two keys are equal only when
//! the plugin coordinates (dependencies and exclusions in order), the
//! repository context and all extra discriminators are equal.

use std::collections::BTreeSet;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::PathBuf;
use std::time::SystemTime;

use anvil_core::{Artifact, Dependency, DependencyFilter, PluginCoordinate, Project, RepositoryContext};
use anvil_core::{equality, version};

use crate::realm::{ForeignImport, ImportPattern, RealmId};

fn compute_hash(parts: &impl Hash) -> u64 {
    let mut hasher = DefaultHasher::new();
    parts.hash(&mut hasher);
    hasher.finish()
}

/// `plugin` with its version in snapshot base form.
fn normalized(plugin: &PluginCoordinate) -> PluginCoordinate {
    let mut plugin = plugin.clone();
    plugin.version = plugin.version.as_deref().map(version::to_snapshot_version);
    plugin
}

macro_rules! prehashed_key {
    ($name:ident { $($field:ident),+ $(,)? }) => {
        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.hash == other.hash $(&& self.$field == other.$field)+
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                state.write_u64(self.hash);
            }
        }
    };
}

/// Key of the plugin artifact-set cache. The plugin version is
/// snapshot-normalized.
#[derive(Debug, Clone)]
pub struct PluginArtifactsKey {
    plugin: PluginCoordinate,
    filter: Option<DependencyFilter>,
    repositories: RepositoryContext,
    hash: u64,
}

impl PluginArtifactsKey {
    /// Build a key.
    #[must_use]
    pub fn new(
        plugin: &PluginCoordinate,
        filter: Option<&DependencyFilter>,
        repositories: &RepositoryContext,
    ) -> Self {
        let plugin = normalized(plugin);
        let hash = compute_hash(&(
            equality::plugin_hash_code(&plugin),
            filter,
            repositories,
        ));
        Self {
            plugin,
            filter: filter.cloned(),
            repositories: repositories.clone(),
            hash,
        }
    }

    /// The plugin.
    #[must_use]
    pub fn plugin(&self) -> &PluginCoordinate {
        &self.plugin
    }
}

prehashed_key!(PluginArtifactsKey { plugin, filter, repositories });

/// Key of the plugin realm cache. The plugin version is
/// snapshot-normalized.
#[derive(Debug, Clone)]
pub struct PluginRealmKey {
    plugin: PluginCoordinate,
    parent: Option<RealmId>,
    foreign_imports: Vec<(ImportPattern, RealmId)>,
    filter: Option<DependencyFilter>,
    repositories: RepositoryContext,
    hash: u64,
}

impl PluginRealmKey {
    /// Build a key. Foreign imports are compared as a set.
    #[must_use]
    pub fn new(
        plugin: &PluginCoordinate,
        parent: Option<&RealmId>,
        foreign_imports: &[ForeignImport],
        filter: Option<&DependencyFilter>,
        repositories: &RepositoryContext,
    ) -> Self {
        let mut imports: Vec<(ImportPattern, RealmId)> = foreign_imports
            .iter()
            .map(|i| (i.pattern.clone(), i.realm.id().clone()))
            .collect();
        imports.sort();
        imports.dedup();
        let plugin = normalized(plugin);
        let hash = compute_hash(&(
            equality::plugin_hash_code(&plugin),
            parent,
            &imports,
            filter,
            repositories,
        ));
        Self {
            plugin,
            parent: parent.cloned(),
            foreign_imports: imports,
            filter: filter.cloned(),
            repositories: repositories.clone(),
            hash,
        }
    }

    /// The plugin.
    #[must_use]
    pub fn plugin(&self) -> &PluginCoordinate {
        &self.plugin
    }
}

prehashed_key!(PluginRealmKey {
    plugin,
    parent,
    foreign_imports,
    filter,
    repositories,
});

/// Key of the plugin descriptor cache.
///
/// Uses the snapshot-normalized version so every timestamped build of one
/// snapshot shares an entry.
#[derive(Debug, Clone)]
pub struct PluginDescriptorKey {
    group_id: String,
    artifact_id: String,
    version: String,
    repositories: RepositoryContext,
    hash: u64,
}

impl PluginDescriptorKey {
    /// Build a key.
    #[must_use]
    pub fn new(plugin: &PluginCoordinate, repositories: &RepositoryContext) -> Self {
        let version = version::to_snapshot_version(plugin.version.as_deref().unwrap_or_default());
        let hash = compute_hash(&(
            &plugin.group_id,
            &plugin.artifact_id,
            &version,
            repositories,
        ));
        Self {
            group_id: plugin.group_id.clone(),
            artifact_id: plugin.artifact_id.clone(),
            version,
            repositories: repositories.clone(),
            hash,
        }
    }

    /// The normalized version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }
}

prehashed_key!(PluginDescriptorKey {
    group_id,
    artifact_id,
    version,
    repositories,
});

/// One file contributing to an extension realm.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FileStamp {
    id: String,
    path: Option<PathBuf>,
    size: u64,
    modified: Option<SystemTime>,
}

/// Key of the extension realm cache: the artifacts' files as they are on
/// disk, so a rebuilt extension gets a fresh realm.
#[derive(Debug, Clone)]
pub struct ExtensionRealmKey {
    files: Vec<FileStamp>,
    hash: u64,
}

impl ExtensionRealmKey {
    /// Build a key, reading file sizes and modification times.
    #[must_use]
    pub fn new(artifacts: &[Artifact]) -> Self {
        let files: Vec<FileStamp> = artifacts
            .iter()
            .map(|a| {
                let metadata = a.file.as_deref().and_then(|f| std::fs::metadata(f).ok());
                FileStamp {
                    id: a.id(),
                    path: a.file.clone(),
                    size: metadata.as_ref().map_or(0, std::fs::Metadata::len),
                    modified: metadata.and_then(|m| m.modified().ok()),
                }
            })
            .collect();
        let hash = compute_hash(&files);
        Self { files, hash }
    }
}

prehashed_key!(ExtensionRealmKey { files });

/// Key of the project artifact cache.
#[derive(Debug, Clone)]
pub struct ProjectArtifactsKey {
    project: String,
    dependencies: Vec<Dependency>,
    scopes: BTreeSet<String>,
    repositories: RepositoryContext,
    hash: u64,
}

impl ProjectArtifactsKey {
    /// Build a key.
    #[must_use]
    pub fn new(project: &Project, scopes: &BTreeSet<String>, repositories: &RepositoryContext) -> Self {
        let id = project.id();
        let hash = compute_hash(&(&id, &project.dependencies, scopes, repositories));
        Self {
            project: id,
            dependencies: project.dependencies.clone(),
            scopes: scopes.clone(),
            repositories: repositories.clone(),
            hash,
        }
    }
}

prehashed_key!(ProjectArtifactsKey {
    project,
    dependencies,
    scopes,
    repositories,
});
