//! Building plugin and extension realms on top of the core realm.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anvil_core::{Artifact, DependencyFilter, PluginCoordinate, version};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::class_realm::class_resource;
use super::{
    ArtifactContents, ClassRealm, ClassRealmBuilder, ClassWorld, ClasspathEntry, ImportPattern,
    RealmId,
};
use crate::error::{PluginError, PluginResult};

/// Id of the realm holding the host's own classes.
pub const CORE_REALM_ID: &str = "anvil.core";

/// Classes every plugin realm must share with the core realm, regardless of
/// what the plugin bundles.
pub const COMPATIBILITY_IMPORTS: &[&str] = &[
    "anvil.config.ConfigNode",
    "anvil.config.pull.ConfigParser",
    "anvil.config.pull.ConfigParserError",
    "anvil.config.pull.ConfigSerializer",
];

/// Classes defined by the core realm.
pub const CORE_CLASSES: &[&str] = &[
    "anvil.api.Mojo",
    "anvil.api.MojoLog",
    "anvil.api.MojoFailure",
    "anvil.api.MojoExecutionError",
    "anvil.api.PluginContext",
    "anvil.artifact.Artifact",
    "anvil.config.ConfigNode",
    "anvil.config.pull.ConfigParser",
    "anvil.config.pull.ConfigParserError",
    "anvil.config.pull.ConfigSerializer",
    "anvil.model.Build",
    "anvil.model.Dependency",
    "anvil.plugin.MojoDescriptor",
    "anvil.plugin.MojoExecution",
    "anvil.plugin.PluginDescriptor",
    "anvil.project.Project",
    "anvil.repository.LocalRepository",
    "anvil.session.Session",
    "anvil.settings.Settings",
];

/// Packages the core realm exports to plugin realms.
pub const CORE_EXPORTED_PACKAGES: &[&str] = &[
    "anvil.api.*",
    "anvil.artifact.*",
    "anvil.model.*",
    "anvil.plugin.*",
    "anvil.project.*",
    "anvil.repository.*",
    "anvil.session.*",
    "anvil.settings.*",
];

/// Artifacts provided by the host, never loaded into plugin realms.
pub const CORE_EXPORTED_ARTIFACTS: &[&str] = &[
    "org.anvil:anvil-api",
    "org.anvil:anvil-core",
    "org.anvil:anvil-model",
    "org.anvil:anvil-plugin",
    "org.anvil:anvil-settings",
];

const CORE_LOCATION: &str = "anvil:core";
const MODULUS: u64 = 1_000_000_007;

/// What the core realm makes visible to plugins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreExports {
    /// Exported class and package patterns.
    pub packages: Vec<ImportPattern>,
    /// `groupId:artifactId` keys of artifacts the host already provides.
    pub artifacts: BTreeSet<String>,
}

impl Default for CoreExports {
    fn default() -> Self {
        Self {
            packages: CORE_EXPORTED_PACKAGES
                .iter()
                .map(|p| ImportPattern::parse(p))
                .collect(),
            artifacts: CORE_EXPORTED_ARTIFACTS
                .iter()
                .map(|a| (*a).to_string())
                .collect(),
        }
    }
}

impl CoreExports {
    /// Add exported patterns, skipping ones already present.
    #[must_use]
    pub fn with_extra<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pattern in patterns {
            let pattern = ImportPattern::parse(pattern.as_ref());
            if !self.packages.contains(&pattern) {
                self.packages.push(pattern);
            }
        }
        self
    }

    /// Filter dropping host-provided artifacts from plugin closures.
    #[must_use]
    pub fn artifact_filter(&self) -> DependencyFilter {
        DependencyFilter::Artifacts(self.artifacts.clone())
    }
}

/// A foreign import requested for a new realm.
#[derive(Debug, Clone)]
pub struct ForeignImport {
    /// Classes or packages to import.
    pub pattern: ImportPattern,
    /// Realm to import them from.
    pub realm: Arc<ClassRealm>,
}

impl ForeignImport {
    /// Import `pattern` from `realm`.
    #[must_use]
    pub fn new(pattern: ImportPattern, realm: Arc<ClassRealm>) -> Self {
        Self { pattern, realm }
    }
}

/// Creates, registers and disposes plugin and extension realms.
#[derive(Debug)]
pub struct RealmManager {
    world: ClassWorld,
    core: Arc<ClassRealm>,
    exports: CoreExports,
    contents: Arc<dyn ArtifactContents>,
    legacy: DashMap<String, Arc<ClassRealm>>,
}

impl RealmManager {
    /// Create a manager with a fresh world containing only the core realm.
    #[must_use]
    pub fn new(contents: Arc<dyn ArtifactContents>, exports: CoreExports) -> Self {
        let names: BTreeSet<String> = CORE_CLASSES.iter().map(|c| class_resource(c)).collect();
        let world = ClassWorld::new();
        let core = world.register_root(
            ClassRealmBuilder::new(RealmId::new(CORE_REALM_ID))
                .with_entry(ClasspathEntry::new(CORE_LOCATION, Arc::new(names)))
                .build(),
        );
        Self {
            world,
            core,
            exports,
            contents,
            legacy: DashMap::new(),
        }
    }

    /// The core realm.
    #[must_use]
    pub fn core_realm(&self) -> &Arc<ClassRealm> {
        &self.core
    }

    /// Registered realms.
    #[must_use]
    pub fn world(&self) -> &ClassWorld {
        &self.world
    }

    /// Core exports.
    #[must_use]
    pub fn exports(&self) -> &CoreExports {
        &self.exports
    }

    /// Artifact contents reader.
    #[must_use]
    pub fn contents(&self) -> &Arc<dyn ArtifactContents> {
        &self.contents
    }

    /// Build a plugin realm.
    ///
    /// The realm's classpath is exactly `artifacts`. It imports the core
    /// exports, then `foreign_imports`, then the compatibility classes. With
    /// no `parent` the realm is isolated from everything it does not import.
    ///
    /// # Errors
    ///
    /// [`PluginError::Manager`] if an artifact cannot be read or the realm
    /// cannot be registered; [`PluginError::CompatibilityImport`] if the core
    /// realm lacks a compatibility class.
    pub fn create_plugin_realm(
        &self,
        plugin: &PluginCoordinate,
        artifacts: &[Artifact],
        parent: Option<&Arc<ClassRealm>>,
        foreign_imports: &[ForeignImport],
    ) -> PluginResult<Arc<ClassRealm>> {
        self.create_realm("plugin", plugin, artifacts, parent, foreign_imports)
    }

    /// Build a realm for a build extension.
    ///
    /// # Errors
    ///
    /// Same as [`RealmManager::create_plugin_realm`].
    pub fn create_extension_realm(
        &self,
        plugin: &PluginCoordinate,
        artifacts: &[Artifact],
    ) -> PluginResult<Arc<ClassRealm>> {
        self.create_realm("extension", plugin, artifacts, None, &[])
    }

    fn create_realm(
        &self,
        kind: &str,
        plugin: &PluginCoordinate,
        artifacts: &[Artifact],
        parent: Option<&Arc<ClassRealm>>,
        foreign_imports: &[ForeignImport],
    ) -> PluginResult<Arc<ClassRealm>> {
        let plugin_id = plugin.id();
        let mut builder = ClassRealmBuilder::new(RealmId::new(format!("{kind}>{plugin_id}")))
            .with_parent(parent.cloned());
        for pattern in &self.exports.packages {
            builder = builder.with_import(pattern.clone(), self.core.clone());
        }
        for import in foreign_imports {
            builder = builder.with_import(import.pattern.clone(), import.realm.clone());
        }
        for entry in self.classpath(&plugin_id, artifacts)? {
            builder = builder.with_entry(entry);
        }
        let builder = self.import_compatibility(builder, &plugin_id)?;

        let realm = self.world.register_unique(builder).map_err(|e| PluginError::Manager {
            plugin: plugin_id.clone(),
            message: e.to_string(),
        })?;
        tracing::debug!(
            plugin = %plugin_id,
            realm = %realm.id(),
            artifacts = artifacts.len(),
            imports = foreign_imports.len(),
            "Created {kind} realm"
        );
        Ok(realm)
    }

    /// Return the realm cached for this plugin and exact artifact set, or
    /// build one as a child of the core realm.
    ///
    /// `plugin_artifact` is part of the classpath and of the cache key. The
    /// key does not depend on the order of `artifacts`.
    ///
    /// # Errors
    ///
    /// Same as [`RealmManager::create_plugin_realm`].
    pub fn get_or_create_realm(
        &self,
        plugin: &PluginCoordinate,
        plugin_artifact: &Artifact,
        artifacts: &[Artifact],
    ) -> PluginResult<Arc<ClassRealm>> {
        let mut classpath = vec![plugin_artifact.clone()];
        classpath.extend(
            artifacts
                .iter()
                .filter(|a| !a.same_identity(plugin_artifact))
                .cloned(),
        );
        let key = composite_key(plugin, &classpath);

        if let Some(existing) = self.cached_legacy_realm(&key) {
            tracing::debug!(realm = %existing.id(), "Reusing plugin realm");
            return Ok(existing);
        }

        let realm = self.build_legacy_realm(&key, plugin, &classpath)?;
        let winner = match self.legacy.entry(key) {
            Entry::Occupied(mut slot) => {
                if Arc::ptr_eq(slot.get(), &self.core) {
                    slot.insert(realm.clone());
                    None
                } else {
                    Some(slot.get().clone())
                }
            },
            Entry::Vacant(slot) => {
                slot.insert(realm.clone());
                None
            },
        };
        match winner {
            Some(winner) => {
                self.world.dispose(realm.id());
                Ok(winner)
            },
            None => Ok(realm),
        }
    }

    fn cached_legacy_realm(&self, key: &str) -> Option<Arc<ClassRealm>> {
        self.legacy
            .get(key)
            .map(|r| r.value().clone())
            .filter(|realm| !Arc::ptr_eq(realm, &self.core))
    }

    fn build_legacy_realm(
        &self,
        key: &str,
        plugin: &PluginCoordinate,
        classpath: &[Artifact],
    ) -> PluginResult<Arc<ClassRealm>> {
        let plugin_id = plugin.id();
        let mut builder =
            ClassRealmBuilder::new(RealmId::new(key)).with_parent(Some(self.core.clone()));
        for entry in self.classpath(&plugin_id, classpath)? {
            builder = builder.with_entry(entry);
        }
        let builder = self.import_compatibility(builder, &plugin_id)?;
        let realm = self.world.register_unique(builder).map_err(|e| PluginError::Manager {
            plugin: plugin_id.clone(),
            message: e.to_string(),
        })?;
        tracing::debug!(plugin = %plugin_id, realm = %realm.id(), "Created plugin realm");
        Ok(realm)
    }

    /// Map `key` to `realm` in the composite-key table.
    pub fn register_realm(&self, key: impl Into<String>, realm: Arc<ClassRealm>) {
        self.legacy.insert(key.into(), realm);
    }

    /// Number of realms in the composite-key table.
    #[must_use]
    pub fn cached_realm_count(&self) -> usize {
        self.legacy.len()
    }

    /// Remove a realm from the world and from the composite-key table.
    /// The core realm is never disposed.
    pub fn dispose(&self, id: &RealmId) -> bool {
        if id == self.core.id() {
            return false;
        }
        self.legacy.retain(|_, realm| realm.id() != id);
        self.world.dispose(id).is_some()
    }

    /// Dispose every realm built through the composite-key table.
    pub fn dispose_cached(&self) {
        let ids: Vec<RealmId> = self.legacy.iter().map(|r| r.value().id().clone()).collect();
        for id in ids {
            self.dispose(&id);
        }
    }

    fn classpath(&self, plugin_id: &str, artifacts: &[Artifact]) -> PluginResult<Vec<ClasspathEntry>> {
        artifacts
            .iter()
            .map(|artifact| {
                let location: PathBuf =
                    artifact.file.clone().ok_or_else(|| PluginError::Manager {
                        plugin: plugin_id.to_string(),
                        message: format!("artifact {artifact} has not been resolved to a file"),
                    })?;
                let names = self
                    .contents
                    .entries(&location)
                    .map_err(|e| PluginError::Manager {
                        plugin: plugin_id.to_string(),
                        message: format!("cannot read {}: {e}", location.display()),
                    })?;
                Ok(ClasspathEntry::new(location, names))
            })
            .collect()
    }

    fn import_compatibility(
        &self,
        mut builder: ClassRealmBuilder,
        plugin_id: &str,
    ) -> PluginResult<ClassRealmBuilder> {
        for class in COMPATIBILITY_IMPORTS {
            if self.core.load_class(class).is_none() {
                return Err(PluginError::CompatibilityImport {
                    plugin: plugin_id.to_string(),
                    message: format!("class {class} is not available from realm {}", self.core.id()),
                });
            }
            builder = builder.with_import(ImportPattern::Class((*class).to_string()), self.core.clone());
        }
        Ok(builder)
    }
}

/// `plugin>groupId:artifactId:version-<artifact set hash>`, with snapshot
/// versions in their base form.
#[must_use]
pub fn composite_key(plugin: &PluginCoordinate, artifacts: &[Artifact]) -> String {
    format!(
        "plugin>{}:{}:{}-{}",
        plugin.group_id,
        plugin.artifact_id,
        version::to_snapshot_version(plugin.version.as_deref().unwrap_or_default()),
        artifact_set_hash(artifacts)
    )
}

fn base_id(artifact: &Artifact) -> String {
    let mut base = artifact.clone();
    base.version = artifact.base_version();
    base.id()
}

/// Order-independent hash of a set of artifacts.
///
/// Each distinct artifact id, snapshot-normalized, contributes one non-zero
/// factor; the factors are multiplied modulo a large prime.
#[must_use]
pub fn artifact_set_hash(artifacts: &[Artifact]) -> u64 {
    let ids: BTreeSet<String> = artifacts.iter().map(base_id).collect();
    ids.iter().fold(1u64, |acc, id| {
        let digest = blake3::hash(id.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        let factor = match u64::from_le_bytes(head).wrapping_rem(MODULUS) {
            0 => 1,
            f => f,
        };
        let product = u128::from(acc).wrapping_mul(u128::from(factor));
        u64::try_from(product.wrapping_rem(u128::from(MODULUS))).unwrap_or(acc)
    })
}
