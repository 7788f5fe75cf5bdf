//! Content-addressed caches for plugin resolution and realm setup.

mod keys;
mod record;

use std::sync::Arc;

use anvil_core::Artifact;

pub use keys::{
    ExtensionRealmKey, PluginArtifactsKey, PluginDescriptorKey, PluginRealmKey, ProjectArtifactsKey,
};
pub use record::{CacheRecord, NoUsageTracking, RecordCache, UsageHook};

use crate::descriptor::{ExtensionDescriptor, PluginDescriptor};
use crate::realm::ClassRealm;

/// A cached plugin realm and the artifacts it was built from.
#[derive(Debug, Clone)]
pub struct PluginRealmRecord {
    /// The realm.
    pub realm: Arc<ClassRealm>,
    /// Full closure, plugin artifact first.
    pub artifacts: Vec<Artifact>,
}

/// A cached extension realm.
#[derive(Debug, Clone)]
pub struct ExtensionRealmRecord {
    /// The realm.
    pub realm: Arc<ClassRealm>,
    /// Artifacts the realm was built from.
    pub artifacts: Vec<Artifact>,
    /// Exported packages and artifacts, if the extension declares any.
    pub descriptor: Option<ExtensionDescriptor>,
}

/// The five caches one plugin manager owns.
#[derive(Debug)]
pub struct PluginCaches {
    /// Resolved plugin closures.
    pub plugin_artifacts: RecordCache<PluginArtifactsKey, Arc<Vec<Artifact>>>,
    /// Plugin realms.
    pub plugin_realms: RecordCache<PluginRealmKey, Arc<PluginRealmRecord>>,
    /// Raw plugin descriptors.
    pub descriptors: RecordCache<PluginDescriptorKey, Arc<PluginDescriptor>>,
    /// Extension realms.
    pub extension_realms: RecordCache<ExtensionRealmKey, Arc<ExtensionRealmRecord>>,
    /// Resolved project dependencies.
    pub project_artifacts: RecordCache<ProjectArtifactsKey, Arc<Vec<Artifact>>>,
}

impl Default for PluginCaches {
    fn default() -> Self {
        Self::with_usage(Arc::new(NoUsageTracking))
    }
}

impl PluginCaches {
    /// Create empty caches.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create empty caches sharing one usage hook.
    #[must_use]
    pub fn with_usage(usage: Arc<dyn UsageHook>) -> Self {
        Self {
            plugin_artifacts: RecordCache::with_usage("plugin-artifacts", usage.clone()),
            plugin_realms: RecordCache::with_usage("plugin-realm", usage.clone()),
            descriptors: RecordCache::with_usage("plugin-descriptor", usage.clone()),
            extension_realms: RecordCache::with_usage("extension-realm", usage.clone()),
            project_artifacts: RecordCache::with_usage("project-artifacts", usage),
        }
    }

    /// Realms held by the realm caches.
    #[must_use]
    pub fn cached_realms(&self) -> Vec<Arc<ClassRealm>> {
        let plugins = self.plugin_realms.values().into_iter().map(|r| r.realm.clone());
        let extensions = self
            .extension_realms
            .values()
            .into_iter()
            .map(|r| r.realm.clone());
        plugins.chain(extensions).collect()
    }

    /// Flush every cache.
    pub fn flush_all(&self) {
        self.plugin_artifacts.flush();
        self.plugin_realms.flush();
        self.descriptors.flush();
        self.extension_realms.flush();
        self.project_artifacts.flush();
    }
}
