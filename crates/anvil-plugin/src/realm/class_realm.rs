//! Isolated class realms.
//!
//! A realm owns an ordered classpath, an optional parent, and a list of
//! foreign imports. Lookups consult the imports first, then the realm's own
//! classpath, then the parent. Realms are immutable once built; the only
//! imports a realm ever has are the ones given to its builder.

use std::collections::BTreeSet;
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Unique realm name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RealmId(Arc<str>);

impl RealmId {
    /// Create a realm id.
    #[must_use]
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// The id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RealmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RealmId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Which classes an import makes visible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImportPattern {
    /// Exactly one class, e.g. `anvil.config.ConfigNode`.
    Class(String),
    /// A package and all its subpackages, written `anvil.api.*`.
    Package(String),
}

impl ImportPattern {
    /// Parse `pkg.*` as a package pattern and anything else as a class.
    #[must_use]
    pub fn parse(pattern: &str) -> Self {
        let pattern = pattern.trim();
        match pattern.strip_suffix(".*") {
            Some(package) => Self::Package(package.to_string()),
            None => Self::Class(pattern.to_string()),
        }
    }

    /// Whether a class name falls under this pattern.
    #[must_use]
    pub fn matches_class(&self, class_name: &str) -> bool {
        match self {
            Self::Class(name) => name == class_name,
            Self::Package(package) => class_name
                .strip_prefix(package.as_str())
                .is_some_and(|rest| rest.starts_with('.')),
        }
    }

    /// Whether a `/`-separated resource name falls under this pattern.
    #[must_use]
    pub fn matches_resource(&self, resource: &str) -> bool {
        match self {
            Self::Class(name) => class_resource(name) == resource,
            Self::Package(package) => {
                let prefix = package.replace('.', "/");
                resource
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
            },
        }
    }
}

impl fmt::Display for ImportPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class(name) => f.write_str(name),
            Self::Package(package) => write!(f, "{package}.*"),
        }
    }
}

/// Resource name of a class: `a.b.C` → `a/b/C.class`.
#[must_use]
pub fn class_resource(class_name: &str) -> String {
    format!("{}.class", class_name.replace('.', "/"))
}

/// One classpath location and the entry names it provides.
#[derive(Debug, Clone)]
pub struct ClasspathEntry {
    /// Artifact file or directory.
    pub location: PathBuf,
    names: Arc<BTreeSet<String>>,
}

impl ClasspathEntry {
    /// Create an entry.
    #[must_use]
    pub fn new(location: impl Into<PathBuf>, names: Arc<BTreeSet<String>>) -> Self {
        Self {
            location: location.into(),
            names,
        }
    }

    /// Whether the entry contains `resource`.
    #[must_use]
    pub fn contains(&self, resource: &str) -> bool {
        self.names.contains(resource)
    }
}

/// A class as seen through a realm: its name and the realm that defines it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedClass {
    /// Class name.
    pub name: String,
    /// Realm whose classpath defines the class.
    pub realm: RealmId,
    /// Classpath location holding the class.
    pub location: PathBuf,
}

/// An isolated class-loading boundary.
pub struct ClassRealm {
    id: RealmId,
    parent: Option<Arc<ClassRealm>>,
    entries: Vec<ClasspathEntry>,
    imports: Vec<(ImportPattern, Arc<ClassRealm>)>,
}

impl ClassRealm {
    /// Realm id.
    #[must_use]
    pub fn id(&self) -> &RealmId {
        &self.id
    }

    /// Parent realm, consulted after imports and the local classpath.
    #[must_use]
    pub fn parent(&self) -> Option<&Arc<ClassRealm>> {
        self.parent.as_ref()
    }

    /// Classpath locations in lookup order.
    #[must_use]
    pub fn urls(&self) -> Vec<&Path> {
        self.entries.iter().map(|e| e.location.as_path()).collect()
    }

    /// Foreign imports as (pattern, source realm id).
    pub fn imports(&self) -> impl Iterator<Item = (&ImportPattern, &RealmId)> {
        self.imports.iter().map(|(p, r)| (p, r.id()))
    }

    /// Realms this realm imports from, without duplicates.
    #[must_use]
    pub fn imported_realms(&self) -> Vec<&Arc<ClassRealm>> {
        let mut seen = BTreeSet::new();
        self.imports
            .iter()
            .filter(|(_, r)| seen.insert(r.id().clone()))
            .map(|(_, r)| r)
            .collect()
    }

    /// Look up a class through imports, then the local classpath, then the
    /// parent.
    #[must_use]
    pub fn load_class(&self, class_name: &str) -> Option<LoadedClass> {
        for (pattern, source) in &self.imports {
            if pattern.matches_class(class_name)
                && let Some(class) = source.load_class(class_name)
            {
                return Some(class);
            }
        }
        if let Some(entry) = self.local_entry(&class_resource(class_name)) {
            return Some(LoadedClass {
                name: class_name.to_string(),
                realm: self.id.clone(),
                location: entry.location.clone(),
            });
        }
        self.parent.as_ref().and_then(|p| p.load_class(class_name))
    }

    /// Locate the classpath entry providing a resource, using the same order
    /// as [`ClassRealm::load_class`].
    #[must_use]
    pub fn find_resource(&self, resource: &str) -> Option<PathBuf> {
        for (pattern, source) in &self.imports {
            if pattern.matches_resource(resource)
                && let Some(location) = source.find_resource(resource)
            {
                return Some(location);
            }
        }
        if let Some(entry) = self.local_entry(resource) {
            return Some(entry.location.clone());
        }
        self.parent.as_ref().and_then(|p| p.find_resource(resource))
    }

    /// Whether this realm's own classpath defines the class.
    #[must_use]
    pub fn defines(&self, class_name: &str) -> bool {
        self.local_entry(&class_resource(class_name)).is_some()
    }

    fn local_entry(&self, resource: &str) -> Option<&ClasspathEntry> {
        self.entries.iter().find(|e| e.contains(resource))
    }

    /// Human-readable dump of the realm, its imports, classpath and parents.
    #[must_use]
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let mut current = Some(self);
        let mut depth = 0usize;
        while let Some(realm) = current {
            let indent = "  ".repeat(depth);
            let _ = writeln!(out, "{indent}Realm: {}", realm.id);
            if !realm.imports.is_empty() {
                let _ = writeln!(out, "{indent}Imports:");
                for (pattern, source) in &realm.imports {
                    let _ = writeln!(out, "{indent}  {pattern} < {}", source.id);
                }
            }
            let _ = writeln!(out, "{indent}Classpath:");
            if realm.entries.is_empty() {
                let _ = writeln!(out, "{indent}  (empty)");
            }
            for (i, entry) in realm.entries.iter().enumerate() {
                let _ = writeln!(out, "{indent}  [{i}] {}", entry.location.display());
            }
            current = realm.parent.as_deref();
            if current.is_some() {
                let _ = writeln!(out, "{indent}Parent:");
                depth = depth.saturating_add(1);
            }
        }
        out
    }
}

impl fmt::Debug for ClassRealm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassRealm")
            .field("id", &self.id)
            .field("parent", &self.parent.as_ref().map(|p| p.id()))
            .field("urls", &self.urls())
            .field(
                "imports",
                &self
                    .imports
                    .iter()
                    .map(|(p, r)| format!("{p} < {}", r.id))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Collects the parts of a realm before it is frozen.
#[derive(Debug)]
pub struct ClassRealmBuilder {
    id: RealmId,
    parent: Option<Arc<ClassRealm>>,
    entries: Vec<ClasspathEntry>,
    imports: Vec<(ImportPattern, Arc<ClassRealm>)>,
}

impl ClassRealmBuilder {
    /// Start a realm with the given id.
    #[must_use]
    pub fn new(id: RealmId) -> Self {
        Self {
            id,
            parent: None,
            entries: Vec::new(),
            imports: Vec::new(),
        }
    }

    /// Id the realm will have.
    #[must_use]
    pub fn id(&self) -> &RealmId {
        &self.id
    }

    /// Replace the id.
    #[must_use]
    pub fn with_id(mut self, id: RealmId) -> Self {
        self.id = id;
        self
    }

    /// Set the parent realm.
    #[must_use]
    pub fn with_parent(mut self, parent: Option<Arc<ClassRealm>>) -> Self {
        self.parent = parent;
        self
    }

    /// Append a classpath entry.
    #[must_use]
    pub fn with_entry(mut self, entry: ClasspathEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Import classes matching `pattern` from `source`.
    #[must_use]
    pub fn with_import(mut self, pattern: ImportPattern, source: Arc<ClassRealm>) -> Self {
        self.imports.push((pattern, source));
        self
    }

    /// Realms the finished realm will import from.
    pub fn import_sources(&self) -> impl Iterator<Item = &RealmId> {
        self.imports.iter().map(|(_, r)| r.id())
    }

    /// Freeze the realm.
    #[must_use]
    pub fn build(self) -> ClassRealm {
        ClassRealm {
            id: self.id,
            parent: self.parent,
            entries: self.entries,
            imports: self.imports,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(location: &str, names: &[&str]) -> ClasspathEntry {
        ClasspathEntry::new(
            location,
            Arc::new(names.iter().map(|n| (*n).to_string()).collect()),
        )
    }

    fn core() -> Arc<ClassRealm> {
        Arc::new(
            ClassRealmBuilder::new("core".into())
                .with_entry(entry(
                    "/core.jar",
                    &["anvil/api/Mojo.class", "anvil/config/ConfigNode.class"],
                ))
                .build(),
        )
    }

    #[test]
    fn test_import_pattern_matching() {
        let pkg = ImportPattern::parse("anvil.api.*");
        assert!(pkg.matches_class("anvil.api.Mojo"));
        assert!(pkg.matches_class("anvil.api.logging.Log"));
        assert!(!pkg.matches_class("anvil.apix.Mojo"));
        assert!(pkg.matches_resource("anvil/api/Mojo.class"));
        assert!(!pkg.matches_resource("anvil/apix/Mojo.class"));

        let class = ImportPattern::parse("anvil.config.ConfigNode");
        assert!(class.matches_class("anvil.config.ConfigNode"));
        assert!(!class.matches_class("anvil.config.ConfigNodeBuilder"));
        assert_eq!(class.to_string(), "anvil.config.ConfigNode");
        assert_eq!(pkg.to_string(), "anvil.api.*");
    }

    #[test]
    fn test_lookup_order_imports_local_parent() {
        let core = core();
        let plugin = ClassRealmBuilder::new("plugin".into())
            .with_parent(Some(core.clone()))
            .with_import(ImportPattern::parse("anvil.config.ConfigNode"), core.clone())
            .with_entry(entry(
                "/plugin.jar",
                &["org/example/CompileMojo.class", "anvil/config/ConfigNode.class"],
            ))
            .build();

        // Imported: the core copy wins over the bundled one.
        assert_eq!(
            plugin.load_class("anvil.config.ConfigNode").unwrap().realm,
            RealmId::new("core")
        );
        // Local.
        let local = plugin.load_class("org.example.CompileMojo").unwrap();
        assert_eq!(local.realm, RealmId::new("plugin"));
        assert_eq!(local.location, PathBuf::from("/plugin.jar"));
        // Parent.
        assert_eq!(
            plugin.load_class("anvil.api.Mojo").unwrap().realm,
            RealmId::new("core")
        );
        assert!(plugin.load_class("org.other.Missing").is_none());
    }

    #[test]
    fn test_isolated_realm_without_parent() {
        let plugin = ClassRealmBuilder::new("plugin".into())
            .with_entry(entry("/plugin.jar", &["org/example/CompileMojo.class"]))
            .build();
        assert!(plugin.load_class("anvil.api.Mojo").is_none());
        assert!(plugin.defines("org.example.CompileMojo"));
    }

    #[test]
    fn test_find_resource() {
        let core = core();
        let plugin = ClassRealmBuilder::new("plugin".into())
            .with_import(ImportPattern::parse("anvil.api.*"), core)
            .with_entry(entry("/plugin.jar", &["META-INF/anvil/plugin.toml"]))
            .build();
        assert_eq!(
            plugin.find_resource("META-INF/anvil/plugin.toml"),
            Some(PathBuf::from("/plugin.jar"))
        );
        assert_eq!(
            plugin.find_resource("anvil/api/Mojo.class"),
            Some(PathBuf::from("/core.jar"))
        );
    }

    #[test]
    fn test_dump_lists_urls_and_parent() {
        let core = core();
        let plugin = ClassRealmBuilder::new("plugin".into())
            .with_parent(Some(core.clone()))
            .with_import(ImportPattern::parse("anvil.api.*"), core)
            .with_entry(entry("/plugin.jar", &[]))
            .build();
        let dump = plugin.dump();
        assert!(dump.contains("Realm: plugin"));
        assert!(dump.contains("anvil.api.* < core"));
        assert!(dump.contains("[0] /plugin.jar"));
        assert!(dump.contains("  Realm: core"));
        assert!(dump.contains("[0] /core.jar"));
    }
}
