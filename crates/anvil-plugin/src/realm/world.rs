//! Registry of live realms and the import relation between them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anvil_core::DependencyGraph;
use dashmap::DashMap;
use dashmap::mapref::entry::{Entry, VacantEntry};

use super::{ClassRealm, ClassRealmBuilder, RealmId};

/// Errors from registering a realm.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    /// A realm with the id is already registered.
    #[error("realm {0} already exists")]
    DuplicateRealm(RealmId),

    /// Registering the realm would make realms import each other in a loop.
    #[error("realm imports form a cycle: {}", render_path(.path))]
    ImportCycle {
        /// Realms on the cycle, first and last equal.
        path: Vec<RealmId>,
    },
}

fn render_path(path: &[RealmId]) -> String {
    path.iter()
        .map(RealmId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// All realms known to one plugin manager.
#[derive(Debug, Default)]
pub struct ClassWorld {
    realms: DashMap<RealmId, Arc<ClassRealm>>,
    imports: Mutex<DependencyGraph<RealmId>>,
    suffix: AtomicU64,
}

impl ClassWorld {
    /// Create an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a realm without parent or imports, or return the one
    /// already registered under its id.
    pub fn register_root(&self, realm: ClassRealm) -> Arc<ClassRealm> {
        self.realms
            .entry(realm.id().clone())
            .or_insert_with(|| Arc::new(realm))
            .clone()
    }

    /// Freeze and register a realm under its exact id.
    ///
    /// Every import source is recorded as an edge of the import graph; an
    /// edge that closes a cycle rejects the realm and its edges are removed
    /// again.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateRealm`] if the id is taken and
    /// [`WorldError::ImportCycle`] if the imports would form a cycle.
    pub fn register(&self, builder: ClassRealmBuilder) -> Result<Arc<ClassRealm>, WorldError> {
        let id = builder.id().clone();
        match self.realms.entry(id.clone()) {
            Entry::Occupied(_) => Err(WorldError::DuplicateRealm(id)),
            Entry::Vacant(slot) => self.insert(slot, builder),
        }
    }

    /// Freeze and register a realm, using its id as a base name.
    ///
    /// The realm gets the base id if it is free, otherwise `base-N` for a
    /// fresh N. The id is reserved atomically, so concurrent registrations
    /// with the same base all succeed under distinct ids.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::ImportCycle`] if the imports would form a cycle.
    pub fn register_unique(&self, builder: ClassRealmBuilder) -> Result<Arc<ClassRealm>, WorldError> {
        let base = builder.id().clone();
        let mut candidate = base.clone();
        loop {
            if let Entry::Vacant(slot) = self.realms.entry(candidate) {
                let id = slot.key().clone();
                return self.insert(slot, builder.with_id(id));
            }
            let n = self.suffix.fetch_add(1, Ordering::Relaxed);
            candidate = RealmId::new(format!("{base}-{n}"));
        }
    }

    fn insert(
        &self,
        slot: VacantEntry<'_, RealmId, Arc<ClassRealm>>,
        builder: ClassRealmBuilder,
    ) -> Result<Arc<ClassRealm>, WorldError> {
        let id = builder.id().clone();
        {
            let mut graph = self.imports.lock().unwrap_or_else(PoisonError::into_inner);
            let sources: Vec<RealmId> = builder.import_sources().cloned().collect();
            for source in sources {
                if let Err(e) = graph.add_edge(id.clone(), source) {
                    graph.remove_node(&id);
                    return Err(WorldError::ImportCycle { path: e.path });
                }
            }
        }

        let realm = Arc::new(builder.build());
        slot.insert(realm.clone());
        tracing::debug!(realm = %id, "Registered class realm");
        Ok(realm)
    }

    /// Look up a realm.
    #[must_use]
    pub fn get(&self, id: &RealmId) -> Option<Arc<ClassRealm>> {
        self.realms.get(id).map(|r| r.value().clone())
    }

    /// Whether a realm with the id is registered.
    #[must_use]
    pub fn contains(&self, id: &RealmId) -> bool {
        self.realms.contains_key(id)
    }

    /// Remove a realm and its import edges. Realms that imported from it
    /// keep their handle.
    pub fn dispose(&self, id: &RealmId) -> Option<Arc<ClassRealm>> {
        let removed = self.realms.remove(id).map(|(_, r)| r);
        self.imports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove_node(id);
        if removed.is_some() {
            tracing::debug!(realm = %id, "Disposed class realm");
        }
        removed
    }

    /// Number of registered realms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.realms.len()
    }

    /// Whether no realm is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.realms.is_empty()
    }

    /// Ids of all registered realms, sorted.
    #[must_use]
    pub fn realm_ids(&self) -> Vec<RealmId> {
        let mut ids: Vec<RealmId> = self.realms.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Number of import edges between live realms.
    #[must_use]
    pub fn import_edge_count(&self) -> usize {
        self.imports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .edge_count()
    }

    /// Whether `from` was registered with an import from `to`.
    #[must_use]
    pub fn imports_from(&self, from: &RealmId, to: &RealmId) -> bool {
        self.imports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_edge(from, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realm::ImportPattern;

    #[test]
    fn test_unique_ids() {
        let world = ClassWorld::new();
        let first = world
            .register_unique(ClassRealmBuilder::new("plugin>g:a:1".into()))
            .unwrap();
        assert_eq!(first.id().as_str(), "plugin>g:a:1");

        let second = world
            .register_unique(ClassRealmBuilder::new("plugin>g:a:1".into()))
            .unwrap();
        assert_ne!(second.id(), first.id());
        assert!(second.id().as_str().starts_with("plugin>g:a:1-"));
    }

    #[test]
    fn test_concurrent_unique_registration() {
        let world = Arc::new(ClassWorld::new());
        let core = world.register_root(ClassRealmBuilder::new("core".into()).build());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let world = world.clone();
                let core = core.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .map(|_| {
                            world
                                .register_unique(
                                    ClassRealmBuilder::new("plugin>g:a:1".into())
                                        .with_import(ImportPattern::parse("anvil.api.*"), core.clone()),
                                )
                                .map(|r| r.id().clone())
                        })
                        .collect::<Result<Vec<_>, _>>()
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.extend(handle.join().unwrap().unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 200);
        assert_eq!(world.len(), 201);
    }

    #[test]
    fn test_duplicate_rejected() {
        let world = ClassWorld::new();
        world.register(ClassRealmBuilder::new("a".into())).unwrap();
        assert_eq!(
            world.register(ClassRealmBuilder::new("a".into())).unwrap_err(),
            WorldError::DuplicateRealm("a".into())
        );
    }

    #[test]
    fn test_import_edges_recorded() {
        let world = ClassWorld::new();
        let core = world.register_root(ClassRealmBuilder::new("core".into()).build());
        let plugin = world
            .register(
                ClassRealmBuilder::new("plugin".into())
                    .with_import(ImportPattern::parse("anvil.api.*"), core),
            )
            .unwrap();
        assert!(world.imports_from(plugin.id(), &"core".into()));
        assert_eq!(world.len(), 2);
    }

    #[test]
    fn test_self_import_is_a_cycle() {
        let world = ClassWorld::new();
        let other = Arc::new(ClassRealmBuilder::new("loop".into()).build());
        let err = world
            .register(
                ClassRealmBuilder::new("loop".into())
                    .with_import(ImportPattern::parse("x.*"), other),
            )
            .unwrap_err();
        let WorldError::ImportCycle { path } = err else {
            panic!("expected cycle, got {err:?}");
        };
        assert_eq!(path, vec![RealmId::new("loop"), RealmId::new("loop")]);
        assert!(world.get(&"loop".into()).is_none());
        assert!(!world.imports_from(&"loop".into(), &"loop".into()));
    }

    #[test]
    fn test_dispose_drops_import_edges() {
        let world = ClassWorld::new();
        let core = world.register_root(ClassRealmBuilder::new("core".into()).build());
        let plugin = world
            .register(
                ClassRealmBuilder::new("plugin".into())
                    .with_import(ImportPattern::parse("anvil.api.*"), core.clone()),
            )
            .unwrap();
        assert!(world.imports_from(plugin.id(), core.id()));

        world.dispose(plugin.id());
        assert!(!world.imports_from(plugin.id(), core.id()));
        assert_eq!(world.import_edge_count(), 0);

        world.register(ClassRealmBuilder::new("plugin".into())).unwrap();
        assert!(!world.imports_from(&"plugin".into(), core.id()));
    }

    #[test]
    fn test_dispose() {
        let world = ClassWorld::new();
        world.register(ClassRealmBuilder::new("a".into())).unwrap();
        assert!(world.dispose(&"a".into()).is_some());
        assert!(world.dispose(&"a".into()).is_none());
        assert!(world.is_empty());
    }
}
