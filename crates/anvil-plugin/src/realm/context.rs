//! The realm a thread is currently running plugin code in.
//!
//! Mojo code that needs to look up classes or resources without an explicit
//! realm handle consults the context realm. The plugin manager installs it
//! around every configuration and execution step and always restores the
//! previous value.

use std::cell::RefCell;
use std::sync::Arc;

use super::ClassRealm;
use crate::scoped::{self, ScopedRestore};

thread_local! {
    static CONTEXT_REALM: RefCell<Option<Arc<ClassRealm>>> = const { RefCell::new(None) };
    static LOOKUP_REALM: RefCell<Option<Arc<ClassRealm>>> = const { RefCell::new(None) };
}

/// Per-thread realm slots.
pub struct ContextRealm;

impl ContextRealm {
    /// The thread's context realm.
    #[must_use]
    pub fn current() -> Option<Arc<ClassRealm>> {
        scoped::current(&CONTEXT_REALM)
    }

    /// Make `realm` the context realm until the guard drops.
    #[must_use]
    pub fn enter(realm: Option<Arc<ClassRealm>>) -> ContextRealmGuard {
        ContextRealmGuard {
            _inner: ScopedRestore::replace(&CONTEXT_REALM, realm),
        }
    }

    /// Realm used for component lookups, if overridden.
    #[must_use]
    pub fn lookup() -> Option<Arc<ClassRealm>> {
        scoped::current(&LOOKUP_REALM)
    }

    /// Override the component lookup realm until the guard drops.
    #[must_use]
    pub fn enter_lookup(realm: Option<Arc<ClassRealm>>) -> LookupRealmGuard {
        LookupRealmGuard {
            _inner: ScopedRestore::replace(&LOOKUP_REALM, realm),
        }
    }
}

/// Restores the previous context realm on drop.
pub struct ContextRealmGuard {
    _inner: ScopedRestore<Arc<ClassRealm>>,
}

/// Clears the lookup realm override on drop.
pub struct LookupRealmGuard {
    _inner: ScopedRestore<Arc<ClassRealm>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realm::{ClassRealmBuilder, RealmId};

    fn realm(id: &str) -> Arc<ClassRealm> {
        Arc::new(ClassRealmBuilder::new(RealmId::new(id)).build())
    }

    #[test]
    fn test_context_realm_restored() {
        let outer = realm("outer");
        let _g = ContextRealm::enter(Some(outer.clone()));
        {
            let _inner = ContextRealm::enter(Some(realm("inner")));
            assert_eq!(ContextRealm::current().unwrap().id().as_str(), "inner");
        }
        assert!(Arc::ptr_eq(&ContextRealm::current().unwrap(), &outer));
    }

    #[test]
    fn test_lookup_realm_cleared() {
        assert!(ContextRealm::lookup().is_none());
        {
            let _g = ContextRealm::enter_lookup(Some(realm("plugin")));
            assert!(ContextRealm::lookup().is_some());
        }
        assert!(ContextRealm::lookup().is_none());
    }
}
