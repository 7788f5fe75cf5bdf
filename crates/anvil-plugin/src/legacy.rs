//! Implicit access to the running session for older plugins.
//!
//! New code receives the session through [`crate::mojo::MojoContext`].
//! Plugins written against the older API read it from this per-thread slot
//! instead, which the plugin manager fills only for the duration of a mojo
//! execution.

use std::cell::RefCell;

use anvil_core::Session;

use crate::scoped::{self, ScopedRestore};

thread_local! {
    static SESSION: RefCell<Option<Session>> = const { RefCell::new(None) };
}

/// Per-thread session slot.
pub struct LegacySupport;

impl LegacySupport {
    /// The session of the mojo running on this thread.
    #[must_use]
    pub fn current() -> Option<Session> {
        scoped::current(&SESSION)
    }

    /// Expose `session` until the guard drops.
    #[must_use]
    pub fn enter(session: Option<Session>) -> LegacySessionGuard {
        LegacySessionGuard {
            _inner: ScopedRestore::replace(&SESSION, session),
        }
    }
}

/// Restores the previous legacy session on drop.
pub struct LegacySessionGuard {
    _inner: ScopedRestore<Session>,
}

#[cfg(test)]
mod tests {
    use anvil_core::{ExecutionRequest, LocalRepository, RepositoryContext, Settings};

    use super::*;

    fn session(dir: &str) -> Session {
        Session::new(
            ExecutionRequest::new(dir),
            Settings::new("/repo"),
            RepositoryContext::new(LocalRepository::new("/repo")),
        )
    }

    #[test]
    fn test_session_visible_only_inside_scope() {
        assert!(LegacySupport::current().is_none());
        {
            let _g = LegacySupport::enter(Some(session("/a")));
            let current = LegacySupport::current().unwrap();
            assert_eq!(current.execution_root_directory().to_str(), Some("/a"));
            {
                let _inner = LegacySupport::enter(None);
                assert!(LegacySupport::current().is_none());
            }
            assert!(LegacySupport::current().is_some());
        }
        assert!(LegacySupport::current().is_none());
    }
}
