//! Prelude module - commonly used test helpers.
//!
//! Use `use anvil_test::prelude::*;` in integration tests.

// Environment
pub use crate::{InMemoryArtifactResolver, MemoryArtifactContents, TestEnvironment};

// Fixtures
pub use crate::{
    PluginFixture, init_test_logging, test_project, test_repositories, test_session,
    test_session_with,
};

// Mojos
pub use crate::{Behavior, Observations, Recording, RecordingListener, TestMojo};
