//! Configuration types for the Anvil build tool.
//!
//! Every struct implements [`Default`] with the same values as the embedded
//! `defaults.toml`, so a bare `[section]` header produces a working
//! configuration.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
    /// Phased task executor sizing.
    pub executor: ExecutorSection,
    /// Plugin realm and evaluation behaviour.
    pub plugins: PluginsSection,
    /// Plugin cache lifecycle.
    pub cache: CacheSection,
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"` or `"full"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["anvil_plugin=debug"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutorSection
// ---------------------------------------------------------------------------

/// Phased task executor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    /// Maximum number of concurrently running tasks.
    pub threads: usize,
    /// Interval between completion checks while a phase closes.
    pub poll_interval_ms: u64,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            threads: 4,
            poll_interval_ms: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// PluginsSection
// ---------------------------------------------------------------------------

/// Plugin loading configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsSection {
    /// Version of the running tool, checked against plugin prerequisites.
    pub runtime_version: String,
    /// Extra packages (`pkg.*`) or classes exported by the core realm.
    pub extra_core_exports: Vec<String>,
    /// Return unresolved expressions as literal text instead of unset.
    pub legacy_evaluator: bool,
}

impl Default for PluginsSection {
    fn default() -> Self {
        Self {
            runtime_version: "0.1.1".to_owned(),
            extra_core_exports: Vec::new(),
            legacy_evaluator: false,
        }
    }
}

// ---------------------------------------------------------------------------
// CacheSection
// ---------------------------------------------------------------------------

/// Plugin cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Flush every plugin cache when a build ends.
    pub flush_on_build_end: bool,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            flush_on_build_end: true,
        }
    }
}
