//! Runtime options for the plugin managers.

use std::time::Duration;

use anvil_core::phasing::DEFAULT_POLL_INTERVAL;

use crate::expression::EvaluationMode;

/// Knobs the plugin managers read at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginManagerOptions {
    /// Version of the running tool, checked against plugin prerequisites.
    pub runtime_version: String,
    /// Extra class or package patterns exported by the core realm.
    pub extra_core_exports: Vec<String>,
    /// How unresolved expressions are reported.
    pub evaluation_mode: EvaluationMode,
    /// Flush every cache and dispose cached realms when a build ends.
    pub flush_on_build_end: bool,
    /// Concurrent goals in a parallel build.
    pub executor_threads: usize,
    /// Completion check interval of the parallel executor.
    pub executor_poll_interval: Duration,
}

impl Default for PluginManagerOptions {
    fn default() -> Self {
        Self {
            runtime_version: env!("CARGO_PKG_VERSION").to_string(),
            extra_core_exports: Vec::new(),
            evaluation_mode: EvaluationMode::Standard,
            flush_on_build_end: true,
            executor_threads: 4,
            executor_poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PluginManagerOptions {
    /// Set the runtime version.
    #[must_use]
    pub fn with_runtime_version(mut self, version: impl Into<String>) -> Self {
        self.runtime_version = version.into();
        self
    }

    /// Set the evaluation mode.
    #[must_use]
    pub fn with_evaluation_mode(mut self, mode: EvaluationMode) -> Self {
        self.evaluation_mode = mode;
        self
    }
}

impl From<&anvil_config::Config> for PluginManagerOptions {
    fn from(config: &anvil_config::Config) -> Self {
        Self {
            runtime_version: config.plugins.runtime_version.clone(),
            extra_core_exports: config.plugins.extra_core_exports.clone(),
            evaluation_mode: if config.plugins.legacy_evaluator {
                EvaluationMode::Legacy
            } else {
                EvaluationMode::Standard
            },
            flush_on_build_end: config.cache.flush_on_build_end,
            executor_threads: config.executor.threads,
            executor_poll_interval: Duration::from_millis(config.executor.poll_interval_ms),
        }
    }
}
