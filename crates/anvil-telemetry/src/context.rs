//! Mojo execution context for correlation and tracing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one mojo execution, carried as a tracing span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Unique execution identifier.
    pub execution_id: Uuid,
    /// Identifier shared by every execution of one build.
    pub build_id: Option<Uuid>,
    /// When the execution started.
    pub started_at: DateTime<Utc>,
    /// Plugin id (`groupId:artifactId:version`).
    pub plugin: String,
    /// Goal being executed.
    pub goal: String,
    /// Execution id from the project model.
    pub execution: Option<String>,
    /// Project id.
    pub project: Option<String>,
}

impl ExecutionContext {
    /// Create a context for `plugin:goal`.
    #[must_use]
    pub fn new(plugin: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            build_id: None,
            started_at: Utc::now(),
            plugin: plugin.into(),
            goal: goal.into(),
            execution: None,
            project: None,
        }
    }

    /// Set the build id.
    #[must_use]
    pub fn with_build_id(mut self, id: Uuid) -> Self {
        self.build_id = Some(id);
        self
    }

    /// Set the model execution id.
    #[must_use]
    pub fn with_execution(mut self, execution: impl Into<String>) -> Self {
        self.execution = Some(execution.into());
        self
    }

    /// Set the project id.
    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Elapsed time since the execution started.
    #[must_use]
    pub fn elapsed(&self) -> chrono::Duration {
        #[allow(clippy::arithmetic_side_effects)]
        let elapsed = Utc::now() - self.started_at;
        elapsed
    }

    /// Elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        self.elapsed().num_milliseconds()
    }

    /// A tracing span carrying this context.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "mojo",
            execution_id = %self.execution_id,
            plugin = %self.plugin,
            goal = %self.goal,
            execution = self.execution.as_deref(),
            project = self.project.as_deref(),
        )
    }

    /// `plugin:goal (execution)` for log messages.
    #[must_use]
    pub fn label(&self) -> String {
        match &self.execution {
            Some(e) => format!("{}:{} ({e})", self.plugin, self.goal),
            None => format!("{}:{}", self.plugin, self.goal),
        }
    }
}

/// Keeps the execution span entered and logs completion on drop.
pub struct ExecutionGuard {
    context: ExecutionContext,
    /// Held to keep the span active until the guard is dropped.
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl ExecutionGuard {
    /// Enter the context's span.
    #[must_use]
    pub fn new(context: ExecutionContext) -> Self {
        let span = context.span().entered();
        tracing::debug!("Mojo execution started");
        Self { context, span }
    }

    /// The execution context.
    #[must_use]
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        tracing::debug!(elapsed_ms = self.context.elapsed_ms(), "Mojo execution finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_context_builder() {
        let build = Uuid::new_v4();
        let ctx = ExecutionContext::new("org.anvil:compiler:1.0", "compile")
            .with_build_id(build)
            .with_execution("default-compile")
            .with_project("org.example:app:1.0");

        assert_eq!(ctx.build_id, Some(build));
        assert_eq!(ctx.label(), "org.anvil:compiler:1.0:compile (default-compile)");
        assert_eq!(ctx.project.as_deref(), Some("org.example:app:1.0"));
    }

    #[test]
    fn test_unique_execution_ids() {
        let a = ExecutionContext::new("p", "g");
        let b = ExecutionContext::new("p", "g");
        assert_ne!(a.execution_id, b.execution_id);
    }

    #[test]
    fn test_elapsed_non_negative() {
        let ctx = ExecutionContext::new("p", "g");
        assert!(ctx.elapsed_ms() >= 0);
    }

    #[test]
    fn test_guard_keeps_context() {
        let guard = ExecutionGuard::new(ExecutionContext::new("p", "g"));
        assert_eq!(guard.context().goal, "g");
    }
}
