//! Scripted mojos and listeners for testing the execution pipeline.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use anvil_core::{Artifact, PluginContext, Value};
use anvil_plugin::realm::RealmId;
use anvil_plugin::{
    ComponentRegistry, ContextRealm, LegacySupport, Mojo, MojoContext, MojoDescriptor, MojoError,
    MojoExecutionEvent, MojoExecutionListener, MojoLog, PluginResult,
};

/// What a [`TestMojo`] does when executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Behavior {
    /// Return successfully.
    #[default]
    Succeed,
    /// Report an expected build failure.
    Fail,
    /// Report an unexpected error.
    Error,
    /// Panic.
    Panic,
    /// Report a class linkage problem.
    Linkage,
    /// Attach the same classifier twice with different files.
    AttachTwice,
    /// Succeed, then fail to release.
    DisposeFails,
}

/// Everything a [`TestMojo`] observed.
#[derive(Debug, Clone, Default)]
pub struct Observations {
    /// Configured fields by name.
    pub fields: BTreeMap<String, Value>,
    /// Number of `execute` calls.
    pub executions: usize,
    /// Number of `dispose` calls.
    pub disposed: usize,
    /// Context realm installed while executing.
    pub context_realm: Option<RealmId>,
    /// Lookup realm installed while executing.
    pub lookup_realm: Option<RealmId>,
    /// Whether the legacy session slot was filled while executing.
    pub legacy_session: bool,
    /// Whether a log handle was received.
    pub log_received: bool,
    /// Plugin context received during configuration.
    pub plugin_context: Option<Arc<PluginContext>>,
}

/// Shared handle to the observations of every instance a factory creates.
#[derive(Debug, Clone, Default)]
pub struct Recording {
    inner: Arc<Mutex<Observations>>,
}

impl Recording {
    /// Create an empty recording.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current observations.
    #[must_use]
    pub fn snapshot(&self) -> Observations {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Configured value of a field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<Value> {
        self.snapshot().fields.get(name).cloned()
    }

    /// Number of executions.
    #[must_use]
    pub fn executions(&self) -> usize {
        self.snapshot().executions
    }

    /// Number of releases.
    #[must_use]
    pub fn disposed(&self) -> usize {
        self.snapshot().disposed
    }

    fn update(&self, f: impl FnOnce(&mut Observations)) {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
    }
}

/// Mojo whose outcome is scripted by a [`Behavior`].
#[derive(Debug)]
pub struct TestMojo {
    behavior: Behavior,
    recording: Recording,
    wants_context: bool,
    context: Option<Arc<PluginContext>>,
}

impl TestMojo {
    /// Create a mojo reporting into `recording`.
    #[must_use]
    pub fn new(behavior: Behavior, recording: Recording) -> Self {
        Self {
            behavior,
            recording,
            wants_context: false,
            context: None,
        }
    }

    /// Ask for the shared plugin context; each execution bumps its `runs`
    /// counter.
    #[must_use]
    pub fn with_plugin_context(mut self) -> Self {
        self.wants_context = true;
        self
    }

    /// Register a factory producing `TestMojo`s for `implementation`.
    pub fn register(
        registry: &ComponentRegistry,
        implementation: &str,
        behavior: Behavior,
        wants_context: bool,
    ) -> Recording {
        let recording = Recording::new();
        let shared = recording.clone();
        registry.register(implementation, move |_: &MojoDescriptor| -> Box<dyn Mojo> {
            let mojo = TestMojo::new(behavior, shared.clone());
            Box::new(if wants_context { mojo.with_plugin_context() } else { mojo })
        });
        recording
    }

    fn bump_runs(&self) {
        let Some(context) = &self.context else {
            return;
        };
        let mut entry = context.entry("runs".to_string()).or_insert(Value::Int(0));
        let next = match entry.value() {
            Value::Int(n) => n.saturating_add(1),
            _ => 1,
        };
        *entry.value_mut() = Value::Int(next);
    }
}

impl Mojo for TestMojo {
    fn execute(&mut self, context: &MojoContext<'_>) -> Result<(), MojoError> {
        self.recording.update(|o| {
            o.executions = o.executions.saturating_add(1);
            o.context_realm = ContextRealm::current().map(|r| r.id().clone());
            o.lookup_realm = ContextRealm::lookup().map(|r| r.id().clone());
            o.legacy_session = LegacySupport::current().is_some();
        });
        self.bump_runs();

        match self.behavior {
            Behavior::Succeed | Behavior::DisposeFails => Ok(()),
            Behavior::Fail => Err(MojoError::Failure {
                message: "scripted failure".into(),
                long_message: Some("the test asked this goal to fail".into()),
            }),
            Behavior::Error => Err(MojoError::execution("scripted error")),
            Behavior::Panic => panic!("scripted panic in {}", context.execution.goal),
            Behavior::Linkage => Err(MojoError::Linkage {
                class_name: "org.example.Helper".into(),
                message: "incompatible class change".into(),
            }),
            Behavior::AttachTwice => {
                let Some(project) = context.project else {
                    return Err(MojoError::execution("no project to attach to"));
                };
                let base = Artifact::new(&project.group_id, &project.artifact_id, &project.version)
                    .with_classifier("sources");
                project.attach_artifact(base.clone().with_file(project.build.directory.join("a.jar")))?;
                project.attach_artifact(base.with_file(project.build.directory.join("b.jar")))?;
                Ok(())
            },
        }
    }

    fn configure_field(&mut self, name: &str, value: Value) -> Result<(), MojoError> {
        self.recording.update(|o| {
            o.fields.insert(name.to_string(), value);
        });
        Ok(())
    }

    fn set_log(&mut self, log: MojoLog) {
        log.debug("log handle received");
        self.recording.update(|o| o.log_received = true);
    }

    fn wants_plugin_context(&self) -> bool {
        self.wants_context
    }

    fn set_plugin_context(&mut self, context: Arc<PluginContext>) {
        self.recording
            .update(|o| o.plugin_context = Some(context.clone()));
        self.context = Some(context);
    }

    fn dispose(&mut self) -> Result<(), MojoError> {
        self.recording
            .update(|o| o.disposed = o.disposed.saturating_add(1));
        if self.behavior == Behavior::DisposeFails {
            return Err(MojoError::execution("scripted release failure"));
        }
        Ok(())
    }
}

/// Listener appending one line per callback.
#[derive(Debug, Clone, Default)]
pub struct RecordingListener {
    events: Arc<Mutex<Vec<String>>>,
    reject_before: bool,
}

impl RecordingListener {
    /// Create a listener that accepts every execution.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a listener that vetoes every execution.
    #[must_use]
    pub fn rejecting() -> Self {
        Self {
            reject_before: true,
            ..Self::default()
        }
    }

    /// Lines recorded so far, such as `before:echo` or `failure:echo`.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, line: String) {
        if let Ok(mut events) = self.events.lock() {
            events.push(line);
        }
    }
}

impl MojoExecutionListener for RecordingListener {
    fn before_execution(&self, event: &MojoExecutionEvent<'_>) -> PluginResult<()> {
        self.push(format!("before:{}", event.execution.goal));
        if self.reject_before {
            return Err(anvil_plugin::PluginError::Execution {
                plugin: event.execution.plugin.id(),
                goal: event.execution.goal.clone(),
                project: event.project.map(|p| p.id()),
                message: "vetoed by listener".into(),
            });
        }
        Ok(())
    }

    fn after_success(&self, event: &MojoExecutionEvent<'_>) -> PluginResult<()> {
        self.push(format!("success:{}", event.execution.goal));
        Ok(())
    }

    fn after_failure(&self, event: &MojoExecutionEvent<'_>) {
        let has_error = event.error.is_some();
        self.push(format!("failure:{}:{has_error}", event.execution.goal));
    }
}
