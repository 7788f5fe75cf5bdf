//! Mojo executions and execution listeners.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use anvil_core::{
    ConfigNode, PluginCoordinate, PluginDeclaration, Project, PropertyAccess, PropertyResult,
    PropertyTable, Session, Value,
};

use crate::descriptor::MojoDescriptor;
use crate::error::{PluginError, PluginResult};

/// Execution id used when a goal is invoked directly.
pub const DEFAULT_EXECUTION_ID: &str = "default-cli";

/// One requested run of a goal.
#[derive(Debug, Clone)]
pub struct MojoExecution {
    /// Plugin providing the goal.
    pub plugin: PluginCoordinate,
    /// Goal name.
    pub goal: String,
    /// Execution id from the project model.
    pub execution_id: Option<String>,
    /// Phase the execution is bound to.
    pub lifecycle_phase: Option<String>,
    /// Merged configuration.
    pub configuration: Option<ConfigNode>,
    /// The goal's descriptor once resolved.
    pub descriptor: Option<Arc<MojoDescriptor>>,
}

impl MojoExecution {
    /// A direct invocation with no configuration.
    #[must_use]
    pub fn new(plugin: PluginCoordinate, goal: impl Into<String>) -> Self {
        Self {
            plugin,
            goal: goal.into(),
            execution_id: None,
            lifecycle_phase: None,
            configuration: None,
            descriptor: None,
        }
    }

    /// An execution configured from a project's plugin declaration.
    ///
    /// Configuration is the plugin-level tree, overridden by the named
    /// execution's tree, overridden by that execution's per-goal tree.
    #[must_use]
    pub fn from_project(
        declaration: &PluginDeclaration,
        goal: impl Into<String>,
        execution_id: Option<&str>,
    ) -> Self {
        let goal = goal.into();
        let execution = execution_id.and_then(|id| declaration.execution(id));
        let configuration = ConfigNode::merge_levels([
            declaration.configuration.as_ref(),
            execution.and_then(|e| e.configuration.as_ref()),
            execution.and_then(|e| e.goal_configurations.get(&goal)),
        ]);
        Self {
            plugin: declaration.coordinate.clone(),
            goal,
            execution_id: execution_id.map(str::to_string),
            lifecycle_phase: execution.and_then(|e| e.phase.clone()),
            configuration,
            descriptor: None,
        }
    }

    /// Set the execution id.
    #[must_use]
    pub fn with_execution_id(mut self, id: impl Into<String>) -> Self {
        self.execution_id = Some(id.into());
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_configuration(mut self, configuration: ConfigNode) -> Self {
        self.configuration = Some(configuration);
        self
    }

    /// The execution id, or [`DEFAULT_EXECUTION_ID`].
    #[must_use]
    pub fn execution_id(&self) -> &str {
        self.execution_id.as_deref().unwrap_or(DEFAULT_EXECUTION_ID)
    }

    /// Bind the descriptor and merge the configuration over its defaults,
    /// keeping only elements that name a parameter.
    ///
    /// Elements given under a parameter's alias are renamed to the parameter
    /// first, unless the parameter is also given by name.
    pub fn finalize_configuration(&mut self, descriptor: Arc<MojoDescriptor>) {
        let defaults = descriptor.default_configuration();
        let configuration = self
            .configuration
            .take()
            .map(|c| canonical_names(c, &descriptor));
        let merged = ConfigNode::merge(configuration.as_ref(), Some(&defaults))
            .map(|c| c.retain_children(|name| descriptor.parameter(name).is_some()));
        self.configuration = merged;
        self.descriptor = Some(descriptor);
    }

    /// `groupId:artifactId:version:goal (execution)`.
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}:{} ({})", self.plugin.id(), self.goal, self.execution_id())
    }
}

fn canonical_names(mut configuration: ConfigNode, descriptor: &MojoDescriptor) -> ConfigNode {
    let given: BTreeSet<String> = configuration.children.iter().map(|c| c.name.clone()).collect();
    for child in &mut configuration.children {
        let Some(parameter) = descriptor.parameter(&child.name) else {
            continue;
        };
        if parameter.name != child.name && !given.contains(&parameter.name) {
            child.name.clone_from(&parameter.name);
        }
    }
    configuration
}

impl fmt::Display for MojoExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

static MOJO_EXECUTION: LazyLock<PropertyTable<MojoExecution>> = LazyLock::new(|| {
    PropertyTable::<MojoExecution>::new("anvil.plugin.MojoExecution")
        .property("groupId", |e| Some(Value::from(&e.plugin.group_id)))
        .property("artifactId", |e| Some(Value::from(&e.plugin.artifact_id)))
        .property("version", |e| e.plugin.version.as_ref().map(Value::from))
        .property("goal", |e| Some(Value::from(&e.goal)))
        .property("executionId", |e| Some(Value::from(e.execution_id())))
        .property("lifecyclePhase", |e| e.lifecycle_phase.as_ref().map(Value::from))
        .property("mojoDescriptor", |e| {
            e.descriptor.clone().map(|d| Value::Object(d))
        })
});

impl PropertyAccess for MojoExecution {
    fn class_name(&self) -> &str {
        MOJO_EXECUTION.class_name()
    }

    fn property(&self, name: &str) -> PropertyResult {
        MOJO_EXECUTION.get(self, name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// What a listener is told about.
#[derive(Debug, Clone, Copy)]
pub struct MojoExecutionEvent<'a> {
    /// Build session.
    pub session: &'a Session,
    /// Project the goal runs for.
    pub project: Option<&'a Arc<Project>>,
    /// The execution.
    pub execution: &'a MojoExecution,
    /// The failure, for failure events.
    pub error: Option<&'a PluginError>,
}

/// Hooks around every mojo execution.
pub trait MojoExecutionListener: Send + Sync {
    /// Called after configuration, before the mojo runs.
    ///
    /// # Errors
    ///
    /// An error aborts the execution.
    fn before_execution(&self, _event: &MojoExecutionEvent<'_>) -> PluginResult<()> {
        Ok(())
    }

    /// Called after the mojo succeeded.
    ///
    /// # Errors
    ///
    /// An error fails the execution.
    fn after_success(&self, _event: &MojoExecutionEvent<'_>) -> PluginResult<()> {
        Ok(())
    }

    /// Called after the mojo or a listener failed.
    fn after_failure(&self, _event: &MojoExecutionEvent<'_>) {}
}

/// Listener list owned by the caller and shared with a [`CompoundListener`].
pub type ListenerList = Arc<RwLock<Vec<Arc<dyn MojoExecutionListener>>>>;

/// Broadcasts to every listener of a live list.
///
/// The list is read by index on every step, so listeners added while an
/// event is being delivered are notified too.
#[derive(Clone, Default)]
pub struct CompoundListener {
    listeners: ListenerList,
}

impl CompoundListener {
    /// Broadcast over `listeners`.
    #[must_use]
    pub fn new(listeners: ListenerList) -> Self {
        Self { listeners }
    }

    /// The shared list.
    #[must_use]
    pub fn listeners(&self) -> &ListenerList {
        &self.listeners
    }

    /// Append a listener.
    pub fn add(&self, listener: Arc<dyn MojoExecutionListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    fn at(&self, index: usize) -> Option<Arc<dyn MojoExecutionListener>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .cloned()
    }

    fn each<F>(&self, mut f: F) -> PluginResult<()>
    where
        F: FnMut(&dyn MojoExecutionListener) -> PluginResult<()>,
    {
        let mut index = 0usize;
        while let Some(listener) = self.at(index) {
            f(listener.as_ref())?;
            index = index.saturating_add(1);
        }
        Ok(())
    }
}

impl MojoExecutionListener for CompoundListener {
    fn before_execution(&self, event: &MojoExecutionEvent<'_>) -> PluginResult<()> {
        self.each(|l| l.before_execution(event))
    }

    fn after_success(&self, event: &MojoExecutionEvent<'_>) -> PluginResult<()> {
        self.each(|l| l.after_success(event))
    }

    fn after_failure(&self, event: &MojoExecutionEvent<'_>) {
        let _ = self.each(|l| {
            l.after_failure(event);
            Ok(())
        });
    }
}

impl fmt::Debug for CompoundListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("CompoundListener")
            .field("listeners", &count)
            .finish()
    }
}
