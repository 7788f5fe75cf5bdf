//! The entry point a build driver uses to run goals.

use std::sync::Arc;

use anvil_core::{ExecutorResult, PhasingExecutor, PluginCoordinate, Project, Session};
use dashmap::DashMap;
use uuid::Uuid;

use crate::cache::ExtensionRealmRecord;
use crate::descriptor::{MojoDescriptor, PluginDescriptor, RuntimePluginDescriptor};
use crate::error::PluginResult;
use crate::execution::{CompoundListener, ListenerList, MojoExecution, MojoExecutionListener};
use crate::invoke;
use crate::manager::{self, PluginManager};
use crate::realm::ForeignImport;

/// Runs mojo executions for one build.
///
/// Wraps a [`PluginManager`] with the build's listeners and the extension
/// realms registered per project.
#[derive(Debug)]
pub struct BuildPluginManager {
    manager: Arc<PluginManager>,
    listeners: CompoundListener,
    build_id: Uuid,
    extension_imports: DashMap<String, Vec<ForeignImport>>,
}

impl BuildPluginManager {
    /// A build over `manager` with no listeners.
    #[must_use]
    pub fn new(manager: Arc<PluginManager>) -> Self {
        Self {
            manager,
            listeners: CompoundListener::default(),
            build_id: Uuid::new_v4(),
            extension_imports: DashMap::new(),
        }
    }

    /// Broadcast to a caller-owned listener list.
    #[must_use]
    pub fn with_listeners(mut self, listeners: ListenerList) -> Self {
        self.listeners = CompoundListener::new(listeners);
        self
    }

    /// The underlying plugin manager.
    #[must_use]
    pub fn manager(&self) -> &Arc<PluginManager> {
        &self.manager
    }

    /// Id shared by every execution of this build.
    #[must_use]
    pub fn build_id(&self) -> Uuid {
        self.build_id
    }

    /// A parallel executor sized by the manager's options, for running
    /// thread-safe goals of independent projects concurrently.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker runtime cannot start.
    pub fn executor(&self) -> ExecutorResult<PhasingExecutor> {
        let options = self.manager.options();
        PhasingExecutor::new(options.executor_threads, options.executor_poll_interval)
    }

    /// Append a listener.
    pub fn add_listener(&self, listener: Arc<dyn MojoExecutionListener>) {
        self.listeners.add(listener);
    }

    /// Load a plugin and check its prerequisites.
    ///
    /// # Errors
    ///
    /// Resolution, descriptor and [`crate::PluginError::Incompatible`]
    /// errors.
    pub fn load_plugin(&self, plugin: &PluginCoordinate, session: &Session) -> PluginResult<Arc<PluginDescriptor>> {
        let descriptor = self.manager.load_session_plugin(plugin, session)?;
        self.manager.check_prerequisites(&descriptor)?;
        Ok(descriptor)
    }

    /// The descriptor of one goal.
    ///
    /// # Errors
    ///
    /// Everything [`BuildPluginManager::load_plugin`] returns, and
    /// [`crate::PluginError::MojoNotFound`].
    pub fn get_mojo_descriptor(
        &self,
        plugin: &PluginCoordinate,
        goal: &str,
        session: &Session,
    ) -> PluginResult<Arc<MojoDescriptor>> {
        let descriptor = self.load_plugin(plugin, session)?;
        manager::mojo_of(&descriptor, goal)
    }

    /// Build the extension realms of `project` and make their exports
    /// visible to the plugin realms set up for it afterwards.
    ///
    /// # Errors
    ///
    /// The first extension that cannot be resolved or set up.
    pub fn register_project_extensions(
        &self,
        session: &Session,
        project: &Arc<Project>,
    ) -> PluginResult<Vec<Arc<ExtensionRealmRecord>>> {
        let session = session.with_current_project(project.clone());
        let mut records = Vec::new();
        let mut imports = Vec::new();
        for declaration in project.build.plugins.iter().filter(|p| p.coordinate.extensions) {
            let record = self
                .manager
                .setup_extensions_realm(&declaration.coordinate, &session)?;
            imports.extend(PluginManager::extension_imports(&record));
            records.push(record);
        }
        tracing::debug!(
            project = %project.id(),
            extensions = records.len(),
            imports = imports.len(),
            "Registered project extensions"
        );
        self.extension_imports.insert(project.id(), imports);
        Ok(records)
    }

    /// The plugin bound to a realm for the session's current project.
    ///
    /// # Errors
    ///
    /// Resolution and realm errors.
    pub fn get_plugin_realm(
        &self,
        plugin: &PluginCoordinate,
        descriptor: Arc<PluginDescriptor>,
        session: &Session,
    ) -> PluginResult<Arc<RuntimePluginDescriptor>> {
        let imports = session
            .current_project()
            .and_then(|p| self.extension_imports.get(&p.id()).map(|i| i.value().clone()))
            .unwrap_or_default();
        self.manager
            .setup_plugin_realm(plugin, descriptor, session, None, &imports, None)
    }

    /// Run one execution for the session's current project.
    ///
    /// # Errors
    ///
    /// Any [`crate::PluginError`]; [`crate::PluginError::MojoFailure`] when the
    /// mojo reports an expected build failure.
    pub fn execute_mojo(&self, session: &Session, execution: &MojoExecution) -> PluginResult<()> {
        let descriptor = self.load_plugin(&execution.plugin, session)?;
        let mut execution = execution.clone();
        if execution.descriptor.is_none() {
            execution.finalize_configuration(manager::mojo_of(&descriptor, &execution.goal)?);
        }

        let plugin = self.get_plugin_realm(&execution.plugin, descriptor, session)?;
        let mojo = self.manager.get_configured_mojo(session, &execution, &plugin)?;
        invoke::invoke(
            &self.manager,
            session,
            &execution,
            &plugin,
            mojo,
            &self.listeners,
            Some(self.build_id),
        )
    }

    /// Finish the build: when configured, flush every cache and dispose the
    /// realms they held.
    pub fn end_build(&self) {
        self.extension_imports.clear();
        if !self.manager.options().flush_on_build_end {
            return;
        }
        let caches = self.manager.caches();
        let realms = caches.cached_realms();
        caches.flush_all();
        let mut disposed = 0usize;
        for realm in &realms {
            if self.manager.realms().dispose(realm.id()) {
                disposed = disposed.saturating_add(1);
            }
        }
        self.manager.realms().dispose_cached();
        tracing::debug!(build = %self.build_id, realms = disposed, "Flushed plugin caches");
    }
}
