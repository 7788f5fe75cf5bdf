//! Execution path for plugins built against the older API.
//!
//! Realms are looked up by composite key (plugin plus artifact set) as
//! children of the core realm with only the compatibility classes imported,
//! and unresolved expressions evaluate to their own text.

use std::sync::Arc;

use anvil_core::{PluginCoordinate, Session};

use crate::descriptor::RuntimePluginDescriptor;
use crate::error::{PluginError, PluginResult};
use crate::execution::{CompoundListener, MojoExecution};
use crate::expression::EvaluationMode;
use crate::invoke;
use crate::manager::{self, PluginManager};

/// Runs executions through composite-key realms and the legacy evaluator.
#[derive(Debug, Clone)]
pub struct LegacyPluginManager {
    manager: Arc<PluginManager>,
}

impl LegacyPluginManager {
    /// Wrap a plugin manager.
    #[must_use]
    pub fn new(manager: Arc<PluginManager>) -> Self {
        Self { manager }
    }

    /// The underlying plugin manager.
    #[must_use]
    pub fn manager(&self) -> &Arc<PluginManager> {
        &self.manager
    }

    /// Load the plugin and return it bound to its composite-key realm.
    ///
    /// # Errors
    ///
    /// Resolution, descriptor, prerequisite and realm errors.
    pub fn get_plugin_realm(
        &self,
        plugin: &PluginCoordinate,
        session: &Session,
    ) -> PluginResult<Arc<RuntimePluginDescriptor>> {
        let descriptor = self.manager.load_session_plugin(plugin, session)?;
        self.manager.check_prerequisites(&descriptor)?;
        let artifacts = self.manager.resolve_plugin_artifacts(plugin, None, session)?;
        let plugin_artifact = artifacts.first().cloned().ok_or_else(|| PluginError::Resolution {
            plugin: plugin.id(),
            message: "resolution returned no plugin artifact".into(),
        })?;
        let realm = self
            .manager
            .realms()
            .get_or_create_realm(plugin, &plugin_artifact, &artifacts)?;
        Ok(Arc::new(RuntimePluginDescriptor {
            raw: descriptor,
            plugin_artifact,
            artifacts: artifacts.as_ref().clone(),
            realm,
        }))
    }

    /// Run one execution for the session's current project.
    ///
    /// # Errors
    ///
    /// Any [`PluginError`].
    pub fn execute_mojo(&self, session: &Session, execution: &MojoExecution) -> PluginResult<()> {
        let plugin = self.get_plugin_realm(&execution.plugin, session)?;
        let mut execution = execution.clone();
        if execution.descriptor.is_none() {
            execution.finalize_configuration(manager::mojo_of(&plugin.raw, &execution.goal)?);
        }
        let mojo = self
            .manager
            .configure_mojo(session, &execution, &plugin, EvaluationMode::Legacy)?;
        invoke::invoke(
            &self.manager,
            session,
            &execution,
            &plugin,
            mojo,
            &CompoundListener::default(),
            None,
        )
    }
}
