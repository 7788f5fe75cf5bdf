//! Running a configured mojo with per-thread state installed.

use std::sync::Arc;

use anvil_core::Session;
use anvil_telemetry::{ExecutionContext, ExecutionGuard};

use crate::descriptor::RuntimePluginDescriptor;
use crate::error::{PluginError, PluginResult};
use crate::execution::{MojoExecution, MojoExecutionEvent, MojoExecutionListener};
use crate::legacy::LegacySupport;
use crate::manager::PluginManager;
use crate::mojo::{Mojo, MojoContext, MojoError};
use crate::realm::ContextRealm;

/// Releases the mojo when dropped, including during unwinding.
struct ReleaseOnDrop<'a> {
    manager: &'a PluginManager,
    execution: &'a MojoExecution,
    mojo: Option<Box<dyn Mojo>>,
}

impl ReleaseOnDrop<'_> {
    fn mojo(&mut self) -> Option<&mut (dyn Mojo + 'static)> {
        self.mojo.as_deref_mut()
    }
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        if let Some(mojo) = self.mojo.take() {
            self.manager.release_mojo(mojo, self.execution);
        }
    }
}

/// Run `mojo` for `execution`.
///
/// For the duration of the call the plugin realm is the context and lookup
/// realm and the session is visible through [`LegacySupport`]. The mojo is
/// released first and the previous thread state restored afterwards, on
/// every exit path.
pub(crate) fn invoke(
    manager: &PluginManager,
    session: &Session,
    execution: &MojoExecution,
    plugin: &Arc<RuntimePluginDescriptor>,
    mojo: Box<dyn Mojo>,
    listener: &dyn MojoExecutionListener,
    build_id: Option<uuid::Uuid>,
) -> PluginResult<()> {
    let plugin_id = plugin.raw.id();
    let project = session.current_project();
    let project_id = project.map(|p| p.id());

    let mut context = ExecutionContext::new(&plugin_id, &execution.goal)
        .with_execution(execution.execution_id());
    if let Some(id) = &project_id {
        context = context.with_project(id);
    }
    if let Some(id) = build_id {
        context = context.with_build_id(id);
    }
    let label = context.label();
    let _span = ExecutionGuard::new(context);

    let _context_realm = ContextRealm::enter(Some(plugin.realm.clone()));
    let _lookup_realm = ContextRealm::enter_lookup(Some(plugin.realm.clone()));
    let _legacy = LegacySupport::enter(Some(session.clone()));
    let mut handle = ReleaseOnDrop {
        manager,
        execution,
        mojo: Some(mojo),
    };

    let event = MojoExecutionEvent {
        session,
        project,
        execution,
        error: None,
    };

    if let Err(e) = listener.before_execution(&event) {
        listener.after_failure(&MojoExecutionEvent {
            error: Some(&e),
            ..event
        });
        return Err(e);
    }

    tracing::info!(execution = %label, "Executing mojo");
    let mojo_context = MojoContext {
        session,
        project,
        execution,
        realm: &plugin.realm,
    };
    let outcome = match handle.mojo() {
        Some(mojo) => mojo
            .execute(&mojo_context)
            .map_err(|e| translate(e, manager, &plugin_id, execution, project_id.as_deref(), plugin)),
        None => Ok(()),
    };

    let outcome = outcome.and_then(|()| listener.after_success(&event));
    match outcome {
        Ok(()) => {
            tracing::info!(execution = %label, "Mojo succeeded");
            Ok(())
        },
        Err(e) => {
            tracing::info!(execution = %label, error = %e, "Mojo failed");
            listener.after_failure(&MojoExecutionEvent {
                error: Some(&e),
                ..event
            });
            Err(e)
        },
    }
}

fn translate(
    error: MojoError,
    manager: &PluginManager,
    plugin_id: &str,
    execution: &MojoExecution,
    project: Option<&str>,
    plugin: &RuntimePluginDescriptor,
) -> PluginError {
    let project = project.map(str::to_string);
    match error {
        MojoError::Failure {
            message,
            long_message,
        } => PluginError::MojoFailure {
            plugin: plugin_id.to_string(),
            goal: execution.goal.clone(),
            project,
            message,
            long_message,
        },
        MojoError::Execution { message } => PluginError::Execution {
            plugin: plugin_id.to_string(),
            goal: execution.goal.clone(),
            project,
            message,
        },
        e @ MojoError::DuplicateAttachment(_) => PluginError::Execution {
            plugin: plugin_id.to_string(),
            goal: execution.goal.clone(),
            project,
            message: e.to_string(),
        },
        e @ MojoError::Linkage { .. } => PluginError::Container {
            plugin: plugin_id.to_string(),
            goal: Some(execution.goal.clone()),
            message: e.to_string(),
            diagnostics: Some(format!(
                "{}\n{}",
                plugin.realm.dump(),
                manager.realms().core_realm().dump()
            )),
        },
        e @ MojoError::InvalidField { .. } => PluginError::Configuration {
            plugin: plugin_id.to_string(),
            goal: Some(execution.goal.clone()),
            message: e.to_string(),
            diagnostics: None,
        },
    }
}
