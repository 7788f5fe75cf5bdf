//! Integration tests for running goals through the build plugin manager.
//!
//! Covers configuration, listener callbacks, failure translation and the
//! guarantee that the mojo is released and per-thread state restored on
//! every exit path.

mod common;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anvil_core::{ConfigNode, ExecutionRequest, Value};
use anvil_plugin::{ContextRealm, LegacySupport, MojoDescriptor, MojoExecution, ParamType, Parameter, PluginError};
use anvil_test::prelude::*;
use common::{ECHO_CLASS, STAMP_CLASS, echo_plugin, harness, session};

#[test]
fn test_execute_configures_and_runs() {
    let (h, recording) = harness(&echo_plugin(), Behavior::Succeed);
    let session = test_session_with(
        ExecutionRequest::new("/work").with_user_property("echo.message", "hello"),
        vec![test_project("app")],
    );

    h.build
        .execute_mojo(&session, &MojoExecution::new(h.plugin.clone(), "echo"))
        .unwrap();

    let seen = recording.snapshot();
    assert_eq!(seen.executions, 1);
    assert_eq!(seen.disposed, 1);
    assert!(seen.log_received);
    assert_eq!(seen.fields.get("message"), Some(&Value::from("hello")));
    assert_eq!(
        seen.fields.get("outputDirectory"),
        Some(&Value::Path(PathBuf::from("/work/app/target/classes")))
    );
    assert!(seen.legacy_session);
    assert_eq!(seen.context_realm, seen.lookup_realm);
    assert!(seen.context_realm.unwrap().as_str().starts_with("plugin>"));
}

#[test]
fn test_explicit_configuration_wins_over_expression() {
    let (h, recording) = harness(&echo_plugin(), Behavior::Succeed);
    let execution = MojoExecution::new(h.plugin.clone(), "echo").with_configuration(
        ConfigNode::new("configuration").with_child(ConfigNode::leaf("message", "from-pom")),
    );

    h.build.execute_mojo(&session(), &execution).unwrap();
    assert_eq!(recording.field("message"), Some(Value::from("from-pom")));
}

#[test]
fn test_unresolved_optional_parameter_is_left_unset() {
    let (h, recording) = harness(&echo_plugin(), Behavior::Succeed);
    h.build
        .execute_mojo(&session(), &MojoExecution::new(h.plugin.clone(), "echo"))
        .unwrap();
    assert_eq!(recording.field("message"), None);
}

#[test]
fn test_missing_required_parameter_names_every_source() {
    let fixture = PluginFixture::new("org.example", "echo-plugin", "1.0").with_mojo(
        MojoDescriptor::new("echo", ECHO_CLASS).with_parameter(
            Parameter::new("message", ParamType::String)
                .with_expression("${echo.message}")
                .required(),
        ),
    );
    let (h, recording) = harness(&fixture, Behavior::Succeed);

    let err = h
        .build
        .execute_mojo(&session(), &MojoExecution::new(h.plugin.clone(), "echo"))
        .unwrap_err();
    assert!(matches!(err, PluginError::Configuration { .. }));
    let message = err.to_string();
    assert!(message.contains("'message'"));
    assert!(message.contains("echo:echo"));
    assert!(message.contains("<configuration><message>"));
    assert!(message.contains("-Decho.message=VALUE"));
    assert_eq!(recording.executions(), 0);
    assert_eq!(recording.disposed(), 1);
}

#[test]
fn test_goal_requiring_project_without_one() {
    let (h, recording) = harness(&echo_plugin(), Behavior::Succeed);
    let err = h
        .build
        .execute_mojo(&test_session(Vec::new()), &MojoExecution::new(h.plugin.clone(), "echo"))
        .unwrap_err();
    assert!(matches!(err, PluginError::Configuration { .. }));
    assert_eq!(recording.executions(), 0);
}

#[test]
fn test_mojo_failure_is_reported_as_build_failure() {
    let (h, recording) = harness(&echo_plugin(), Behavior::Fail);
    let err = h
        .build
        .execute_mojo(&session(), &MojoExecution::new(h.plugin.clone(), "echo"))
        .unwrap_err();

    assert!(err.is_mojo_failure());
    match err {
        PluginError::MojoFailure {
            project,
            long_message,
            ..
        } => {
            assert_eq!(project.as_deref(), Some("org.example.test:app:1.0"));
            assert!(long_message.is_some());
        },
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(recording.disposed(), 1);
}

#[test]
fn test_unexpected_errors_are_execution_errors() {
    for behavior in [Behavior::Error, Behavior::AttachTwice] {
        let (h, recording) = harness(&echo_plugin(), behavior);
        let err = h
            .build
            .execute_mojo(&session(), &MojoExecution::new(h.plugin.clone(), "echo"))
            .unwrap_err();
        assert!(matches!(err, PluginError::Execution { .. }), "{behavior:?}: {err}");
        assert_eq!(recording.disposed(), 1);
    }
}

#[test]
fn test_linkage_error_carries_both_realm_dumps() {
    let (h, _) = harness(&echo_plugin(), Behavior::Linkage);
    let err = h
        .build
        .execute_mojo(&session(), &MojoExecution::new(h.plugin.clone(), "echo"))
        .unwrap_err();

    assert!(err.is_container_failure());
    let diagnostics = err.diagnostics().unwrap();
    assert!(diagnostics.contains("plugin>org.example:echo-plugin:1.0"));
    assert!(diagnostics.contains("anvil.core"));
}

#[test]
fn test_dispose_failure_does_not_fail_the_goal() {
    let (h, recording) = harness(&echo_plugin(), Behavior::DisposeFails);
    h.build
        .execute_mojo(&session(), &MojoExecution::new(h.plugin.clone(), "echo"))
        .unwrap();
    assert_eq!(recording.disposed(), 1);
}

#[test]
fn test_thread_state_restored_after_error() {
    let (h, recording) = harness(&echo_plugin(), Behavior::Error);
    let outer = h.build.manager().realms().core_realm().clone();
    let _context = ContextRealm::enter(Some(outer.clone()));

    let result = h
        .build
        .execute_mojo(&session(), &MojoExecution::new(h.plugin.clone(), "echo"));
    assert!(result.is_err());

    assert!(Arc::ptr_eq(&ContextRealm::current().unwrap(), &outer));
    assert!(ContextRealm::lookup().is_none());
    assert!(LegacySupport::current().is_none());
    assert_eq!(recording.disposed(), 1);
}

#[test]
fn test_thread_state_restored_after_panic() {
    let (h, recording) = harness(&echo_plugin(), Behavior::Panic);
    let outer = h.build.manager().realms().core_realm().clone();
    let _lookup = ContextRealm::enter_lookup(Some(outer.clone()));
    let session = session();
    let execution = MojoExecution::new(h.plugin.clone(), "echo");

    let result = catch_unwind(AssertUnwindSafe(|| h.build.execute_mojo(&session, &execution)));
    assert!(result.is_err());

    assert!(ContextRealm::current().is_none());
    assert!(Arc::ptr_eq(&ContextRealm::lookup().unwrap(), &outer));
    assert!(LegacySupport::current().is_none());
    assert_eq!(recording.executions(), 1);
    assert_eq!(recording.disposed(), 1);
}

#[test]
fn test_listeners_see_success_and_failure() {
    let (h, _) = harness(&echo_plugin(), Behavior::Succeed);
    let listener = RecordingListener::new();
    h.build.add_listener(Arc::new(listener.clone()));

    h.build
        .execute_mojo(&session(), &MojoExecution::new(h.plugin.clone(), "echo"))
        .unwrap();
    assert_eq!(listener.events(), vec!["before:echo", "success:echo"]);

    let (h, _) = harness(&echo_plugin(), Behavior::Fail);
    let listener = RecordingListener::new();
    h.build.add_listener(Arc::new(listener.clone()));
    h.build
        .execute_mojo(&session(), &MojoExecution::new(h.plugin.clone(), "echo"))
        .unwrap_err();
    assert_eq!(listener.events(), vec!["before:echo", "failure:echo:true"]);
}

#[test]
fn test_listener_veto_skips_the_goal() {
    let (h, recording) = harness(&echo_plugin(), Behavior::Succeed);
    let listener = RecordingListener::rejecting();
    h.build.add_listener(Arc::new(listener.clone()));

    let err = h
        .build
        .execute_mojo(&session(), &MojoExecution::new(h.plugin.clone(), "echo"))
        .unwrap_err();
    assert!(err.to_string().contains("vetoed"));
    assert_eq!(listener.events(), vec!["before:echo", "failure:echo:true"]);
    assert_eq!(recording.executions(), 0);
    assert_eq!(recording.disposed(), 1);
}

#[test]
fn test_plugin_context_shared_per_plugin_and_project() {
    let fixture = echo_plugin().with_mojo(MojoDescriptor::new("stamp", STAMP_CLASS));
    let (h, _) = harness(&fixture, Behavior::Succeed);
    let first = TestMojo::register(&h.env.components, ECHO_CLASS, Behavior::Succeed, true);
    let second = TestMojo::register(&h.env.components, STAMP_CLASS, Behavior::Succeed, true);
    let session = test_session(vec![test_project("app"), test_project("lib")]);

    h.build
        .execute_mojo(&session, &MojoExecution::new(h.plugin.clone(), "echo"))
        .unwrap();
    h.build
        .execute_mojo(&session, &MojoExecution::new(h.plugin.clone(), "stamp"))
        .unwrap();

    let a = first.snapshot().plugin_context.unwrap();
    let b = second.snapshot().plugin_context.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.get("runs").map(|v| v.value().clone()), Some(Value::Int(2)));

    let lib = session.with_current_project(session.projects()[1].clone());
    h.build
        .execute_mojo(&lib, &MojoExecution::new(h.plugin.clone(), "echo"))
        .unwrap();
    let c = first.snapshot().plugin_context.unwrap();
    assert!(!Arc::ptr_eq(&a, &c));
}

#[test]
fn test_execution_from_project_declaration() {
    let (h, recording) = harness(&echo_plugin(), Behavior::Succeed);
    let mut declaration = anvil_core::PluginDeclaration::new(h.plugin.clone());
    declaration.configuration =
        Some(ConfigNode::new("configuration").with_child(ConfigNode::leaf("message", "plugin-level")));
    declaration.executions.push(anvil_core::PluginExecutionDeclaration {
        id: "greet".into(),
        phase: Some("validate".into()),
        goals: vec!["echo".into()],
        configuration: Some(
            ConfigNode::new("configuration").with_child(ConfigNode::leaf("message", "execution-level")),
        ),
        goal_configurations: Default::default(),
    });

    let execution = MojoExecution::from_project(&declaration, "echo", Some("greet"));
    assert_eq!(execution.execution_id(), "greet");
    assert_eq!(execution.lifecycle_phase.as_deref(), Some("validate"));

    h.build.execute_mojo(&session(), &execution).unwrap();
    assert_eq!(recording.field("message"), Some(Value::from("execution-level")));
}

#[test]
fn test_parallel_projects_share_one_realm() {
    let (h, recording) = harness(&echo_plugin(), Behavior::Succeed);
    let build = Arc::new(h.build);
    let session = test_session(vec![test_project("app"), test_project("lib"), test_project("web")]);
    let failures = Arc::new(AtomicUsize::new(0));

    let executor = build.executor().unwrap();
    let phase = executor.phase().unwrap();
    for project in session.projects() {
        let build = build.clone();
        let session = session.with_current_project(project.clone());
        let execution = MojoExecution::new(h.plugin.clone(), "echo");
        let failures = failures.clone();
        executor
            .execute(move || {
                if build.execute_mojo(&session, &execution).is_err() {
                    failures.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();
    }
    phase.close().unwrap();
    executor.close();

    assert_eq!(failures.load(Ordering::SeqCst), 0);
    assert_eq!(recording.executions(), 3);
    assert_eq!(recording.disposed(), 3);
    assert_eq!(build.manager().caches().cached_realms().len(), 1);
}
