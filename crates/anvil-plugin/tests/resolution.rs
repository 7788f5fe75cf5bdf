//! Integration tests for plugin loading, realm setup and caching.

mod common;

use std::fmt;
use std::sync::{Arc, Mutex};

use anvil_core::{Dependency, DependencyFilter, PluginDeclaration};
use anvil_plugin::{
    BuildPluginManager, ExtensionDescriptor, MojoExecution, PluginCaches, PluginError,
    PluginManagerOptions, UsageHook,
};
use anvil_test::prelude::*;
use common::{echo_plugin, harness, session};

#[test]
fn test_missing_plugin_is_not_found() {
    let env = TestEnvironment::new();
    let build = BuildPluginManager::new(Arc::new(env.manager()));
    let plugin = echo_plugin().coordinate();

    let err = build.load_plugin(&plugin, &session()).unwrap_err();
    assert!(matches!(err, PluginError::NotFound { .. }), "{err}");
    assert!(err.is_resolution_failure());
}

#[test]
fn test_broken_dependency_is_resolution_error() {
    let fixture = echo_plugin().with_dependency(Dependency::new("org.example", "broken", "1.0"));
    let (h, _) = harness(&fixture, Behavior::Succeed);
    h.env.resolver.fail("org.example", "broken", "1.0", "checksum mismatch");

    let err = h
        .build
        .execute_mojo(&session(), &MojoExecution::new(h.plugin.clone(), "echo"))
        .unwrap_err();
    assert!(matches!(err, PluginError::Resolution { .. }), "{err}");
    assert!(err.to_string().contains("checksum mismatch"));
}

#[test]
fn test_failures_are_cached() {
    let env = TestEnvironment::new();
    env.resolver.fail("org.example", "echo-plugin", "1.0", "repository offline");
    let build = BuildPluginManager::new(Arc::new(env.manager()));
    let plugin = echo_plugin().coordinate();

    let first = build.load_plugin(&plugin, &session()).unwrap_err();
    let second = build.load_plugin(&plugin, &session()).unwrap_err();
    assert_eq!(first.to_string(), second.to_string());
    assert_eq!(env.resolver.calls(), 1);
}

#[test]
fn test_descriptor_problems() {
    init_test_logging();
    let env = TestEnvironment::new();
    let manager = env.manager();

    let malformed = PluginFixture::new("org.example", "broken-plugin", "1.0")
        .with_raw_descriptor("group_id = [")
        .install(&env)
        .unwrap();
    let err = manager.load_plugin(&malformed, &test_repositories()).unwrap_err();
    assert!(matches!(err, PluginError::DescriptorParsing { .. }), "{err}");

    let mismatched = PluginFixture::new("org.example", "other-plugin", "1.0")
        .with_raw_descriptor(
            "group_id = \"org.example\"\nartifact_id = \"someone-else\"\nversion = \"2.0\"\n",
        )
        .install(&env)
        .unwrap();
    match manager.load_plugin(&mismatched, &test_repositories()).unwrap_err() {
        PluginError::InvalidDescriptor { problems, .. } => assert_eq!(problems.len(), 2),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_unknown_goal_lists_available_goals() {
    let (h, _) = harness(&echo_plugin(), Behavior::Succeed);
    let err = h
        .build
        .get_mojo_descriptor(&h.plugin, "shout", &session())
        .unwrap_err();
    match err {
        PluginError::MojoNotFound { goal, available, .. } => {
            assert_eq!(goal, "shout");
            assert_eq!(available, vec!["echo".to_string()]);
        },
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_runtime_prerequisite() {
    init_test_logging();
    let env = TestEnvironment::new();
    let plugin = echo_plugin().requiring_runtime(">=2.0").install(&env).unwrap();

    let old = BuildPluginManager::new(Arc::new(
        env.manager_with(PluginManagerOptions::default().with_runtime_version("1.4.0")),
    ));
    let err = old.load_plugin(&plugin, &session()).unwrap_err();
    match err {
        PluginError::Incompatible { required, actual, .. } => {
            assert_eq!(required, ">=2.0");
            assert_eq!(actual, "1.4.0");
        },
        other => panic!("unexpected error: {other}"),
    }

    let new = BuildPluginManager::new(Arc::new(
        env.manager_with(PluginManagerOptions::default().with_runtime_version("2.3.1")),
    ));
    assert!(new.load_plugin(&plugin, &session()).is_ok());
}

#[test]
fn test_repeated_executions_reuse_cached_work() {
    let (h, recording) = harness(&echo_plugin(), Behavior::Succeed);
    let session = session();
    let execution = MojoExecution::new(h.plugin.clone(), "echo");

    h.build.execute_mojo(&session, &execution).unwrap();
    let calls = h.env.resolver.calls();
    let realm = recording.snapshot().context_realm;

    h.build.execute_mojo(&session, &execution).unwrap();
    assert_eq!(h.env.resolver.calls(), calls);
    assert_eq!(recording.snapshot().context_realm, realm);
    assert_eq!(recording.executions(), 2);
}

#[test]
fn test_closure_excludes_host_artifacts() {
    let env = TestEnvironment::new();
    env.add_library("org.anvil", "anvil-api", "0.1.1", &["anvil.api.Mojo"], Vec::new());
    env.add_library("org.example", "helper", "1.0", &["org.example.Helper"], Vec::new());
    let plugin = echo_plugin()
        .with_dependency(Dependency::new("org.anvil", "anvil-api", "0.1.1"))
        .with_dependency(Dependency::new("org.example", "helper", "1.0"))
        .install(&env)
        .unwrap();
    let manager = env.manager();

    let artifacts = manager
        .resolve_plugin_artifacts(&plugin, None, &session())
        .unwrap();
    let keys: Vec<String> = artifacts.iter().map(|a| a.key()).collect();
    assert_eq!(keys, vec!["org.example:echo-plugin", "org.example:helper"]);
}

#[test]
fn test_dependency_overrides_change_the_realm() {
    let env = TestEnvironment::new();
    env.add_library("org.example", "helper", "1.0", &["org.example.Helper"], Vec::new());
    env.add_library("org.example", "helper", "2.0", &["org.example.Helper"], Vec::new());
    let fixture = echo_plugin().with_dependency(Dependency::new("org.example", "helper", "1.0"));
    let plain = fixture.install(&env).unwrap();
    let overridden = plain
        .clone()
        .with_dependency(Dependency::new("org.example", "helper", "2.0"));
    let manager = env.manager();
    let session = session();

    let descriptor = manager.load_plugin(&plain, session.repositories()).unwrap();
    let a = manager
        .setup_plugin_realm(&plain, descriptor.clone(), &session, None, &[], None)
        .unwrap();
    let again = manager
        .setup_plugin_realm(&plain, descriptor.clone(), &session, None, &[], None)
        .unwrap();
    let b = manager
        .setup_plugin_realm(&overridden, descriptor, &session, None, &[], None)
        .unwrap();

    assert!(Arc::ptr_eq(&a.realm, &again.realm));
    assert_ne!(a.realm.id(), b.realm.id());
    let helper = |r: &anvil_plugin::RuntimePluginDescriptor| {
        r.artifact_map()
            .get("org.example:helper")
            .map(|a| a.version.clone())
    };
    assert_eq!(helper(a.as_ref()).as_deref(), Some("1.0"));
    assert_eq!(helper(b.as_ref()).as_deref(), Some("2.0"));
}

#[test]
fn test_isolated_realm_ignores_parent_and_imports() {
    let env = TestEnvironment::new();
    let plugin = echo_plugin().isolated().install(&env).unwrap();
    let manager = env.manager();
    let session = session();
    let descriptor = manager.load_plugin(&plugin, session.repositories()).unwrap();
    let parent = manager.realms().core_realm().clone();

    let runtime = manager
        .setup_plugin_realm(&plugin, descriptor, &session, Some(&parent), &[], None)
        .unwrap();
    assert!(runtime.realm.parent().is_none());
}

#[test]
fn test_extension_exports_reach_plugin_realms() {
    init_test_logging();
    let env = TestEnvironment::new();
    let extension = PluginFixture::new("org.example", "shared-extension", "1.0")
        .with_class("org.shared.Codec")
        .with_extension(ExtensionDescriptor {
            exported_packages: vec!["org.shared.*".into()],
            exported_artifacts: vec!["org.example:shared-extension".into()],
        })
        .install(&env)
        .unwrap();
    let plugin = echo_plugin().install(&env).unwrap();
    TestMojo::register(&env.components, common::ECHO_CLASS, Behavior::Succeed, false);

    let project = Arc::new(
        test_project("app").with_plugin(PluginDeclaration::new(extension.with_extensions(true))),
    );
    let session = test_session(Vec::new()).with_current_project(project.clone());
    let build = BuildPluginManager::new(Arc::new(env.manager()));

    let records = build.register_project_extensions(&session, &project).unwrap();
    assert_eq!(records.len(), 1);
    let extension_realm = records[0].realm.id().clone();

    let descriptor = build.load_plugin(&plugin, &session).unwrap();
    let runtime = build.get_plugin_realm(&plugin, descriptor, &session).unwrap();
    let codec = runtime.realm.load_class("org.shared.Codec").unwrap();
    assert_eq!(codec.realm, extension_realm);

    let again = build.register_project_extensions(&session, &project).unwrap();
    assert!(Arc::ptr_eq(&records[0], &again[0]));
}

#[test]
fn test_end_build_flushes_and_disposes() {
    let (h, recording) = harness(&echo_plugin(), Behavior::Succeed);
    let session = session();
    let execution = MojoExecution::new(h.plugin.clone(), "echo");
    h.build.execute_mojo(&session, &execution).unwrap();

    let realm = recording.snapshot().context_realm.unwrap();
    let manager = h.build.manager().clone();
    assert!(manager.realms().world().contains(&realm));
    assert_eq!(manager.caches().cached_realms().len(), 1);

    h.build.end_build();
    assert!(!manager.realms().world().contains(&realm));
    assert!(manager.caches().cached_realms().is_empty());
    assert_eq!(manager.caches().descriptors.len(), 0);

    let calls = h.env.resolver.calls();
    h.build.execute_mojo(&session, &execution).unwrap();
    assert!(h.env.resolver.calls() > calls);
}

#[test]
fn test_end_build_can_keep_caches() {
    init_test_logging();
    let env = TestEnvironment::new();
    let plugin = echo_plugin().install(&env).unwrap();
    TestMojo::register(&env.components, common::ECHO_CLASS, Behavior::Succeed, false);
    let options = PluginManagerOptions {
        flush_on_build_end: false,
        ..PluginManagerOptions::default()
    };
    let build = BuildPluginManager::new(Arc::new(env.manager_with(options)));

    build
        .execute_mojo(&session(), &MojoExecution::new(plugin, "echo"))
        .unwrap();
    build.end_build();
    assert_eq!(build.manager().caches().cached_realms().len(), 1);
}

#[test]
fn test_concurrent_realm_setup_for_distinct_keys() {
    init_test_logging();
    let env = TestEnvironment::new();
    let plugin = echo_plugin().install(&env).unwrap();
    let manager = env.manager();
    let session = session();
    let descriptor = manager.load_plugin(&plugin, session.repositories()).unwrap();
    let filters: Vec<DependencyFilter> = (0..8)
        .map(|i| DependencyFilter::scopes([format!("scope-{i}")]))
        .collect();
    let setup = |filter: &DependencyFilter| {
        manager.setup_plugin_realm(&plugin, descriptor.clone(), &session, None, &[], Some(filter))
    };

    let outcomes: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = filters
            .iter()
            .map(|filter| scope.spawn(move || setup(filter)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let mut ids: Vec<_> = outcomes
        .into_iter()
        .map(|outcome| outcome.unwrap().realm.id().clone())
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), filters.len());
    assert_eq!(manager.caches().plugin_realms.len(), filters.len());
    for filter in &filters {
        assert!(setup(filter).is_ok());
    }
}

#[derive(Debug, Default)]
struct UsageLog(Mutex<Vec<(&'static str, Option<String>)>>);

impl UsageHook for UsageLog {
    fn register(&self, cache: &'static str, project: Option<&str>, _key: &dyn fmt::Debug) {
        self.0
            .lock()
            .unwrap()
            .push((cache, project.map(str::to_string)));
    }
}

#[test]
fn test_descriptor_lookups_report_the_project() {
    init_test_logging();
    let env = TestEnvironment::new();
    let plugin = echo_plugin().install(&env).unwrap();
    let usage = Arc::new(UsageLog::default());
    let manager = env
        .manager()
        .with_caches(Arc::new(PluginCaches::with_usage(usage.clone())));
    let build = BuildPluginManager::new(Arc::new(manager));
    let session = session();

    build.load_plugin(&plugin, &session).unwrap();
    build.get_mojo_descriptor(&plugin, "echo", &session).unwrap();

    let descriptor_uses: Vec<_> = usage
        .0
        .lock()
        .unwrap()
        .iter()
        .filter(|(cache, _)| *cache == "plugin-descriptor")
        .map(|(_, project)| project.clone())
        .collect();
    assert_eq!(descriptor_uses.len(), 2);
    assert!(
        descriptor_uses
            .iter()
            .all(|p| p.as_deref() == Some("org.example.test:app:1.0"))
    );
}
