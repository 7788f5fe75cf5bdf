//! Shared setup for plugin manager integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use anvil_core::{PluginCoordinate, Session};
use anvil_plugin::{BuildPluginManager, MojoDescriptor, ParamType, Parameter};
use anvil_test::prelude::*;

pub const ECHO_CLASS: &str = "org.example.echo.EchoMojo";
pub const STAMP_CLASS: &str = "org.example.echo.StampMojo";

/// An `echo` goal with an optional `message` read from `${echo.message}`.
pub fn echo_mojo() -> MojoDescriptor {
    MojoDescriptor::new("echo", ECHO_CLASS)
        .with_parameter(Parameter::new("message", ParamType::String).with_expression("${echo.message}"))
        .with_parameter(
            Parameter::new("outputDirectory", ParamType::Path)
                .with_expression("${project.build.outputDirectory}"),
        )
}

pub fn echo_plugin() -> PluginFixture {
    PluginFixture::new("org.example", "echo-plugin", "1.0").with_mojo(echo_mojo())
}

pub struct Harness {
    pub env: TestEnvironment,
    pub plugin: PluginCoordinate,
    pub build: BuildPluginManager,
}

/// Install `fixture`, register `behavior` for the echo goal and build a
/// build-scoped manager.
pub fn harness(fixture: &PluginFixture, behavior: Behavior) -> (Harness, Recording) {
    init_test_logging();
    let env = TestEnvironment::new();
    let plugin = fixture.install(&env).unwrap();
    let recording = TestMojo::register(&env.components, ECHO_CLASS, behavior, false);
    let build = BuildPluginManager::new(Arc::new(env.manager()));
    (Harness { env, plugin, build }, recording)
}

pub fn session() -> Session {
    test_session(vec![test_project("app")])
}

