//! Anvil Test - Shared test utilities for the Anvil build tool.
//!
//! This crate provides in-memory collaborators and fixtures for exercising
//! the plugin pipeline without a real repository or filesystem.
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! anvil-test.workspace = true
//! ```
//!
//! Then use in your tests:
//!
//! ```rust,ignore
//! use anvil_test::{PluginFixture, TestEnvironment};
//!
//! #[test]
//! fn test_runs_goal() {
//!     let env = TestEnvironment::new();
//!     let plugin = PluginFixture::new("org.example", "echo-plugin", "1.0")
//!         .with_mojo(MojoDescriptor::new("echo", "org.example.Echo"))
//!         .install(&env)
//!         .unwrap();
//!     // ...
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod contents;
pub mod fixtures;
pub mod mojos;
pub mod resolver;

pub use contents::*;
pub use fixtures::*;
pub use mojos::*;
pub use resolver::*;
