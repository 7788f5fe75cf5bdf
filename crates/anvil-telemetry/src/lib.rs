//! Anvil Telemetry - logging and execution tracing for the Anvil build tool.
//!
//! This crate provides:
//! - Configurable logging setup with multiple formats and targets
//! - Per-mojo execution contexts carried as tracing spans
//!
//! # Example
//!
//! ```rust,no_run
//! use anvil_telemetry::{ExecutionContext, LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), anvil_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("anvil_plugin=trace");
//! setup_logging(&config)?;
//!
//! let ctx = ExecutionContext::new("org.anvil.plugins:anvil-compiler:3.1.0", "compile")
//!     .with_project("org.example:app:1.0");
//! let span = ctx.span();
//! let _guard = span.enter();
//! tracing::info!("Compiling");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod context;
mod error;
mod logging;

pub use context::{ExecutionContext, ExecutionGuard};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileLogConfig, FileRotation, LogConfig, LogFormat, LogTarget, setup_default_logging,
    setup_logging,
};
