//! Domain layer — pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod command;
pub mod config;
pub mod error;
pub mod machine;

pub use command::{encode_command, quote};
pub use config::{AppConfig, FlotillaConfig};
pub use error::{CleanupAction, CleanupWarning, ConfigError, MachineError, RunError};
pub use machine::{ExitCause, exit_cause};
