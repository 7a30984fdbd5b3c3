//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use flotilla_common::MachineState;
use thiserror::Error;

use crate::domain::machine::ExitCause;

// ── Machine errors ────────────────────────────────────────────────────────────

/// Failures of machine lifecycle operations.
///
/// Callers classify an `anyhow::Error` with `downcast_ref::<MachineError>()`.
#[derive(Debug, Error)]
pub enum MachineError {
    #[error("machine {id} not found")]
    NotFound { id: String },

    #[error("machine {id} is leased by another holder")]
    LeaseConflict { id: String },

    /// Configuration rejected by the platform; `message` is shown verbatim.
    #[error("{message}")]
    Validation { message: String },

    #[error(
        "timed out after {}s waiting for machine {id} to reach {desired} (last observed: {})",
        elapsed.as_secs(),
        last_observed.map_or("unknown", MachineState::as_str)
    )]
    Timeout {
        id: String,
        desired: MachineState,
        /// `None` when no poll answered before the deadline.
        last_observed: Option<MachineState>,
        elapsed: std::time::Duration,
    },

    #[error("machine {id} {cause} (state: {observed}, waiting for {desired})")]
    UnexpectedTermination {
        id: String,
        desired: MachineState,
        observed: MachineState,
        cause: ExitCause,
    },

    #[error("cancelled while waiting for machine {id}")]
    Cancelled { id: String },

    #[error("health checks failed for machine {id}:\n  {}", failures.join("\n  "))]
    HealthCheckFailed { id: String, failures: Vec<String> },

    #[error("platform API returned {status}: {message}")]
    Api { status: u16, message: String },
}

impl MachineError {
    /// Exit code reported by an unexpectedly terminated machine, if known.
    #[must_use]
    pub fn exit_code(&self) -> Option<i64> {
        match self {
            MachineError::UnexpectedTermination {
                cause: ExitCause::Exited { code },
                ..
            } => *code,
            _ => None,
        }
    }
}

/// Cleanup that failed after the primary outcome was already decided.
///
/// Reported to the operator, never returned as an `Err`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{action} failed for machine {machine_id}: {reason}")]
pub struct CleanupWarning {
    pub machine_id: String,
    pub action: CleanupAction,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupAction {
    ReleaseLease,
    Stop,
    AwaitDestroy,
}

impl std::fmt::Display for CleanupAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CleanupAction::ReleaseLease => "lease release",
            CleanupAction::Stop => "stop",
            CleanupAction::AwaitDestroy => "waiting for destruction",
        })
    }
}

// ── Run errors ────────────────────────────────────────────────────────────────

/// Errors raised while choosing the machine a command runs on.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("machine {0} is not started")]
    NotStarted(String),

    #[error("machine {0} is a release command machine")]
    ReleaseCommandMachine(String),

    #[error("no machines are available")]
    NoMachinesAvailable,

    #[error("can't create an ephemeral runner machine since the app has not yet been released")]
    NotReleased,

    #[error("no command given")]
    EmptyCommand,
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to configuration validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid machine ID: {0}")]
    InvalidMachineId(String),

    #[error("Invalid env assignment '{0}': expected KEY=VALUE")]
    InvalidEnv(String),

    #[error("No app selected. Pass --app or set defaults.app in {path}")]
    NoApp { path: String },

    #[error("No API token. Set FLOTILLA_API_TOKEN or api.token in {path}")]
    NoToken { path: String },

    #[error(
        "Unknown setting: {0} (valid settings: {valid})",
        valid = crate::domain::config::SETTABLE_KEYS.join(", ")
    )]
    UnknownKey(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_termination_with_code_mentions_code() {
        let err = MachineError::UnexpectedTermination {
            id: "m1".into(),
            desired: MachineState::Started,
            observed: MachineState::Destroyed,
            cause: ExitCause::Exited { code: Some(137) },
        };
        assert!(
            err.to_string()
                .contains("machine m1 exited unexpectedly with code 137")
        );
        assert_eq!(err.exit_code(), Some(137));
    }

    #[test]
    fn timeout_reports_last_observed_state() {
        let err = MachineError::Timeout {
            id: "m1".into(),
            desired: MachineState::Started,
            last_observed: Some(MachineState::Starting),
            elapsed: std::time::Duration::from_secs(15),
        };
        let msg = err.to_string();
        assert!(msg.contains("timed out after 15s"), "got: {msg}");
        assert!(msg.contains("last observed: starting"), "got: {msg}");
    }

    #[test]
    fn validation_message_is_verbatim() {
        let err = MachineError::Validation {
            message: "invalid image reference".into(),
        };
        assert_eq!(err.to_string(), "invalid image reference");
    }

    #[test]
    fn cleanup_warning_names_action_and_machine() {
        let warning = CleanupWarning {
            machine_id: "m9".into(),
            action: CleanupAction::Stop,
            reason: "deadline elapsed".into(),
        };
        assert_eq!(
            warning.to_string(),
            "stop failed for machine m9: deadline elapsed"
        );
    }

    #[test]
    fn unknown_key_lists_valid_settings() {
        let msg = ConfigError::UnknownKey("colour".into()).to_string();
        assert!(
            msg.starts_with("Unknown setting: colour (valid settings: "),
            "got: {msg}"
        );
        for key in crate::domain::config::SETTABLE_KEYS {
            assert!(msg.contains(key), "missing {key} in: {msg}");
        }
    }
}
