//! JSON output helpers.
//!
//! Every `--json` code path prints exactly one pretty-printed document to
//! stdout. Failures use the error object from [`format_error`].

use std::path::Path;

use anyhow::{Context, Result};
use flotilla_common::{Machine, MachineEvent};
use serde_json::json;

use crate::application::services::machine_update::RollingUpdateReport;
use crate::domain::config::FlotillaConfig;
use crate::domain::{ConfigError, ExitCause, MachineError, RunError, exit_cause};

/// Renders domain types as JSON documents.
pub struct JsonRenderer;

impl JsonRenderer {
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_version(&self, version: &str) -> Result<()> {
        print_pretty(&json!({ "version": version }))
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_machines(&self, machines: &[Machine]) -> Result<()> {
        print_pretty(&serde_json::to_value(machines).context("cannot serialize machines")?)
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_machine_status(&self, machine: &Machine, events: &[MachineEvent]) -> Result<()> {
        let last_exit = events
            .iter()
            .any(MachineEvent::is_exit)
            .then(|| match exit_cause(events) {
                ExitCause::Destroyed => json!({ "destroyed": true }),
                ExitCause::Exited { code } => json!({ "exit_code": code }),
            });
        print_pretty(&json!({
            "machine": machine,
            "last_exit": last_exit,
        }))
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_update_report(&self, report: &RollingUpdateReport) -> Result<()> {
        print_pretty(&update_report_value(report))
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_config(&self, config: &FlotillaConfig, path: &Path) -> Result<()> {
        print_pretty(&json!({
            "path": path.display().to_string(),
            "config": config.redacted(),
        }))
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_config_path(&self, path: &Path) -> Result<()> {
        print_pretty(&json!({ "path": path.display().to_string() }))
    }
}

/// JSON shape of an update report.
#[must_use]
pub fn update_report_value(report: &RollingUpdateReport) -> serde_json::Value {
    let results: Vec<_> = report
        .results
        .iter()
        .map(|r| match &r.outcome {
            Ok(machine) => json!({
                "machine_id": r.machine_id,
                "ok": true,
                "state": machine.state,
            }),
            Err(err) => json!({
                "machine_id": r.machine_id,
                "ok": false,
                "error": format!("{err:#}"),
            }),
        })
        .collect();
    let cleanup: Vec<String> = report.cleanup.iter().map(ToString::to_string).collect();
    json!({
        "success": report.is_success(),
        "results": results,
        "cleanup_warnings": cleanup,
    })
}

fn print_pretty(value: &serde_json::Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("JSON serialization failed")?;
    println!("{text}");
    Ok(())
}

/// Format a JSON error object.
///
/// Output (pretty-printed):
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": "..."
/// }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(message: &str, code: &str) -> Result<String> {
    let obj = json!({
        "error": true,
        "message": message,
        "code": code,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}

/// Stable error code for the JSON error object.
#[must_use]
pub fn error_code(err: &anyhow::Error) -> &'static str {
    if let Some(e) = err.downcast_ref::<MachineError>() {
        return match e {
            MachineError::NotFound { .. } => "not_found",
            MachineError::LeaseConflict { .. } => "lease_conflict",
            MachineError::Validation { .. } => "validation",
            MachineError::Timeout { .. } => "timeout",
            MachineError::UnexpectedTermination { .. } => "unexpected_termination",
            MachineError::Cancelled { .. } => "cancelled",
            MachineError::HealthCheckFailed { .. } => "health_check_failed",
            MachineError::Api { .. } => "api_error",
        };
    }
    if err.downcast_ref::<RunError>().is_some() {
        return "run_error";
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return "config_error";
    }
    "error"
}
