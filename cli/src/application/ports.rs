//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and the shared platform
//! types — never from `crate::infra`, `crate::commands`, or `crate::output`.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};
use std::time::Duration;

use anyhow::Result;
use flotilla_common::{App, LaunchInput, LeaseGrant, Machine, MachineConfig, MachineEvent, MachineState};
use tokio_util::sync::CancellationToken;

use crate::domain::config::{AppConfig, FlotillaConfig};

// ── Value Types ───────────────────────────────────────────────────────────────

/// Server-side filter for machine listings.
#[derive(Debug, Clone, Default)]
pub struct MachineFilter {
    /// Only machines in this region.
    pub region: Option<String>,
    /// Include destroyed machines.
    pub include_deleted: bool,
    /// Only machines in this state (applied client-side by some backends).
    pub state: Option<MachineState>,
}

// ── Platform Ports ────────────────────────────────────────────────────────────

/// Machine CRUD, lease, and event-log operations of the remote platform,
/// scoped to a single app.
///
/// Implementations map platform failures onto
/// [`MachineError`](crate::domain::MachineError) variants (`NotFound`,
/// `LeaseConflict`, `Validation`, `Api`).
#[allow(async_fn_in_trait)]
pub trait MachinePlatform {
    /// Fetch a single machine.
    async fn get(&self, machine_id: &str) -> Result<Machine>;
    /// List the app's machines.
    async fn list(&self, filter: &MachineFilter) -> Result<Vec<Machine>>;
    /// Acquire an exclusive lease on a machine.
    async fn acquire_lease(&self, machine_id: &str, ttl: Duration) -> Result<LeaseGrant>;
    /// Release a lease held with `nonce`.
    async fn release_lease(&self, machine_id: &str, nonce: &str) -> Result<()>;
    /// Replace a machine's configuration; returns the new generation.
    async fn update(&self, machine_id: &str, config: &MachineConfig, nonce: &str)
    -> Result<Machine>;
    /// Create and start a new machine.
    async fn launch(&self, input: &LaunchInput) -> Result<Machine>;
    /// Ask a machine to stop, giving it `timeout` to exit gracefully.
    async fn stop(&self, machine_id: &str, nonce: Option<&str>, timeout: Duration) -> Result<()>;
    /// Fetch the machine's event log, oldest first.
    async fn events(&self, machine_id: &str) -> Result<Vec<MachineEvent>>;
}

/// App lookups.
#[allow(async_fn_in_trait)]
pub trait AppDirectory {
    /// Fetch the app, including its current release image.
    async fn app(&self, name: &str) -> Result<App>;
}

// ── Health Port ───────────────────────────────────────────────────────────────

/// Runs configured health checks against machines.
#[allow(async_fn_in_trait)]
pub trait HealthVerifier {
    /// Verify every machine; fails with
    /// [`MachineError::HealthCheckFailed`](crate::domain::MachineError) listing
    /// the failing checks, or `MachineError::Cancelled` once `cancel` fires.
    async fn verify(&self, machines: &[Machine], cancel: &CancellationToken) -> Result<()>;
}

// ── Remote Execution Port ─────────────────────────────────────────────────────

/// Transport for running commands inside a machine.
#[allow(async_fn_in_trait)]
pub trait RemoteShell {
    type Session;

    /// Establish a session with the machine.
    async fn open_session(&self, machine: &Machine) -> Result<Self::Session>;
    /// Run `command` in the session and return its exit code.
    async fn execute(
        &self,
        session: &Self::Session,
        command: &str,
        interactive: bool,
    ) -> Result<i32>;
}

/// Runs local processes.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output, killing it after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;
    /// Run a program attached to the caller's terminal and return its status.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    async fn run_status(&self, program: &str, args: &[&str]) -> Result<ExitStatus>;
}

// ── Interaction Ports ─────────────────────────────────────────────────────────

/// Lets the operator choose one entry from a list.
pub trait MachinePicker {
    /// Return the index of the chosen option.
    ///
    /// # Errors
    ///
    /// Returns an error if no choice could be obtained (e.g. no TTY).
    fn pick(&self, prompt: &str, options: &[String]) -> Result<usize>;
}

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait — no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}

// ── Config Ports ──────────────────────────────────────────────────────────────

/// Abstracts loading user and app configuration.
pub trait ConfigStore {
    /// Load the user config, returning defaults when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    fn load(&self) -> Result<FlotillaConfig>;
    /// Persist the user config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    fn save(&self, config: &FlotillaConfig) -> Result<()>;
    /// Resolved path of the user config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    fn path(&self) -> Result<PathBuf>;
    /// Load the app config at `path`, returning defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    fn load_app(&self, path: &Path) -> Result<AppConfig>;
}
