//! Application service — machine configuration updates.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! All I/O is routed through injected port traits.

use std::time::Duration;

use anyhow::{Context, Result};
use flotilla_common::{Machine, MachineConfig};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{HealthVerifier, MachinePlatform, ProgressReporter};
use crate::application::services::lease::{Lease, LeaseSet, lease_ttl};
use crate::application::services::wait::{PollPolicy, wait_for_state};
use crate::domain::machine::{ConfigDelta, post_update_state};
use crate::domain::{CleanupWarning, MachineError};

/// Default time a machine gets to settle after an update.
pub const DEFAULT_UPDATE_WAIT: Duration = Duration::from_secs(300);

pub struct UpdateOptions<'a> {
    pub wait_timeout: Duration,
    pub poll: PollPolicy,
    pub cancel: &'a CancellationToken,
}

impl<'a> UpdateOptions<'a> {
    #[must_use]
    pub fn new(cancel: &'a CancellationToken) -> Self {
        Self {
            wait_timeout: DEFAULT_UPDATE_WAIT,
            poll: PollPolicy::default(),
            cancel,
        }
    }
}

/// Push `config` to `machine` under `lease`, wait for it to settle and run
/// its health checks.
///
/// The settled state follows the schedule in `config`, the configuration
/// being pushed: a machine with a schedule settles in `stopped`, anything
/// else in `started`. A failed health check fails the update; the new
/// configuration is left in place.
///
/// # Errors
///
/// Returns an error if the lease does not cover `machine`, the platform
/// rejects the update, the wait fails, or health checks fail.
pub async fn update_machine(
    platform: &impl MachinePlatform,
    health: &impl HealthVerifier,
    reporter: &impl ProgressReporter,
    lease: &Lease,
    machine: &Machine,
    config: &MachineConfig,
    opts: &UpdateOptions<'_>,
) -> Result<Machine> {
    anyhow::ensure!(
        lease.machine_id() == machine.id,
        "lease on machine {} cannot authorize changes to machine {}",
        lease.machine_id(),
        machine.id
    );
    let id = machine.id.as_str();

    reporter.step(&format!("updating machine {id}..."));
    let pushed = platform
        .update(id, config, lease.nonce())
        .await
        .with_context(|| format!("failed to update machine {id}"))?;
    tracing::info!(machine_id = id, instance_id = %pushed.instance_id, "configuration pushed");

    let desired = post_update_state(config);
    reporter.step(&format!("waiting for machine {id} to reach {desired}..."));
    let settled = wait_for_state(
        platform,
        id,
        desired,
        opts.wait_timeout,
        opts.cancel,
        opts.poll,
    )
    .await?;

    reporter.step(&format!("checking health of machine {id}..."));
    if let Err(err) = health
        .verify(std::slice::from_ref(&settled), opts.cancel)
        .await
    {
        if matches!(
            err.downcast_ref::<MachineError>(),
            Some(MachineError::Cancelled { .. })
        ) {
            return Err(err);
        }
        return Err(err.context("failed to wait for health checks to pass"));
    }

    reporter.success(&format!("machine {id} updated successfully"));
    Ok(settled)
}

// ── Rolling update ────────────────────────────────────────────────────────────

/// Result of updating one machine inside a rolling update.
#[derive(Debug)]
pub struct MachineUpdateResult {
    pub machine_id: String,
    pub outcome: Result<Machine>,
}

/// Per-machine results in update order, plus cleanup problems.
#[derive(Debug, Default)]
pub struct RollingUpdateReport {
    pub results: Vec<MachineUpdateResult>,
    pub cleanup: Vec<CleanupWarning>,
}

impl RollingUpdateReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .filter(|r| r.outcome.is_ok())
            .map(|r| r.machine_id.as_str())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &anyhow::Error)> {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().err().map(|e| (r.machine_id.as_str(), e)))
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|r| r.outcome.is_ok())
    }
}

/// Update `machines` one at a time with `delta` applied to each machine's
/// current configuration.
///
/// All leases are taken up front and all are released at the end. One
/// machine failing does not stop the others; after cancellation the
/// remaining machines are recorded as cancelled without being touched.
///
/// # Errors
///
/// Fails without updating anything when any machine cannot be leased.
/// Per-machine failures are reported in the returned report.
pub async fn rolling_update(
    platform: &impl MachinePlatform,
    health: &impl HealthVerifier,
    reporter: &impl ProgressReporter,
    machines: &[Machine],
    delta: &ConfigDelta,
    opts: &UpdateOptions<'_>,
) -> Result<RollingUpdateReport> {
    let mut targets: Vec<&Machine> = Vec::with_capacity(machines.len());
    for m in machines {
        if !targets.iter().any(|t| t.id == m.id) {
            targets.push(m);
        }
    }
    let ids: Vec<String> = targets.iter().map(|m| m.id.clone()).collect();

    reporter.step(&format!("acquiring leases on {} machine(s)...", ids.len()));
    let leases = LeaseSet::acquire_all(
        platform,
        reporter,
        &ids,
        lease_ttl(ids.len(), opts.wait_timeout),
    )
    .await?;

    let mut report = RollingUpdateReport::default();
    for machine in targets {
        let outcome = if opts.cancel.is_cancelled() {
            Err(MachineError::Cancelled {
                id: machine.id.clone(),
            }
            .into())
        } else {
            match leases.get(&machine.id) {
                Some(lease) => {
                    let config = delta.apply(&machine.config);
                    update_machine(platform, health, reporter, lease, machine, &config, opts).await
                }
                None => Err(anyhow::anyhow!("no lease held for machine {}", machine.id)),
            }
        };
        if let Err(err) = &outcome {
            tracing::warn!(machine_id = %machine.id, error = %format!("{err:#}"), "machine update failed");
            reporter.warn(&format!("machine {} was not updated: {err:#}", machine.id));
        }
        report.results.push(MachineUpdateResult {
            machine_id: machine.id.clone(),
            outcome,
        });
    }

    report.cleanup = leases.release_all(platform).await;
    for warning in &report.cleanup {
        reporter.warn(&warning.to_string());
    }
    Ok(report)
}
