//! `HealthVerifier` backed by the platform's reported check results.

use std::time::Duration;

use anyhow::Result;
use flotilla_common::Machine;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{HealthVerifier, MachinePlatform};
use crate::domain::MachineError;

/// Time every machine's checks get to report `passing`.
pub const DEFAULT_HEALTH_BUDGET: Duration = Duration::from_secs(120);

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Polls each machine until all configured checks pass.
pub struct PlatformHealthVerifier<'a, P> {
    platform: &'a P,
    budget: Duration,
}

impl<'a, P: MachinePlatform> PlatformHealthVerifier<'a, P> {
    #[must_use]
    pub fn new(platform: &'a P) -> Self {
        Self {
            platform,
            budget: DEFAULT_HEALTH_BUDGET,
        }
    }

    #[must_use]
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    async fn verify_one(&self, machine: &Machine, cancel: &CancellationToken) -> Result<()> {
        if machine.config.checks.is_empty() {
            return Ok(());
        }
        let deadline = Instant::now() + self.budget;
        let cancelled = || MachineError::Cancelled {
            id: machine.id.clone(),
        };
        loop {
            let current = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(cancelled().into()),
                current = self.platform.get(&machine.id) => current?,
            };
            let failures = failing_checks(&current);
            if failures.is_empty() {
                tracing::info!(machine_id = %machine.id, "health checks passing");
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(MachineError::HealthCheckFailed {
                    id: machine.id.clone(),
                    failures,
                }
                .into());
            }
            tracing::debug!(machine_id = %machine.id, ?failures, "waiting for health checks");
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(cancelled().into()),
                () = tokio::time::sleep(POLL_INTERVAL.min(deadline - now)) => {}
            }
        }
    }
}

/// Configured checks that are not currently passing, as `name: status (output)`.
#[must_use]
pub fn failing_checks(machine: &Machine) -> Vec<String> {
    machine
        .config
        .checks
        .keys()
        .filter_map(|name| {
            match machine.checks.iter().find(|c| &c.name == name) {
                Some(check) if check.is_passing() => None,
                Some(check) if check.output.is_empty() => Some(format!("{name}: {}", check.status)),
                Some(check) => Some(format!("{name}: {} ({})", check.status, check.output.trim())),
                None => Some(format!("{name}: no result reported")),
            }
        })
        .collect()
}

impl<P: MachinePlatform> HealthVerifier for PlatformHealthVerifier<'_, P> {
    async fn verify(&self, machines: &[Machine], cancel: &CancellationToken) -> Result<()> {
        for machine in machines {
            self.verify_one(machine, cancel).await?;
        }
        Ok(())
    }
}
