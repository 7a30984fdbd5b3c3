//! Application service — scoped machine leases.
//!
//! A [`Lease`] proves exclusive mutation rights over one machine. Every
//! acquired lease is released exactly once when its scope ends, whatever
//! the scope's outcome. Release failures are reported as cleanup warnings
//! and never replace the scope's own result.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::FutureExt;

use crate::application::ports::{MachinePlatform, ProgressReporter};
use crate::domain::{CleanupAction, CleanupWarning};

/// Upper bound for a single release request. Runs on its own clock so an
/// expired or cancelled operation deadline cannot skip the release.
pub const RELEASE_TIMEOUT: Duration = Duration::from_secs(5);

/// Lease TTL covering `machines` sequential waits of `per_machine` each,
/// plus a minute of slack for the update requests themselves.
#[must_use]
pub fn lease_ttl(machines: usize, per_machine: Duration) -> Duration {
    let count = u32::try_from(machines.max(1)).unwrap_or(u32::MAX);
    per_machine
        .saturating_mul(count)
        .saturating_add(Duration::from_secs(60))
}

/// An exclusive lease held on one machine.
///
/// Not `Clone`: the nonce belongs to exactly one machine and one holder.
#[derive(Debug)]
pub struct Lease {
    machine_id: String,
    nonce: String,
    owner: String,
    released: bool,
}

impl Lease {
    #[must_use]
    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    #[must_use]
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(
                machine_id = %self.machine_id,
                "lease dropped without release; it stays held until the platform expires it"
            );
        }
    }
}

/// Acquire a lease on `machine_id`.
///
/// # Errors
///
/// Propagates platform errors; a machine leased by someone else surfaces
/// as [`MachineError::LeaseConflict`](crate::domain::MachineError).
pub async fn acquire(
    platform: &impl MachinePlatform,
    machine_id: &str,
    ttl: Duration,
) -> Result<Lease> {
    let grant = platform
        .acquire_lease(machine_id, ttl)
        .await
        .with_context(|| format!("failed to obtain lease on machine {machine_id}"))?;
    tracing::debug!(machine_id, owner = %grant.owner, "lease acquired");
    Ok(Lease {
        machine_id: machine_id.to_string(),
        nonce: grant.nonce,
        owner: grant.owner,
        released: false,
    })
}

/// Release `lease`, consuming it. Returns a warning instead of failing.
pub async fn release(platform: &impl MachinePlatform, mut lease: Lease) -> Option<CleanupWarning> {
    let outcome = tokio::time::timeout(
        RELEASE_TIMEOUT,
        platform.release_lease(&lease.machine_id, &lease.nonce),
    )
    .await;
    lease.released = true;

    let reason = match outcome {
        Ok(Ok(())) => {
            tracing::debug!(machine_id = %lease.machine_id, "lease released");
            return None;
        }
        Ok(Err(err)) => format!("{err:#}"),
        Err(_) => format!("no response within {}s", RELEASE_TIMEOUT.as_secs()),
    };
    tracing::warn!(machine_id = %lease.machine_id, %reason, "failed to release lease");
    Some(CleanupWarning {
        machine_id: lease.machine_id.clone(),
        action: CleanupAction::ReleaseLease,
        reason,
    })
}

/// Run `body` while holding a lease on `machine_id`.
///
/// The lease is released after `body` completes, on success and failure
/// alike. `body`'s result is returned unchanged. A panic in `body` is
/// resumed after the release.
///
/// # Errors
///
/// Returns the acquisition error, or `body`'s error.
pub async fn with_lease<T>(
    platform: &impl MachinePlatform,
    reporter: &impl ProgressReporter,
    machine_id: &str,
    ttl: Duration,
    body: impl AsyncFnOnce(&Lease) -> Result<T>,
) -> Result<T> {
    let lease = acquire(platform, machine_id, ttl).await?;
    let result = AssertUnwindSafe(body(&lease)).catch_unwind().await;
    if let Some(warning) = release(platform, lease).await {
        reporter.warn(&warning.to_string());
    }
    match result {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

// ── LeaseSet ──────────────────────────────────────────────────────────────────

/// Leases over several machines, acquired all-or-nothing.
#[derive(Debug, Default)]
pub struct LeaseSet {
    leases: Vec<Lease>,
}

impl LeaseSet {
    /// Acquire a lease on every machine in order.
    ///
    /// # Errors
    ///
    /// Fails on the first machine that cannot be leased, after releasing
    /// the leases already taken.
    pub async fn acquire_all(
        platform: &impl MachinePlatform,
        reporter: &impl ProgressReporter,
        machine_ids: &[String],
        ttl: Duration,
    ) -> Result<Self> {
        let mut set = Self::default();
        for id in machine_ids {
            match acquire(platform, id, ttl).await {
                Ok(lease) => set.leases.push(lease),
                Err(err) => {
                    for warning in set.release_all(platform).await {
                        reporter.warn(&warning.to_string());
                    }
                    return Err(err);
                }
            }
        }
        Ok(set)
    }

    #[must_use]
    pub fn get(&self, machine_id: &str) -> Option<&Lease> {
        self.leases.iter().find(|l| l.machine_id == machine_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.leases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }

    /// Release every lease, attempting all of them even when some fail.
    pub async fn release_all(self, platform: &impl MachinePlatform) -> Vec<CleanupWarning> {
        let mut warnings = Vec::new();
        for lease in self.leases {
            warnings.extend(release(platform, lease).await);
        }
        warnings
    }
}
