//! Application service — wait for a machine to reach a lifecycle state.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::time::Duration;

use anyhow::Result;
use flotilla_common::{Machine, MachineState};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::application::ports::MachinePlatform;
use crate::domain::MachineError;
use crate::domain::machine::{exit_cause, has_reached, is_unreachable};

/// Poll cadence: starts at `initial`, multiplies by `factor`, caps at `max`.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub factor: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(250),
            max: Duration::from_secs(2),
            factor: 2,
        }
    }
}

impl PollPolicy {
    /// Poll at a constant interval.
    #[must_use]
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial: interval,
            max: interval,
            factor: 1,
        }
    }

    fn next(&self, current: Duration) -> Duration {
        current.saturating_mul(self.factor).min(self.max)
    }
}

/// Poll `machine_id` until it reaches `desired`.
///
/// Returns the machine as last observed in the desired state. A machine
/// that is no longer listed counts as having reached `destroyed`.
///
/// # Errors
///
/// * [`MachineError::Timeout`] once `timeout` has elapsed, carrying the last
///   observed state.
/// * [`MachineError::UnexpectedTermination`] when the machine is destroyed
///   while waiting for a live state; the cause is taken from its event log.
/// * [`MachineError::Cancelled`] when `cancel` fires. Cancellation is
///   reported distinctly from a timeout.
/// * Any platform error from polling.
pub async fn wait_for_state(
    platform: &impl MachinePlatform,
    machine_id: &str,
    desired: MachineState,
    timeout: Duration,
    cancel: &CancellationToken,
    policy: PollPolicy,
) -> Result<Machine> {
    let started = Instant::now();
    let deadline = started + timeout;
    let mut interval = policy.initial;
    let mut last_observed = None;
    let cancelled = || MachineError::Cancelled {
        id: machine_id.to_string(),
    };
    let timed_out = |last_observed: Option<MachineState>| MachineError::Timeout {
        id: machine_id.to_string(),
        desired,
        last_observed,
        elapsed: Instant::now() - started,
    };

    loop {
        // A slow request must not carry the wait past its deadline.
        let polled = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(cancelled().into()),
            polled = platform.get(machine_id) => polled,
            () = tokio::time::sleep_until(deadline) => {
                return Err(timed_out(last_observed).into());
            }
        };
        let machine = match polled {
            Ok(machine) => machine,
            Err(err)
                if desired == MachineState::Destroyed
                    && matches!(
                        err.downcast_ref::<MachineError>(),
                        Some(MachineError::NotFound { .. })
                    ) =>
            {
                return Ok(Machine::stub(machine_id, MachineState::Destroyed));
            }
            Err(err) => return Err(err),
        };
        last_observed = Some(machine.state);
        tracing::debug!(
            machine_id,
            state = %machine.state,
            desired = %desired,
            "polled machine state"
        );

        if has_reached(machine.state, desired) {
            return Ok(machine);
        }
        if is_unreachable(machine.state, desired) {
            let events = match platform.events(machine_id).await {
                Ok(events) => events,
                Err(err) => {
                    tracing::warn!(machine_id, error = %err, "could not fetch machine events");
                    machine.events.clone()
                }
            };
            return Err(MachineError::UnexpectedTermination {
                id: machine_id.to_string(),
                desired,
                observed: machine.state,
                cause: exit_cause(&events),
            }
            .into());
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(timed_out(last_observed).into());
        }

        let pause = interval.min(deadline - now);
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(cancelled().into()),
            () = tokio::time::sleep(pause) => {}
        }
        interval = policy.next(interval);
    }
}
