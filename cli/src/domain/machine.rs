//! Machine lifecycle rules and event-log interpretation.
//!
//! This module is intentionally free of I/O, async, and external layer imports.
//! All functions take data in and return data out.

use std::fmt;
use std::sync::LazyLock;

use anyhow::Result;
use flotilla_common::{
    DEFAULT_EPHEMERAL_PRESET, DnsConfig, EPHEMERAL_RUNNER_GROUP, METADATA_PROCESS_GROUP, Machine,
    MachineConfig, MachineEvent, MachineGuest, MachineInit, MachineRestart, MachineState,
    RestartPolicy, guest_preset,
};
use regex::Regex;

use crate::domain::config::AppConfig;
use crate::domain::error::ConfigError;

#[allow(clippy::expect_used)] // Pattern is a compile-time constant
static MACHINE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[0-9a-z]{8,32}$").expect("valid machine id pattern"));

/// Why a machine stopped existing while something was waiting on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCause {
    /// No exit event was recorded.
    Destroyed,
    /// An exit event was recorded; `code` is `None` when it carried no parseable code.
    Exited { code: Option<i64> },
}

impl fmt::Display for ExitCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitCause::Destroyed => f.write_str("was destroyed unexpectedly"),
            ExitCause::Exited { code: None } => f.write_str("exited unexpectedly"),
            ExitCause::Exited { code: Some(code) } => {
                write!(f, "exited unexpectedly with code {code}")
            }
        }
    }
}

/// Derive the exit cause from an event log ordered oldest first.
///
/// The most recent `exit` event wins. An exit event without a request
/// payload counts as no exit event at all.
#[must_use]
pub fn exit_cause(events: &[MachineEvent]) -> ExitCause {
    let Some(exit) = events.iter().rev().find(|e| e.is_exit()) else {
        return ExitCause::Destroyed;
    };
    if exit.request.is_none() {
        return ExitCause::Destroyed;
    }
    ExitCause::Exited {
        code: exit.exit_code(),
    }
}

/// Whether `observed` counts as having reached `desired`.
///
/// A scheduled machine is idle as soon as it starts stopping, so `Stopped`
/// is also satisfied by `Stopping`.
#[must_use]
pub fn has_reached(observed: MachineState, desired: MachineState) -> bool {
    match desired {
        MachineState::Stopped => {
            matches!(observed, MachineState::Stopping | MachineState::Stopped)
        }
        _ => observed == desired,
    }
}

/// Whether `observed` rules out ever reaching `desired`.
#[must_use]
pub fn is_unreachable(observed: MachineState, desired: MachineState) -> bool {
    !desired.is_gone() && observed.is_gone()
}

/// State a machine is expected to settle in after a configuration push.
#[must_use]
pub fn post_update_state(config: &MachineConfig) -> MachineState {
    if config.is_scheduled() {
        MachineState::Stopped
    } else {
        MachineState::Started
    }
}

/// Whether a command may be run on an existing machine.
#[must_use]
pub fn is_runnable(machine: &Machine) -> bool {
    machine.state == MachineState::Started && !machine.is_release_command()
}

/// Human label for a machine in the interactive picker.
#[must_use]
pub fn picker_label(machine: &Machine) -> String {
    format!(
        "{}: {} {} {}",
        machine.region, machine.id, machine.private_ip, machine.name
    )
    .trim_end()
    .to_string()
}

/// Changes requested for every machine of a rolling update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDelta {
    pub image: Option<String>,
    pub guest: Option<MachineGuest>,
    pub env: Vec<(String, String)>,
    /// `Some("")` clears the schedule.
    pub schedule: Option<String>,
}

impl ConfigDelta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.image.is_none() && self.guest.is_none() && self.env.is_empty() && self.schedule.is_none()
    }

    /// Apply the delta on top of a machine's current configuration.
    #[must_use]
    pub fn apply(&self, current: &MachineConfig) -> MachineConfig {
        let mut config = current.clone();
        if let Some(image) = &self.image {
            config.image.clone_from(image);
        }
        if let Some(guest) = &self.guest {
            config.guest = Some(guest.clone());
        }
        for (key, value) in &self.env {
            config.env.insert(key.clone(), value.clone());
        }
        match self.schedule.as_deref() {
            Some("") => config.schedule = None,
            Some(schedule) => config.schedule = Some(schedule.to_string()),
            None => {}
        }
        config
    }
}

/// Configuration of a disposable machine that idles until a command is run in it.
#[must_use]
pub fn ephemeral_runner_config(app: &AppConfig, image: &str) -> MachineConfig {
    let mut env = app.env.clone();
    if let Some(region) = &app.primary_region {
        env.insert("PRIMARY_REGION".to_string(), region.clone());
    }
    MachineConfig {
        image: image.to_string(),
        guest: guest_preset(DEFAULT_EPHEMERAL_PRESET),
        init: MachineInit {
            cmd: vec!["sleep".to_string(), "inf".to_string()],
            entrypoint: Vec::new(),
        },
        env,
        restart: MachineRestart {
            policy: RestartPolicy::No,
        },
        schedule: None,
        checks: std::collections::BTreeMap::new(),
        metadata: std::collections::BTreeMap::from([(
            METADATA_PROCESS_GROUP.to_string(),
            EPHEMERAL_RUNNER_GROUP.to_string(),
        )]),
        auto_destroy: true,
        dns: Some(DnsConfig {
            skip_registration: true,
        }),
    }
}

/// Validates machine ID format: 8–32 lowercase alphanumerics.
///
/// # Errors
///
/// Returns an error if the ID doesn't match the expected format.
pub fn validate_machine_id(id: &str) -> Result<()> {
    if !MACHINE_ID.is_match(id) {
        return Err(ConfigError::InvalidMachineId(id.to_string()).into());
    }
    Ok(())
}

/// Parse `KEY=VALUE` env assignments.
///
/// # Errors
///
/// Returns an error for an assignment without `=` or with an empty key.
pub fn parse_env_assignments(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|item| match item.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => Err(ConfigError::InvalidEnv(item.clone()).into()),
        })
        .collect()
}
