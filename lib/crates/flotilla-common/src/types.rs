use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Metadata key carrying the process group a machine belongs to.
pub const METADATA_PROCESS_GROUP: &str = "process_group";

/// Process group reserved for release-command machines.
pub const RELEASE_COMMAND_GROUP: &str = "release_command";

/// Process group assigned to disposable command runners.
pub const EPHEMERAL_RUNNER_GROUP: &str = "ephemeral_runner";

/// Lifecycle state of a machine as reported by the platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    Created,
    Starting,
    Started,
    Stopping,
    Stopped,
    Destroying,
    Destroyed,
}

impl MachineState {
    pub const ALL: [MachineState; 7] = [
        MachineState::Created,
        MachineState::Starting,
        MachineState::Started,
        MachineState::Stopping,
        MachineState::Stopped,
        MachineState::Destroying,
        MachineState::Destroyed,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MachineState::Created => "created",
            MachineState::Starting => "starting",
            MachineState::Started => "started",
            MachineState::Stopping => "stopping",
            MachineState::Stopped => "stopped",
            MachineState::Destroying => "destroying",
            MachineState::Destroyed => "destroyed",
        }
    }

    /// `true` once the platform has begun tearing the machine down.
    #[must_use]
    pub const fn is_gone(self) -> bool {
        matches!(self, MachineState::Destroying | MachineState::Destroyed)
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a machine state.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown machine state '{0}'")]
pub struct UnknownState(pub String);

impl FromStr for MachineState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MachineState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

/// A remotely hosted machine.
///
/// `events` is the platform event log in chronological order (oldest first).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Machine {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub state: MachineState,
    #[serde(default)]
    pub region: String,
    /// Changes every time a new configuration generation is applied.
    #[serde(default)]
    pub instance_id: String,
    #[serde(default)]
    pub private_ip: String,
    #[serde(default)]
    pub config: MachineConfig,
    #[serde(default)]
    pub events: Vec<MachineEvent>,
    #[serde(default)]
    pub checks: Vec<CheckStatus>,
}

impl Machine {
    /// A machine known only by ID, e.g. after the platform stopped returning it.
    #[must_use]
    pub fn stub(id: impl Into<String>, state: MachineState) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            state,
            region: String::new(),
            instance_id: String::new(),
            private_ip: String::new(),
            config: MachineConfig::default(),
            events: Vec::new(),
            checks: Vec::new(),
        }
    }

    /// Whether this machine runs the app's release command.
    #[must_use]
    pub fn is_release_command(&self) -> bool {
        self.config.process_group() == Some(RELEASE_COMMAND_GROUP)
    }
}

/// Desired configuration of a machine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MachineConfig {
    #[serde(default)]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest: Option<MachineGuest>,
    #[serde(default)]
    pub init: MachineInit,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub restart: MachineRestart,
    /// Cron-style schedule (`hourly`, `daily`, ...). Scheduled machines idle between runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub checks: BTreeMap<String, MachineCheck>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub auto_destroy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsConfig>,
}

impl MachineConfig {
    #[must_use]
    pub fn process_group(&self) -> Option<&str> {
        self.metadata.get(METADATA_PROCESS_GROUP).map(String::as_str)
    }

    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.schedule.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Guest resources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MachineGuest {
    pub cpu_kind: String,
    pub cpus: u32,
    pub memory_mb: u32,
}

/// Init process overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MachineInit {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MachineRestart {
    #[serde(default)]
    pub policy: RestartPolicy,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    #[default]
    Always,
    OnFailure,
    No,
}

/// A health check definition attached to a machine config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MachineCheck {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DnsConfig {
    #[serde(default)]
    pub skip_registration: bool,
}

/// Latest reported result of a named health check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckStatus {
    pub name: String,
    /// `passing`, `warning` or `critical`.
    pub status: String,
    #[serde(default)]
    pub output: String,
}

impl CheckStatus {
    #[must_use]
    pub fn is_passing(&self) -> bool {
        self.status == "passing"
    }
}

/// One entry of a machine's event log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MachineEvent {
    /// Event type tag, e.g. `launch`, `start`, `exit`, `destroy`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub source: String,
    pub timestamp: DateTime<Utc>,
    /// Free-form payload; exit events carry `exit_event.exit_code`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<serde_json::Value>,
}

impl MachineEvent {
    #[must_use]
    pub fn is_exit(&self) -> bool {
        self.kind == "exit"
    }

    /// Exit code carried by an exit event, when the payload has a parseable one.
    #[must_use]
    pub fn exit_code(&self) -> Option<i64> {
        let code = self.request.as_ref()?.get("exit_event")?.get("exit_code")?;
        code.as_i64()
            .or_else(|| code.as_str().and_then(|s| s.trim().parse().ok()))
    }
}

/// Body of a launch request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LaunchInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub config: MachineConfig,
}

/// Lease granted by the platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaseGrant {
    pub nonce: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// An application as known to the platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub organization: String,
    /// Image reference of the most recent release, `None` before the first release.
    #[serde(default)]
    pub current_image: Option<String>,
}
