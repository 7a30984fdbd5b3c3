//! Shared test helpers for machine service tests.
//!
//! `FakePlatform` serves scripted state sequences, tracks lease holders and
//! records every call so tests can assert on release counts and ordering.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use flotilla_common::{
    LaunchInput, LeaseGrant, Machine, MachineConfig, MachineEvent, MachineState,
};

use crate::application::ports::{
    HealthVerifier, MachineFilter, MachinePicker, MachinePlatform, ProgressReporter, RemoteShell,
};
use crate::domain::MachineError;

pub const EPHEMERAL_ID: &str = "e7840d1a2b3c4d";

pub fn machine(id: &str, state: MachineState) -> Machine {
    let mut m = Machine::stub(id, state);
    m.name = format!("{id}-name");
    m.region = "ams".to_string();
    m.private_ip = "fdaa::3".to_string();
    m.instance_id = "01H0".to_string();
    m
}

pub fn exit_event(code: i64) -> MachineEvent {
    MachineEvent {
        kind: "exit".to_string(),
        status: "stopped".to_string(),
        source: "flyd".to_string(),
        timestamp: Utc::now(),
        request: Some(serde_json::json!({ "exit_event": { "exit_code": code } })),
    }
}

// ── FakePlatform ──────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakePlatform {
    machines: Mutex<BTreeMap<String, Machine>>,
    scripts: Mutex<HashMap<String, VecDeque<MachineState>>>,
    holders: Mutex<HashMap<String, String>>,
    events: Mutex<HashMap<String, Vec<MachineEvent>>>,
    calls: Mutex<Vec<String>>,
    nonce_seq: Mutex<u32>,
    foreign_leases: HashSet<String>,
    failing_updates: HashSet<String>,
    failing_releases: HashSet<String>,
    failing_stops: HashSet<String>,
    purged_on_destroy: HashSet<String>,
    /// States served to the ephemeral machine after launch.
    launch_script: Vec<MachineState>,
    get_delay: Option<Duration>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_machine(self, machine: Machine) -> Self {
        self.machines
            .lock()
            .unwrap()
            .insert(machine.id.clone(), machine);
        self
    }

    /// Successive `get` calls return these states; the last one repeats.
    pub fn script(self, id: &str, states: &[MachineState]) -> Self {
        self.set_script(id, states);
        self
    }

    pub fn set_script(&self, id: &str, states: &[MachineState]) {
        self.scripts
            .lock()
            .unwrap()
            .insert(id.to_string(), states.iter().copied().collect());
    }

    pub fn with_events(self, id: &str, events: Vec<MachineEvent>) -> Self {
        self.events.lock().unwrap().insert(id.to_string(), events);
        self
    }

    pub fn leased_elsewhere(mut self, id: &str) -> Self {
        self.foreign_leases.insert(id.to_string());
        self
    }

    pub fn failing_update(mut self, id: &str) -> Self {
        self.failing_updates.insert(id.to_string());
        self
    }

    pub fn failing_release(mut self, id: &str) -> Self {
        self.failing_releases.insert(id.to_string());
        self
    }

    pub fn failing_stop(mut self, id: &str) -> Self {
        self.failing_stops.insert(id.to_string());
        self
    }

    /// Once scripted to `destroyed`, the machine disappears and `get` returns NotFound.
    pub fn purges_destroyed(mut self, id: &str) -> Self {
        self.purged_on_destroy.insert(id.to_string());
        self
    }

    pub fn on_launch(mut self, states: &[MachineState]) -> Self {
        self.launch_script = states.to_vec();
        self
    }

    /// Every `get` takes this long to answer.
    pub fn slow_get(mut self, delay: Duration) -> Self {
        self.get_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn held_leases(&self) -> usize {
        self.holders.lock().unwrap().len()
    }

    pub fn config_of(&self, id: &str) -> Option<MachineConfig> {
        self.machines
            .lock()
            .unwrap()
            .get(id)
            .map(|m| m.config.clone())
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl MachinePlatform for FakePlatform {
    async fn get(&self, machine_id: &str) -> Result<Machine> {
        self.record(format!("get:{machine_id}"));
        if let Some(delay) = self.get_delay {
            tokio::time::sleep(delay).await;
        }
        let mut machines = self.machines.lock().unwrap();
        let Some(machine) = machines.get_mut(machine_id) else {
            return Err(MachineError::NotFound {
                id: machine_id.to_string(),
            }
            .into());
        };
        if let Some(script) = self.scripts.lock().unwrap().get_mut(machine_id) {
            let next = if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().copied()
            };
            if let Some(state) = next {
                machine.state = state;
            }
        }
        if machine.state == MachineState::Destroyed
            && self.purged_on_destroy.contains(machine_id)
        {
            machines.remove(machine_id);
            return Err(MachineError::NotFound {
                id: machine_id.to_string(),
            }
            .into());
        }
        Ok(machine.clone())
    }

    async fn list(&self, filter: &MachineFilter) -> Result<Vec<Machine>> {
        self.record("list".to_string());
        Ok(self
            .machines
            .lock()
            .unwrap()
            .values()
            .filter(|m| filter.state.is_none_or(|s| m.state == s))
            .cloned()
            .collect())
    }

    async fn acquire_lease(&self, machine_id: &str, _ttl: Duration) -> Result<LeaseGrant> {
        self.record(format!("acquire:{machine_id}"));
        if !self.machines.lock().unwrap().contains_key(machine_id) {
            return Err(MachineError::NotFound {
                id: machine_id.to_string(),
            }
            .into());
        }
        let mut holders = self.holders.lock().unwrap();
        if self.foreign_leases.contains(machine_id) || holders.contains_key(machine_id) {
            return Err(MachineError::LeaseConflict {
                id: machine_id.to_string(),
            }
            .into());
        }
        let mut seq = self.nonce_seq.lock().unwrap();
        *seq += 1;
        let nonce = format!("nonce-{}", *seq);
        holders.insert(machine_id.to_string(), nonce.clone());
        Ok(LeaseGrant {
            nonce,
            owner: "tests@example.com".to_string(),
            expires_at: None,
        })
    }

    async fn release_lease(&self, machine_id: &str, nonce: &str) -> Result<()> {
        self.record(format!("release:{machine_id}"));
        if self.failing_releases.contains(machine_id) {
            anyhow::bail!("connection reset by peer");
        }
        let mut holders = self.holders.lock().unwrap();
        if holders.get(machine_id).map(String::as_str) == Some(nonce) {
            holders.remove(machine_id);
        }
        Ok(())
    }

    async fn update(
        &self,
        machine_id: &str,
        config: &MachineConfig,
        nonce: &str,
    ) -> Result<Machine> {
        self.record(format!("update:{machine_id}"));
        if self.holders.lock().unwrap().get(machine_id).map(String::as_str) != Some(nonce) {
            return Err(MachineError::LeaseConflict {
                id: machine_id.to_string(),
            }
            .into());
        }
        if self.failing_updates.contains(machine_id) {
            return Err(MachineError::Validation {
                message: "invalid image reference".to_string(),
            }
            .into());
        }
        let mut machines = self.machines.lock().unwrap();
        let machine = machines
            .get_mut(machine_id)
            .ok_or_else(|| anyhow::anyhow!("unknown machine"))?;
        machine.config = config.clone();
        machine.instance_id.push('+');
        Ok(machine.clone())
    }

    async fn launch(&self, input: &LaunchInput) -> Result<Machine> {
        self.record("launch".to_string());
        let mut launched = machine(EPHEMERAL_ID, MachineState::Created);
        launched.config = input.config.clone();
        self.machines
            .lock()
            .unwrap()
            .insert(launched.id.clone(), launched.clone());
        if !self.launch_script.is_empty() {
            self.set_script(EPHEMERAL_ID, &self.launch_script);
        }
        Ok(launched)
    }

    async fn stop(&self, machine_id: &str, _nonce: Option<&str>, _timeout: Duration) -> Result<()> {
        self.record(format!("stop:{machine_id}"));
        if self.failing_stops.contains(machine_id) {
            anyhow::bail!("stop request rejected");
        }
        let auto_destroy = self
            .machines
            .lock()
            .unwrap()
            .get(machine_id)
            .is_some_and(|m| m.config.auto_destroy);
        let after = if auto_destroy {
            [MachineState::Stopping, MachineState::Destroyed]
        } else {
            [MachineState::Stopping, MachineState::Stopped]
        };
        self.set_script(machine_id, &after);
        Ok(())
    }

    async fn events(&self, machine_id: &str) -> Result<Vec<MachineEvent>> {
        self.record(format!("events:{machine_id}"));
        Ok(self
            .events
            .lock()
            .unwrap()
            .get(machine_id)
            .cloned()
            .unwrap_or_default())
    }
}

// ── Reporters, verifiers, shells ──────────────────────────────────────────────

/// Records every reported message prefixed with its level.
#[derive(Default)]
pub struct RecordingReporter {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn warnings(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| m.strip_prefix("warn: ").map(str::to_string))
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.contains(needle))
    }
}

impl ProgressReporter for RecordingReporter {
    fn step(&self, message: &str) {
        self.messages.lock().unwrap().push(format!("step: {message}"));
    }
    fn success(&self, message: &str) {
        self.messages
            .lock()
            .unwrap()
            .push(format!("success: {message}"));
    }
    fn warn(&self, message: &str) {
        self.messages.lock().unwrap().push(format!("warn: {message}"));
    }
}

/// Health verifier that fails for the listed machine IDs.
#[derive(Default)]
pub struct StubHealth {
    pub failing: HashSet<String>,
    pub verified: Mutex<Vec<String>>,
    /// Never passes; only returns once cancelled.
    pub hangs: bool,
}

impl StubHealth {
    pub fn failing(id: &str) -> Self {
        Self {
            failing: HashSet::from([id.to_string()]),
            ..Self::default()
        }
    }

    pub fn hanging() -> Self {
        Self {
            hangs: true,
            ..Self::default()
        }
    }
}

impl HealthVerifier for StubHealth {
    async fn verify(&self, machines: &[Machine], cancel: &CancellationToken) -> Result<()> {
        for m in machines {
            self.verified.lock().unwrap().push(m.id.clone());
            if self.hangs {
                cancel.cancelled().await;
                return Err(MachineError::Cancelled { id: m.id.clone() }.into());
            }
            if self.failing.contains(&m.id) {
                return Err(MachineError::HealthCheckFailed {
                    id: m.id.clone(),
                    failures: vec!["http: critical (503)".to_string()],
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Remote shell returning a fixed exit code and recording commands.
pub struct StubShell {
    pub exit_code: i32,
    pub commands: Mutex<Vec<(String, String)>>,
}

impl StubShell {
    pub fn exiting(exit_code: i32) -> Self {
        Self {
            exit_code,
            commands: Mutex::new(Vec::new()),
        }
    }
}

impl RemoteShell for StubShell {
    type Session = String;

    async fn open_session(&self, machine: &Machine) -> Result<String> {
        Ok(machine.id.clone())
    }

    async fn execute(&self, session: &String, command: &str, _interactive: bool) -> Result<i32> {
        self.commands
            .lock()
            .unwrap()
            .push((session.clone(), command.to_string()));
        Ok(self.exit_code)
    }
}

/// Picker that always chooses a fixed index and remembers the options shown.
pub struct FixedPicker {
    pub choice: usize,
    pub shown: Mutex<Vec<String>>,
}

impl FixedPicker {
    pub fn choosing(choice: usize) -> Self {
        Self {
            choice,
            shown: Mutex::new(Vec::new()),
        }
    }
}

impl MachinePicker for FixedPicker {
    fn pick(&self, _prompt: &str, options: &[String]) -> Result<usize> {
        *self.shown.lock().unwrap() = options.to_vec();
        Ok(self.choice)
    }
}

/// Picker that must never be consulted.
pub struct NoPicker;

impl MachinePicker for NoPicker {
    fn pick(&self, _: &str, _: &[String]) -> Result<usize> {
        anyhow::bail!("not expected")
    }
}
