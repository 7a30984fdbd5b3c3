//! Application service — run a one-off command on a machine.
//!
//! The command runs on an existing started machine, on one the operator
//! picks, or on an ephemeral machine created for this invocation only.
//! An ephemeral machine is torn down before the outcome is returned.

use std::time::Duration;

use anyhow::{Context, Result};
use flotilla_common::{
    App, DEFAULT_EPHEMERAL_PRESET, LaunchInput, Machine, MachineEvent, MachineState,
};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    MachineFilter, MachinePicker, MachinePlatform, ProgressReporter, RemoteShell,
};
use crate::application::services::wait::{PollPolicy, wait_for_state};
use crate::domain::machine::{ephemeral_runner_config, exit_cause, is_runnable, picker_label};
use crate::domain::{
    AppConfig, CleanupAction, CleanupWarning, MachineError, RunError, encode_command,
};

/// Where the command should run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineSelection {
    /// A specific machine that must already be started.
    Existing(String),
    /// Ask the operator, offering a fresh ephemeral machine first.
    Interactive,
    /// Always create an ephemeral machine.
    Ephemeral,
}

pub struct RunRequest<'a> {
    pub app: &'a App,
    pub app_config: &'a AppConfig,
    pub args: &'a [String],
    pub selection: MachineSelection,
    /// Attach a TTY to the remote command.
    pub interactive: bool,
    /// Leave an ephemeral machine running afterwards.
    pub keep: bool,
}

pub struct RunOptions<'a> {
    pub start_timeout: Duration,
    pub teardown_timeout: Duration,
    pub poll: PollPolicy,
    pub cancel: &'a CancellationToken,
}

impl<'a> RunOptions<'a> {
    #[must_use]
    pub fn new(cancel: &'a CancellationToken) -> Self {
        Self {
            start_timeout: Duration::from_secs(15),
            teardown_timeout: Duration::from_secs(5),
            poll: PollPolicy::default(),
            cancel,
        }
    }
}

/// What happened during a run.
#[derive(Debug)]
pub struct RunOutcome {
    pub machine_id: String,
    pub ephemeral: bool,
    /// Exit code of the remote command.
    pub exit_code: i32,
    pub cleanup: Vec<CleanupWarning>,
}

/// Machine chosen for a run.
#[derive(Debug)]
pub struct SelectedMachine {
    pub machine: Machine,
    /// Created by this invocation and owned by it.
    pub ephemeral: bool,
}

/// Run `req.args` on the selected machine and return the remote exit code.
///
/// # Errors
///
/// Returns an error if the command is empty, no suitable machine can be
/// selected or started, or the remote command cannot be executed.
/// Teardown problems are never errors; they land in
/// [`RunOutcome::cleanup`] and are reported as warnings.
pub async fn run_command<S: RemoteShell>(
    platform: &impl MachinePlatform,
    shell: &S,
    picker: &impl MachinePicker,
    reporter: &impl ProgressReporter,
    req: RunRequest<'_>,
    opts: &RunOptions<'_>,
) -> Result<RunOutcome> {
    let command = encode_command(&req.app_config.commands, req.args)?;
    tracing::debug!(%command, "encoded remote command");

    let selected = select_machine(platform, picker, reporter, &req, opts).await?;
    let machine_id = selected.machine.id.clone();

    let result = execute(shell, &selected.machine, &command, req.interactive, opts.cancel).await;

    let mut cleanup = Vec::new();
    if selected.ephemeral {
        if req.keep {
            reporter.warn(&format!(
                "leaving ephemeral machine {machine_id} running; destroy it when you are done"
            ));
        } else {
            cleanup = teardown(platform, reporter, &machine_id, opts.teardown_timeout).await;
        }
    }

    let exit_code = result?;
    Ok(RunOutcome {
        machine_id,
        ephemeral: selected.ephemeral,
        exit_code,
        cleanup,
    })
}

async fn execute<S: RemoteShell>(
    shell: &S,
    machine: &Machine,
    command: &str,
    interactive: bool,
    cancel: &CancellationToken,
) -> Result<i32> {
    let session = shell
        .open_session(machine)
        .await
        .with_context(|| format!("failed to connect to machine {}", machine.id))?;
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(anyhow::Error::from(MachineError::Cancelled { id: machine.id.clone() })),
        code = shell.execute(&session, command, interactive) => code,
    }
}

/// Resolve `req.selection` to a started machine.
///
/// # Errors
///
/// * [`RunError::NotStarted`] / [`RunError::ReleaseCommandMachine`] for an
///   unsuitable explicit machine.
/// * [`RunError::NoMachinesAvailable`] when there is nothing to pick from.
/// * Any error from creating and starting an ephemeral machine.
pub async fn select_machine(
    platform: &impl MachinePlatform,
    picker: &impl MachinePicker,
    reporter: &impl ProgressReporter,
    req: &RunRequest<'_>,
    opts: &RunOptions<'_>,
) -> Result<SelectedMachine> {
    match &req.selection {
        MachineSelection::Existing(id) => {
            let machine = existing_machine(platform, id).await?;
            Ok(SelectedMachine {
                machine,
                ephemeral: false,
            })
        }
        MachineSelection::Ephemeral => {
            create_ephemeral(platform, reporter, req.app, req.app_config, opts).await
        }
        MachineSelection::Interactive => {
            let candidates: Vec<Machine> = platform
                .list(&MachineFilter::default())
                .await?
                .into_iter()
                .filter(is_runnable)
                .collect();
            if candidates.is_empty() {
                return Err(RunError::NoMachinesAvailable.into());
            }
            let mut options = vec![format!(
                "create an ephemeral {DEFAULT_EPHEMERAL_PRESET} machine"
            )];
            options.extend(candidates.iter().map(picker_label));

            match picker.pick("Select a machine:", &options)? {
                0 => create_ephemeral(platform, reporter, req.app, req.app_config, opts).await,
                index => {
                    let machine = candidates
                        .into_iter()
                        .nth(index - 1)
                        .with_context(|| format!("invalid selection {index}"))?;
                    Ok(SelectedMachine {
                        machine,
                        ephemeral: false,
                    })
                }
            }
        }
    }
}

async fn existing_machine(platform: &impl MachinePlatform, id: &str) -> Result<Machine> {
    let machine = platform.get(id).await?;
    if machine.state != MachineState::Started {
        return Err(RunError::NotStarted(machine.id).into());
    }
    if machine.is_release_command() {
        return Err(RunError::ReleaseCommandMachine(machine.id).into());
    }
    Ok(machine)
}

async fn create_ephemeral(
    platform: &impl MachinePlatform,
    reporter: &impl ProgressReporter,
    app: &App,
    app_config: &AppConfig,
    opts: &RunOptions<'_>,
) -> Result<SelectedMachine> {
    let image = app.current_image.as_deref().ok_or(RunError::NotReleased)?;
    let input = LaunchInput {
        name: None,
        region: app_config.primary_region.clone(),
        config: ephemeral_runner_config(app_config, image),
    };
    let launched = platform
        .launch(&input)
        .await
        .context("failed to create ephemeral runner machine")?;
    let id = launched.id.clone();
    tracing::info!(machine_id = %id, image, "launched ephemeral runner");
    reporter.success(&format!("created ephemeral machine {id} to run the command"));

    reporter.step(&format!("waiting for machine {id} to start..."));
    match wait_for_state(
        platform,
        &id,
        MachineState::Started,
        opts.start_timeout,
        opts.cancel,
        opts.poll,
    )
    .await
    {
        Ok(machine) => {
            reporter.success(&format!("machine {id} started"));
            Ok(SelectedMachine {
                machine,
                ephemeral: true,
            })
        }
        Err(err) => Err(abandon_ephemeral(platform, reporter, &id, err, opts).await),
    }
}

/// The ephemeral machine never became usable. Explain why and make sure it
/// does not outlive the invocation.
async fn abandon_ephemeral(
    platform: &impl MachinePlatform,
    reporter: &impl ProgressReporter,
    id: &str,
    err: anyhow::Error,
    opts: &RunOptions<'_>,
) -> anyhow::Error {
    if matches!(
        err.downcast_ref::<MachineError>(),
        Some(MachineError::UnexpectedTermination { .. })
    ) {
        return err;
    }

    match platform.get(id).await {
        Ok(machine) if machine.state.is_gone() => {
            let events = platform.events(id).await.unwrap_or(machine.events);
            return terminated(id, machine.state, &events);
        }
        Ok(_) => {}
        // Already purged by the platform.
        Err(check_err)
            if matches!(
                check_err.downcast_ref::<MachineError>(),
                Some(MachineError::NotFound { .. })
            ) =>
        {
            let events = platform.events(id).await.unwrap_or_default();
            return terminated(id, MachineState::Destroyed, &events);
        }
        Err(check_err) => {
            tracing::warn!(machine_id = id, error = %format!("{check_err:#}"), "failed to check machine status");
        }
    }

    let warnings = teardown(platform, reporter, id, opts.teardown_timeout).await;
    if !warnings.is_empty() {
        reporter.warn(&format!("you may need to destroy machine {id} manually"));
    }
    err
}

fn terminated(id: &str, observed: MachineState, events: &[MachineEvent]) -> anyhow::Error {
    MachineError::UnexpectedTermination {
        id: id.to_string(),
        desired: MachineState::Started,
        observed,
        cause: exit_cause(events),
    }
    .into()
}

/// Stop an ephemeral machine and wait for the platform to destroy it.
///
/// Runs on its own deadline and cancellation scope so it still happens
/// after the caller's deadline has expired or the caller was cancelled.
pub async fn teardown(
    platform: &impl MachinePlatform,
    reporter: &impl ProgressReporter,
    machine_id: &str,
    timeout: Duration,
) -> Vec<CleanupWarning> {
    reporter.step(&format!("destroying ephemeral machine {machine_id}..."));
    let warning = |action: CleanupAction, reason: String| {
        tracing::warn!(machine_id, %action, %reason, "ephemeral machine cleanup failed");
        reporter.warn(&format!(
            "failed to destroy ephemeral machine {machine_id}: {reason}. You may need to destroy it manually"
        ));
        vec![CleanupWarning {
            machine_id: machine_id.to_string(),
            action,
            reason,
        }]
    };

    match tokio::time::timeout(timeout, platform.stop(machine_id, None, timeout)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => return warning(CleanupAction::Stop, format!("{err:#}")),
        Err(_) => {
            return warning(
                CleanupAction::Stop,
                format!("no response within {}s", timeout.as_secs()),
            );
        }
    }

    let scope = CancellationToken::new();
    match wait_for_state(
        platform,
        machine_id,
        MachineState::Destroyed,
        timeout,
        &scope,
        PollPolicy::default(),
    )
    .await
    {
        Ok(_) => {
            reporter.success(&format!("ephemeral machine {machine_id} destroyed"));
            Vec::new()
        }
        Err(err) => warning(CleanupAction::AwaitDestroy, format!("{err:#}")),
    }
}
