//! `flotilla run` — run a one-off command on a machine.

use std::io::IsTerminal as _;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::AppDirectory;
use crate::application::services::ephemeral_run::{
    MachineSelection, RunOptions, RunRequest, run_command,
};
use crate::domain::machine::validate_machine_id;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::prompt::DialoguerPicker;
use crate::infra::ssh::SshShell;

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Command to run, followed by its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Run on this started machine instead of an ephemeral one
    #[arg(short, long, value_name = "ID")]
    pub machine: Option<String>,

    /// Choose the machine from a list
    #[arg(short, long, conflicts_with = "machine")]
    pub select: bool,

    /// Remote user
    #[arg(short, long)]
    pub user: Option<String>,

    /// Leave the ephemeral machine running afterwards
    #[arg(long)]
    pub keep: bool,
}

impl RunArgs {
    fn selection(&self) -> MachineSelection {
        match (&self.machine, self.select) {
            (Some(id), _) => MachineSelection::Existing(id.clone()),
            (None, true) => MachineSelection::Interactive,
            (None, false) => MachineSelection::Ephemeral,
        }
    }
}

/// Entry point for `flotilla run`.
///
/// Exits with the remote command's exit code.
///
/// # Errors
///
/// Returns an error if configuration is incomplete, no machine can be
/// selected or started, or the command cannot be executed.
pub async fn run(app: &AppContext, args: RunArgs) -> Result<ExitCode> {
    if let Some(id) = &args.machine {
        validate_machine_id(id)?;
    }

    let config = app.config()?;
    let app_config = app.app_config()?;
    let app_name = app.app_name(&config, &app_config)?;
    let platform = app.platform(&config, &app_name)?;
    let app_info = platform.app(&app_name).await?;

    let user = args
        .user
        .clone()
        .unwrap_or_else(|| config.defaults.ssh_user.clone());
    let shell = SshShell::new(TokioCommandRunner, &user);
    let picker = DialoguerPicker {
        non_interactive: app.non_interactive,
    };
    let reporter = app.reporter();

    let mut opts = RunOptions::new(&app.cancel);
    opts.start_timeout = config.timeouts.start_wait();
    opts.teardown_timeout = config.timeouts.teardown();

    let req = RunRequest {
        app: &app_info,
        app_config: &app_config,
        args: &args.command,
        selection: args.selection(),
        interactive: std::io::stdin().is_terminal() && std::io::stdout().is_terminal(),
        keep: args.keep,
    };
    let outcome = run_command(&platform, &shell, &picker, &reporter, req, &opts).await?;
    reporter.pause();

    tracing::info!(
        machine_id = %outcome.machine_id,
        ephemeral = outcome.ephemeral,
        exit_code = outcome.exit_code,
        cleanup_warnings = outcome.cleanup.len(),
        "remote command finished"
    );
    Ok(exit_code(outcome.exit_code))
}

/// Process exit code for a remote exit code.
#[must_use]
pub fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
