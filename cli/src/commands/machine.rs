//! `flotilla machine` — inspect and update an app's machines.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use flotilla_common::{MachineState, guest_preset};

use crate::app::AppContext;
use crate::application::ports::{MachineFilter, MachinePlatform};
use crate::application::services::machine_update::{UpdateOptions, rolling_update};
use crate::domain::machine::{ConfigDelta, parse_env_assignments, validate_machine_id};
use crate::infra::health::PlatformHealthVerifier;
use crate::infra::platform::HttpPlatformClient;

/// Machine subcommands.
#[derive(Subcommand)]
pub enum MachineCommand {
    /// Update the configuration of one or more machines
    Update(UpdateArgs),
    /// List the app's machines
    List(ListArgs),
    /// Show a machine's state, checks and last exit
    Status {
        /// Machine ID
        id: String,
    },
}

/// Arguments for `machine update`.
#[derive(Args)]
pub struct UpdateArgs {
    /// Machines to update, one at a time
    #[arg(required = true, value_name = "ID")]
    pub ids: Vec<String>,

    /// New image reference
    #[arg(long)]
    pub image: Option<String>,

    /// Set an environment variable (repeatable)
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Cron-style schedule; pass an empty string to clear it
    #[arg(long)]
    pub schedule: Option<String>,

    /// Guest size preset (e.g. shared-cpu-2x)
    #[arg(long, value_name = "PRESET")]
    pub vm_size: Option<String>,
}

impl UpdateArgs {
    /// Configuration change requested on the command line.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed env assignment or unknown preset,
    /// or when nothing would change.
    pub fn delta(&self) -> Result<ConfigDelta> {
        let guest = self
            .vm_size
            .as_deref()
            .map(|name| guest_preset(name).with_context(|| format!("unknown VM size '{name}'")))
            .transpose()?;
        let delta = ConfigDelta {
            image: self.image.clone(),
            guest,
            env: parse_env_assignments(&self.env)?,
            schedule: self.schedule.clone(),
        };
        if delta.is_empty() {
            anyhow::bail!("nothing to update: pass --image, --env, --schedule or --vm-size");
        }
        Ok(delta)
    }
}

/// Arguments for `machine list`.
#[derive(Args)]
pub struct ListArgs {
    /// Only machines in this region
    #[arg(long)]
    pub region: Option<String>,

    /// Only machines in this state
    #[arg(long)]
    pub state: Option<MachineState>,

    /// Include destroyed machines
    #[arg(long)]
    pub all: bool,
}

/// Run the machine command.
///
/// # Errors
///
/// Returns an error if configuration is incomplete or a platform call fails.
pub async fn run(app: &AppContext, cmd: MachineCommand) -> Result<ExitCode> {
    let config = app.config()?;
    let app_config = app.app_config()?;
    let app_name = app.app_name(&config, &app_config)?;
    let platform = app.platform(&config, &app_name)?;

    match cmd {
        MachineCommand::Update(args) => {
            update(app, &platform, &args, config.timeouts.update_wait()).await
        }
        MachineCommand::List(args) => {
            let filter = MachineFilter {
                region: args.region,
                include_deleted: args.all,
                state: args.state,
            };
            let machines = platform.list(&filter).await?;
            app.renderer().render_machines(&machines)?;
            Ok(ExitCode::SUCCESS)
        }
        MachineCommand::Status { id } => {
            validate_machine_id(&id)?;
            let machine = platform.get(&id).await?;
            let events = platform.events(&id).await.unwrap_or_else(|err| {
                tracing::debug!(machine_id = %id, error = %format!("{err:#}"), "event log unavailable");
                machine.events.clone()
            });
            app.renderer().render_machine_status(&machine, &events)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn update(
    app: &AppContext,
    platform: &HttpPlatformClient,
    args: &UpdateArgs,
    wait_timeout: std::time::Duration,
) -> Result<ExitCode> {
    for id in &args.ids {
        validate_machine_id(id)?;
    }
    let delta = args.delta()?;

    let mut machines = Vec::with_capacity(args.ids.len());
    for id in &args.ids {
        machines.push(platform.get(id).await?);
    }

    let health = PlatformHealthVerifier::new(platform);
    let reporter = app.reporter();
    let mut opts = UpdateOptions::new(&app.cancel);
    opts.wait_timeout = wait_timeout;

    let report = rolling_update(platform, &health, &reporter, &machines, &delta, &opts).await?;
    reporter.pause();
    app.renderer().render_update_report(&report)?;

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
