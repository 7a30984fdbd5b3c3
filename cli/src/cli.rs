//! CLI argument parsing with clap derive

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::app::{AppContext, AppFlags, BehaviourFlags, OutputFlags};
use crate::commands;

/// Operate the machines behind your apps
#[derive(Parser)]
#[command(
    name = "flotilla",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(
        long,
        global = true,
        env = "NO_COLOR",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub no_color: bool,

    /// Never prompt; fail instead of asking
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// App to operate on
    #[arg(short, long, global = true, env = "FLOTILLA_APP")]
    pub app: Option<String>,

    /// Path to the app config file
    #[arg(
        short,
        long,
        global = true,
        value_name = "PATH",
        default_value = "flotilla.yaml"
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a one-off command on a machine
    Run(commands::run::RunArgs),

    /// Inspect and update machines
    #[command(subcommand)]
    Machine(commands::machine::MachineCommand),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),

    /// Show version
    Version,
}

impl Cli {
    /// Whether JSON output was requested.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.json
    }

    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self, cancel: CancellationToken) -> Result<ExitCode> {
        let Cli {
            json,
            quiet,
            no_color,
            yes,
            app,
            config,
            command,
        } = self;
        let ctx = AppContext::new(
            AppFlags {
                output: OutputFlags {
                    no_color,
                    quiet,
                    json,
                },
                behaviour: BehaviourFlags {
                    yes,
                    app,
                    app_config: config,
                },
            },
            cancel,
        );

        match command {
            Command::Run(args) => commands::run::run(&ctx, args).await,
            Command::Machine(cmd) => commands::machine::run(&ctx, cmd).await,
            Command::Config(cmd) => commands::config::run(&ctx, cmd),
            Command::Version => commands::version::run(&ctx),
        }
    }
}
