//! Human-readable terminal renderer.

use std::path::Path;

use flotilla_common::{Machine, MachineEvent};
use owo_colors::OwoColorize as _;

use crate::application::services::machine_update::RollingUpdateReport;
use crate::domain::config::FlotillaConfig;
use crate::domain::exit_cause;
use crate::output::OutputContext;

/// Renders domain types as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Render the CLI version information.
    pub fn render_version(&self, version: &str) {
        if self.ctx.quiet {
            return;
        }
        println!("flotilla {version}");
    }

    /// Render the machine table.
    pub fn render_machines(&self, machines: &[Machine]) {
        if machines.is_empty() {
            self.ctx.info("No machines found");
            return;
        }
        let rows = machine_rows(machines);
        let widths = column_widths(&rows);
        for (i, row) in rows.iter().enumerate() {
            let mut line = String::from(" ");
            for (col, (cell, width)) in row.iter().zip(&widths).enumerate() {
                let padded = format!(" {cell:<width$}");
                if i == 0 {
                    line.push_str(&padded.style(self.ctx.styles.dim).to_string());
                } else if col == 2 {
                    let state = machines[i - 1].state;
                    line.push_str(&padded.style(self.ctx.styles.state(state)).to_string());
                } else {
                    line.push_str(&padded);
                }
            }
            println!("{}", line.trim_end());
        }
    }

    /// Render one machine in detail.
    pub fn render_machine_status(&self, machine: &Machine, events: &[MachineEvent]) {
        self.ctx.header(&format!("Machine {}", machine.id));
        self.ctx.kv("Name:    ", &machine.name);
        self.ctx.kv(
            "State:   ",
            &machine
                .state
                .as_str()
                .style(self.ctx.styles.state(machine.state))
                .to_string(),
        );
        self.ctx.kv("Region:  ", &machine.region);
        self.ctx.kv("Image:   ", &machine.config.image);
        self.ctx.kv("Address: ", &machine.private_ip);
        if let Some(group) = machine.config.process_group() {
            self.ctx.kv("Group:   ", group);
        }
        if let Some(schedule) = &machine.config.schedule {
            self.ctx.kv("Schedule:", schedule);
        }
        if events.iter().any(MachineEvent::is_exit) {
            self.ctx.kv("Last exit:", &format!("machine {}", exit_cause(events)));
        }

        if !machine.checks.is_empty() {
            println!();
            self.ctx.header("Checks:");
            for check in &machine.checks {
                let detail = if check.output.is_empty() {
                    check.name.clone()
                } else {
                    format!("{} ({})", check.name, check.output.trim())
                };
                if check.is_passing() {
                    self.ctx.success(&detail);
                } else {
                    self.ctx.warn(&format!("{detail}: {}", check.status));
                }
            }
        }
    }

    /// Render the per-machine outcome of an update.
    pub fn render_update_report(&self, report: &RollingUpdateReport) {
        if self.ctx.quiet {
            return;
        }
        println!();
        for result in &report.results {
            match &result.outcome {
                Ok(machine) => println!(
                    "  {} {}  {}",
                    "✓".style(self.ctx.styles.success),
                    result.machine_id,
                    machine.state.style(self.ctx.styles.dim)
                ),
                Err(err) => println!(
                    "  {} {}  {err:#}",
                    "✗".style(self.ctx.styles.error),
                    result.machine_id
                ),
            }
        }
        let ok = report.succeeded().count();
        println!();
        self.ctx
            .info(&format!("{ok} of {} machine(s) updated", report.results.len()));
    }

    /// Render the config file path.
    pub fn render_config_path(&self, path: &Path) {
        println!("{}", path.display());
    }

    /// Render the effective configuration.
    pub fn render_config(&self, config: &FlotillaConfig, path: &Path) {
        let config = config.redacted();
        println!();
        println!(
            "  {}",
            format!("Configuration ({})", path.display()).style(self.ctx.styles.header)
        );
        println!();
        println!("  {:<28} {}", "api.base_url:", config.api.base_url);
        println!(
            "  {:<28} {}",
            "api.token:",
            config.api.token.as_deref().unwrap_or("(not set)")
        );
        println!(
            "  {:<28} {}",
            "defaults.app:",
            config.defaults.app.as_deref().unwrap_or("(not set)")
        );
        println!("  {:<28} {}", "defaults.ssh_user:", config.defaults.ssh_user);
        println!(
            "  {:<28} {}",
            "timeouts.update_wait_secs:", config.timeouts.update_wait_secs
        );
        println!(
            "  {:<28} {}",
            "timeouts.start_wait_secs:", config.timeouts.start_wait_secs
        );
        println!("  {:<28} {}", "timeouts.teardown_secs:", config.timeouts.teardown_secs);
        println!();
        println!("  {}", "Environment:".style(self.ctx.styles.bold));
        for var in ["FLOTILLA_CONFIG", "FLOTILLA_APP", "FLOTILLA_LOG", "NO_COLOR"] {
            println!(
                "    {:<20} {}",
                format!("{var}:"),
                std::env::var(var).unwrap_or_else(|_| "(not set)".to_string())
            );
        }
        println!(
            "    {:<20} {}",
            "FLOTILLA_API_TOKEN:",
            if std::env::var("FLOTILLA_API_TOKEN").is_ok() {
                "(set)"
            } else {
                "(not set)"
            }
        );
        println!();
    }
}

/// Header plus one row per machine.
#[must_use]
pub fn machine_rows(machines: &[Machine]) -> Vec<Vec<String>> {
    let mut rows = vec![
        ["ID", "NAME", "STATE", "REGION", "IMAGE", "GROUP"]
            .map(String::from)
            .to_vec(),
    ];
    rows.extend(machines.iter().map(|m| {
        vec![
            m.id.clone(),
            m.name.clone(),
            m.state.to_string(),
            m.region.clone(),
            m.config.image.clone(),
            m.config.process_group().unwrap_or("-").to_string(),
        ]
    }));
    rows
}

fn column_widths(rows: &[Vec<String>]) -> Vec<usize> {
    let columns = rows.first().map_or(0, Vec::len);
    (0..columns)
        .map(|c| {
            rows.iter()
                .map(|r| r.get(c).map_or(0, |cell| cell.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect()
}
