//! `RemoteShell` over the system `ssh` client.
//!
//! The machine's private address must already be routable from this host.

use std::process::ExitStatus;
use std::time::Duration;

use anyhow::{Context, Result};
use flotilla_common::Machine;

use crate::application::ports::{CommandRunner, RemoteShell};

/// Time allowed for the reachability probe.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

const SSH_OPTIONS: [&str; 6] = [
    "-o",
    "StrictHostKeyChecking=accept-new",
    "-o",
    "LogLevel=ERROR",
    "-o",
    "ServerAliveInterval=15",
];

/// An address `ssh` can connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshSession {
    pub machine_id: String,
    pub destination: String,
}

pub struct SshShell<R> {
    runner: R,
    user: String,
}

impl<R: CommandRunner> SshShell<R> {
    #[must_use]
    pub fn new(runner: R, user: &str) -> Self {
        Self {
            runner,
            user: user.to_string(),
        }
    }
}

impl<R: CommandRunner> RemoteShell for SshShell<R> {
    type Session = SshSession;

    async fn open_session(&self, machine: &Machine) -> Result<SshSession> {
        if machine.private_ip.is_empty() {
            anyhow::bail!("machine {} has no private address", machine.id);
        }
        let session = SshSession {
            machine_id: machine.id.clone(),
            destination: format!("{}@{}", self.user, machine.private_ip),
        };

        let mut args: Vec<&str> = SSH_OPTIONS.to_vec();
        args.extend(["-o", "BatchMode=yes", "-o", "ConnectTimeout=10"]);
        args.extend([session.destination.as_str(), "true"]);
        let output = self
            .runner
            .run_with_timeout("ssh", &args, CONNECT_TIMEOUT)
            .await
            .context("ssh probe failed")?;
        if !output.status.success() {
            anyhow::bail!(
                "cannot reach machine {} at {}: {}",
                machine.id,
                machine.private_ip,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        tracing::debug!(machine_id = %machine.id, destination = %session.destination, "ssh session ready");
        Ok(session)
    }

    async fn execute(&self, session: &SshSession, command: &str, interactive: bool) -> Result<i32> {
        let mut args: Vec<&str> = SSH_OPTIONS.to_vec();
        args.push(if interactive { "-t" } else { "-T" });
        args.extend([session.destination.as_str(), "--", command]);
        tracing::info!(machine_id = %session.machine_id, interactive, "running remote command");

        let status = self
            .runner
            .run_status("ssh", &args)
            .await
            .with_context(|| format!("failed to run command on machine {}", session.machine_id))?;
        Ok(exit_code(status))
    }
}

/// Exit code as a shell would report it; signals map to `128 + signal`.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
