// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Running commands on this host or on a source host over SSH.
//!
//! [`Shell`] is the only way components reach an [`Executor`]. It adds two
//! things on top of the executor:
//!
//! - **Addressing**: a [`CommandLine`] aimed at [`Host::Remote`] is wrapped in
//!   `ssh`, with the remote side rendered as a quoted shell string.
//! - **Dry-run**: when the shell is in dry-run mode no command sent through
//!   [`Shell::run`] reaches the executor; each one is logged and answered with
//!   an empty success. Read-only queries sent through [`Shell::query`] still
//!   run, so a dry-run sees the real state of the host.

use crate::constants::{LOCALHOST, SCP, SSH};
use crate::executor::{BoxedExecutor, CommandLine, ExecutionError, Output};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

/// Where a command runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Host {
    /// This machine
    Local,
    /// A source host reached over SSH (IP address or DNS name)
    Remote(String),
}

impl Host {
    /// `localhost` (and loopback addresses) map to [`Host::Local`].
    #[must_use]
    pub fn parse(address: &str) -> Self {
        match address {
            LOCALHOST | "127.0.0.1" | "::1" => Self::Local,
            other => Self::Remote(other.to_string()),
        }
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }

    /// Address used in SSH targets and replication metadata.
    #[must_use]
    pub fn address(&self) -> &str {
        match self {
            Self::Local => LOCALHOST,
            Self::Remote(address) => address,
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.address())
    }
}

/// Dispatches commands to the right host through an executor.
#[derive(Clone)]
pub struct Shell {
    executor: BoxedExecutor,
    ssh_identity: Option<PathBuf>,
    dry_run: bool,
}

impl Shell {
    #[must_use]
    pub fn new(executor: BoxedExecutor, ssh_identity: Option<PathBuf>, dry_run: bool) -> Self {
        Self {
            executor,
            ssh_identity,
            dry_run,
        }
    }

    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Run `command` on `host`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] if the command (or the SSH hop) fails.
    pub async fn run(&self, host: &Host, command: CommandLine) -> Result<Output, ExecutionError> {
        self.dispatch(self.route(host, command)).await
    }

    /// Run a read-only `command` on `host`, even in dry-run.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] if the command (or the SSH hop) fails.
    pub async fn query(&self, host: &Host, command: CommandLine) -> Result<Output, ExecutionError> {
        self.executor.execute(&self.route(host, command)).await
    }

    /// Run `command` on this machine.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] if the command fails.
    pub async fn run_local(&self, command: CommandLine) -> Result<Output, ExecutionError> {
        self.dispatch(command).await
    }

    /// Copy a file from `host` to a local path (`scp` for remote hosts, `cp` locally).
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] if the copy fails.
    pub async fn copy_from(
        &self,
        host: &Host,
        source: &Path,
        destination: &Path,
    ) -> Result<Output, ExecutionError> {
        let command = match host {
            Host::Local => CommandLine::new("cp")
                .arg(source.to_string_lossy())
                .arg(destination.to_string_lossy()),
            Host::Remote(address) => CommandLine::new(SCP)
                .args(self.ssh_options())
                .arg(format!("{address}:{}", source.display()))
                .arg(destination.to_string_lossy()),
        }
        .describe(format!(
            "Copying {}:{} to {}",
            host,
            source.display(),
            destination.display()
        ));
        self.dispatch(command).await
    }

    /// `true` if `path` is a regular file on `host`.
    ///
    /// Only a non-zero `test -f` means "absent"; failing to reach the host is
    /// still an error.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] if the probe cannot be executed.
    pub async fn file_exists(&self, host: &Host, path: &Path) -> Result<bool, ExecutionError> {
        let command = CommandLine::new("test").arg("-f").arg(path.to_string_lossy());
        match self.run(host, command).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_command_failure() => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn ssh_options(&self) -> Vec<String> {
        let mut options = Vec::new();
        if let Some(identity) = &self.ssh_identity {
            options.push("-i".to_string());
            options.push(identity.to_string_lossy().to_string());
        }
        options.push("-o".to_string());
        options.push("BatchMode=yes".to_string());
        options
    }

    fn route(&self, host: &Host, command: CommandLine) -> CommandLine {
        match host {
            Host::Local => command,
            Host::Remote(address) => self.wrap_ssh(address, &command),
        }
    }

    /// Wrap `command` so it runs on `address` through `ssh`.
    ///
    /// Redirections move into the remote shell string, since the files they
    /// name live on the remote host.
    #[must_use]
    pub fn wrap_ssh(&self, address: &str, command: &CommandLine) -> CommandLine {
        let mut wrapped = CommandLine::new(SSH)
            .args(self.ssh_options())
            .arg(address)
            .arg("--")
            .arg(command.to_shell_string());
        wrapped.description.clone_from(&command.description);
        wrapped
    }

    async fn dispatch(&self, command: CommandLine) -> Result<Output, ExecutionError> {
        if self.dry_run {
            if let Some(description) = &command.description {
                info!("[dry-run] {}", description);
            }
            info!(command = %command, "[dry-run] command not executed");
            return Ok(Output::success());
        }
        self.executor.execute(&command).await
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod transport_tests;
