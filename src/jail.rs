// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! iocage command surface.
//!
//! Only the handful of operations provisioning needs: existence check, destroy,
//! start, exec, rc service control and boot-time autostart. Commands are
//! addressed to a [`Host`] so the same builders serve the source host (for
//! `exec`) and this machine.

use crate::constants::{IOCAGE, SERVICE};
use crate::errors::Result;
use crate::executor::{CommandLine, Output};
use crate::transport::{Host, Shell};
use tracing::debug;

/// Build `iocage exec <jail> <program> <args...>`.
#[must_use]
pub fn exec_command<I, S>(jail: &str, program: &str, args: I) -> CommandLine
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CommandLine::new(IOCAGE)
        .arg("exec")
        .arg(jail)
        .arg(program)
        .args(args)
}

/// Wrapper around `iocage` on one host.
#[derive(Clone)]
pub struct JailRuntime {
    shell: Shell,
    host: Host,
}

impl JailRuntime {
    #[must_use]
    pub fn new(shell: Shell, host: Host) -> Self {
        Self { shell, host }
    }

    #[must_use]
    pub fn host(&self) -> &Host {
        &self.host
    }

    #[must_use]
    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    /// `true` if `iocage list` knows a jail called `name`.
    ///
    /// Runs in dry-run too.
    ///
    /// # Errors
    ///
    /// Returns an error if `iocage list` fails.
    pub async fn exists(&self, name: &str) -> Result<bool> {
        let output = self
            .shell
            .query(
                &self.host,
                CommandLine::new(IOCAGE)
                    .args(["list", "-H", "-q"])
                    .describe(format!("Checking whether jail '{name}' exists")),
            )
            .await?;
        let found = parse_jail_names(&output.stdout).iter().any(|jail| jail == name);
        debug!("Jail '{}' exists: {}", name, found);
        Ok(found)
    }

    /// Destroy the jail and its datasets.
    ///
    /// # Errors
    ///
    /// Returns an error if `iocage destroy` fails.
    pub async fn destroy(&self, name: &str) -> Result<()> {
        self.shell
            .run(
                &self.host,
                CommandLine::new(IOCAGE)
                    .args(["destroy", "-f", name])
                    .describe(format!("Destroying existing jail '{name}'")),
            )
            .await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if `iocage start` fails.
    pub async fn start(&self, name: &str) -> Result<()> {
        self.shell
            .run(
                &self.host,
                CommandLine::new(IOCAGE)
                    .args(["start", name])
                    .describe(format!("Starting jail '{name}'")),
            )
            .await?;
        Ok(())
    }

    /// Turn on boot-time autostart.
    ///
    /// # Errors
    ///
    /// Returns an error if `iocage set` fails.
    pub async fn enable_boot(&self, name: &str) -> Result<()> {
        self.shell
            .run(
                &self.host,
                CommandLine::new(IOCAGE)
                    .args(["set", "boot=on", name])
                    .describe(format!("Enabling boot-time start for jail '{name}'")),
            )
            .await?;
        Ok(())
    }

    /// Run a program inside the jail and return its output.
    ///
    /// # Errors
    ///
    /// Returns an error if the program exits non-zero.
    pub async fn exec<I, S>(&self, name: &str, program: &str, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(self
            .shell
            .run(&self.host, exec_command(name, program, args))
            .await?)
    }

    /// `service <service> <action>` inside the jail.
    ///
    /// # Errors
    ///
    /// Returns an error if the rc script fails.
    pub async fn service(&self, name: &str, service: &str, action: &str) -> Result<()> {
        let command = exec_command(name, SERVICE, [service, action])
            .describe(format!("Running '{service} {action}' in jail '{name}'"));
        self.shell.run(&self.host, command).await?;
        Ok(())
    }
}

/// Jail names from `iocage list -H -q` output (first column of each row).
#[must_use]
pub fn parse_jail_names(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
#[path = "jail_tests.rs"]
mod jail_tests;
