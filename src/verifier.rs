// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Post-provisioning replication checks.
//!
//! Commands returning zero do not prove replication works, so two checks run
//! at the end of a provisioning pass:
//!
//! - an end-to-end probe writes a unique marker row on the source and reads it
//!   back on the replica after a settle interval;
//! - a status check parses `SHOW REPLICA STATUS` and requires the IO thread,
//!   the SQL thread and TLS to all report `Yes`.
//!
//! Both are skipped in dry-run and when verification is disabled.

use crate::config::VerificationSettings;
use crate::constants::{MYSQL, STATUS_YES};
use crate::database::script::sql_string;
use crate::errors::{ReplicationError, Result};
use crate::jail::exec_command;
use crate::report::Reporter;
use crate::transport::{Host, Shell};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Flags that must all read `Yes` for a healthy replica.
///
/// Matched as key suffixes so both `Replica_IO_Running` (MySQL 8) and
/// `Slave_IO_Running` (5.7) are recognised.
pub const REQUIRED_FLAGS: [&str; 3] = ["IO_Running", "SQL_Running", "SSL_Allowed"];

/// Error columns included in an unhealthy summary.
const ERROR_FIELDS: [&str; 2] = ["Last_IO_Error", "Last_SQL_Error"];

/// Parsed `SHOW REPLICA STATUS\G` output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicaStatusReport {
    pub fields: BTreeMap<String, String>,
}

impl ReplicaStatusReport {
    /// Parse every `Key: Value` line; other lines are ignored.
    #[must_use]
    pub fn parse(output: &str) -> Self {
        let fields = output
            .lines()
            .filter_map(|line| {
                let (key, value) = line.split_once(':')?;
                let key = key.trim();
                if key.is_empty() || key.contains(char::is_whitespace) {
                    return None;
                }
                Some((key.to_string(), value.trim().to_string()))
            })
            .collect();
        Self { fields }
    }

    /// Value of the first field whose name is `suffix` or ends in `_{suffix}`.
    #[must_use]
    pub fn get(&self, suffix: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| {
                key.as_str() == suffix
                    || key
                        .strip_suffix(suffix)
                        .is_some_and(|prefix| prefix.ends_with('_'))
            })
            .map(|(_, value)| value.as_str())
    }

    /// `true` when every required flag is exactly `Yes`.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        REQUIRED_FLAGS
            .iter()
            .all(|flag| self.get(flag) == Some(STATUS_YES))
    }

    /// Required flags with their values, plus any non-empty last errors.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts: Vec<String> = REQUIRED_FLAGS
            .iter()
            .map(|flag| format!("{flag}={}", self.get(flag).unwrap_or("<missing>")))
            .collect();
        for field in ERROR_FIELDS {
            if let Some(value) = self.fields.get(field).filter(|value| !value.is_empty()) {
                parts.push(format!("{field}={value}"));
            }
        }
        parts.join(", ")
    }
}

/// How a verification pass ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// Both checks passed
    Verified(ReplicaStatusReport),
    /// Checks were not run, with the reason
    Skipped(String),
}

/// Runs the replication checks.
pub struct ReplicationVerifier {
    shell: Shell,
    settings: VerificationSettings,
    reporter: Reporter,
    skip: bool,
}

impl ReplicationVerifier {
    #[must_use]
    pub fn new(
        shell: Shell,
        settings: VerificationSettings,
        reporter: Reporter,
        skip: bool,
    ) -> Self {
        Self {
            shell,
            settings,
            reporter,
            skip,
        }
    }

    fn skip_reason(&self) -> Option<&'static str> {
        if self.shell.is_dry_run() {
            Some("dry-run")
        } else if self.skip {
            Some("--skip-test")
        } else {
            None
        }
    }

    /// Run the probe and the status check.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::ReplicationProbeFailed`] or
    /// [`ReplicationError::ReplicaStatusUnhealthy`] when a check fails, and
    /// [`ReplicationError::CommandFailed`] when a query cannot run.
    pub async fn verify(
        &self,
        master_host: &Host,
        master_container: &str,
        target: &str,
    ) -> Result<VerificationOutcome> {
        if let Some(reason) = self.skip_reason() {
            self.reporter.skipped("Verifying replication", reason);
            return Ok(VerificationOutcome::Skipped(reason.to_string()));
        }

        self.probe_end_to_end(master_host, master_container, target)
            .await?;
        let report = self.check_status(target).await?;
        if !report.is_healthy() {
            return Err(ReplicationError::ReplicaStatusUnhealthy {
                container: target.to_string(),
                summary: report.summary(),
            });
        }
        Ok(VerificationOutcome::Verified(report))
    }

    /// Write a marker row on the source and expect it on the replica.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::ReplicationProbeFailed`] when the marker
    /// does not arrive within the settle interval.
    pub async fn probe_end_to_end(
        &self,
        master_host: &Host,
        master_container: &str,
        target: &str,
    ) -> Result<()> {
        self.reporter.step(format!(
            "Probing replication from '{master_container}' on {master_host} to '{target}'"
        ));
        if let Some(reason) = self.skip_reason() {
            self.reporter.result(format!("skipped ({reason})"));
            return Ok(());
        }

        let marker = probe_marker();
        let table = self.settings.qualified_table();
        let write = format!(
            "CREATE DATABASE IF NOT EXISTS {db}; \
             CREATE TABLE IF NOT EXISTS {table} (\
             id INT AUTO_INCREMENT PRIMARY KEY, \
             marker VARCHAR(64) NOT NULL, \
             created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP); \
             INSERT INTO {table} (marker) VALUES ({value});",
            db = self.settings.probe_database,
            value = sql_string(&marker),
        );
        self.shell
            .run(
                master_host,
                exec_command(master_container, MYSQL, ["-e".to_string(), write])
                    .describe(format!("Writing probe marker {marker}")),
            )
            .await?;

        debug!(
            "Waiting {}s for the marker to replicate",
            self.settings.settle_secs
        );
        tokio::time::sleep(self.settings.settle_interval()).await;

        let read = format!(
            "SELECT marker FROM {table} WHERE marker = {}",
            sql_string(&marker)
        );
        let args = ["-N".to_string(), "-B".to_string(), "-e".to_string(), read];
        let output = self
            .shell
            .run(
                &Host::Local,
                exec_command(target, MYSQL, args)
                    .describe(format!("Reading probe marker on '{target}'")),
            )
            .await?;

        if !output.stdout.lines().any(|line| line.trim() == marker) {
            return Err(ReplicationError::ReplicationProbeFailed {
                marker,
                output: output.stdout.trim().to_string(),
            });
        }
        self.reporter.result(format!("marker {marker} replicated"));
        Ok(())
    }

    /// Fetch and parse the replica status.
    ///
    /// An unhealthy report is returned, not raised; [`Self::verify`] decides.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::CommandFailed`] if the query cannot run.
    pub async fn check_status(&self, target: &str) -> Result<ReplicaStatusReport> {
        self.reporter
            .step(format!("Checking replica status of '{target}'"));
        if let Some(reason) = self.skip_reason() {
            self.reporter.result(format!("skipped ({reason})"));
            return Ok(ReplicaStatusReport::default());
        }

        let output = self
            .shell
            .run(
                &Host::Local,
                exec_command(target, MYSQL, ["-e", "SHOW REPLICA STATUS\\G"]),
            )
            .await?;
        let report = ReplicaStatusReport::parse(&output.stdout);
        if report.is_healthy() {
            self.reporter.result(report.summary());
            info!("Replica '{}' is healthy", target);
        } else {
            self.reporter
                .warning(format!("replica unhealthy: {}", report.summary()));
        }
        Ok(report)
    }
}

/// A marker value unique to this probe.
#[must_use]
pub fn probe_marker() -> String {
    format!(
        "jailrep-{}",
        chrono::Utc::now().format("%Y%m%d%H%M%S%6f")
    )
}

#[cfg(test)]
#[path = "verifier_tests.rs"]
mod verifier_tests;
