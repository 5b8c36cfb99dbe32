// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The immutable input of a provisioning run.

use crate::errors::{ReplicationError, Result};
use crate::transport::Host;
use std::fmt;
use std::path::PathBuf;

/// `host:name` as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: Host,
    /// Jail name, or a snapshot name for a local source
    pub name: String,
}

impl Endpoint {
    /// Parse `host:name`.
    ///
    /// The split is on the last `:`; the name part may only contain
    /// `[A-Za-z0-9_.-]`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::Validation`] naming `flag` on malformed input.
    pub fn parse(value: &str, flag: &str) -> Result<Self> {
        let Some((host, name)) = value.rsplit_once(':') else {
            return Err(ReplicationError::validation(format!(
                "{flag} must be <host>:<name>, got '{value}'"
            )));
        };
        if host.is_empty() {
            return Err(ReplicationError::validation(format!(
                "{flag} is missing a host in '{value}'"
            )));
        }
        if name.is_empty() {
            return Err(ReplicationError::validation(format!(
                "{flag} is missing a name in '{value}'"
            )));
        }
        if !is_valid_name(name) {
            return Err(ReplicationError::validation(format!(
                "{flag} name '{name}' may only contain letters, digits, '_', '.' and '-'"
            )));
        }
        Ok(Self {
            host: Host::parse(host),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.name)
    }
}

/// `true` for names made only of `[A-Za-z0-9_.-]`, other than `.` and `..`.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Everything a run needs to know about what to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationRequest {
    /// Remote source jail, or a pre-staged snapshot on this host
    pub source: Endpoint,
    /// Jail to create on this host
    pub target: String,
    /// Destroy an existing target first
    pub force: bool,
    pub dry_run: bool,
    pub skip_verification: bool,
    /// SSH private key for reaching the source host
    pub ssh_identity: Option<PathBuf>,
}

impl ReplicationRequest {
    /// Validate and assemble a request from `--from`/`--to` values and flags.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::Validation`] for malformed endpoints or a
    /// target that is not on this host.
    pub fn new(
        from: &str,
        to: &str,
        force: bool,
        dry_run: bool,
        skip_verification: bool,
        ssh_identity: Option<PathBuf>,
    ) -> Result<Self> {
        let source = Endpoint::parse(from, "--from")?;
        let target = Endpoint::parse(to, "--to")?;
        if !target.host.is_local() {
            return Err(ReplicationError::validation(format!(
                "--to must be on localhost, got '{}'",
                target.host
            )));
        }
        Ok(Self {
            source,
            target: target.name,
            force,
            dry_run,
            skip_verification,
            ssh_identity,
        })
    }

    /// `true` when provisioning from snapshot files already on this host.
    #[must_use]
    pub fn is_local_source(&self) -> bool {
        self.source.host.is_local()
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod request_tests;
