// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for replica provisioning.
//!
//! Every failure aborts the run. There is no retry and no rollback: whatever was
//! mutated before the error stays in place, and a later `--force` run starts
//! over from a clean target. The variants below are grouped by the stage that
//! raises them:
//!
//! - Input: [`ReplicationError::Validation`], [`ReplicationError::TargetExists`]
//! - Commands: [`ReplicationError::CommandFailed`]
//! - Filesystem post-conditions: [`ReplicationError::SnapshotNotFound`],
//!   [`ReplicationError::RootMissing`], [`ReplicationError::ConfigNotFound`],
//!   [`ReplicationError::ConfigParse`]
//! - Binlog coordinates: [`ReplicationError::MetadataExtraction`],
//!   [`ReplicationError::MetadataFileMissing`], [`ReplicationError::MetadataIncomplete`]
//! - Allocation: [`ReplicationError::ResourceExhausted`], [`ReplicationError::LockFailed`]
//! - Verification: [`ReplicationError::ReplicationProbeFailed`],
//!   [`ReplicationError::ReplicaStatusUnhealthy`]

use crate::executor::ExecutionError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a provisioning run.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// Bad or missing command-line input
    #[error("Invalid input: {reason}")]
    Validation {
        /// Explanation of what is invalid
        reason: String,
    },

    /// The target jail already exists and `--force` was not given
    ///
    /// Returned before anything is touched. Re-run with `--force` to destroy and
    /// re-provision the jail.
    #[error("Target jail '{container}' already exists (use --force to replace it)")]
    TargetExists {
        /// The existing jail name
        container: String,
    },

    /// An underlying local or remote command returned non-zero or could not start
    #[error("Command failed: {0}")]
    CommandFailed(#[from] ExecutionError),

    /// Snapshot transfer or metadata file missing where it was expected
    #[error("Snapshot '{snapshot}' artifact not found on {location}: {path}")]
    SnapshotNotFound {
        /// Snapshot name (`{sourceContainer}_{suffix}`)
        snapshot: String,
        /// Host the artifact was looked for on
        location: String,
        /// Path that does not exist
        path: PathBuf,
    },

    /// The jail filesystem root does not exist after import
    #[error("Root filesystem of jail '{container}' missing at {path}")]
    RootMissing {
        /// Jail name
        container: String,
        /// Expected root path
        path: PathBuf,
    },

    /// The binlog coordinate probe output could not be parsed
    #[error("Failed to extract binlog coordinates from '{container}': {reason}")]
    MetadataExtraction {
        /// Source jail name
        container: String,
        /// What was wrong with the probe output
        reason: String,
    },

    /// The local metadata file does not exist
    #[error("Replication metadata file missing: {path}")]
    MetadataFileMissing {
        /// Expected metadata file path
        path: PathBuf,
    },

    /// The metadata file exists but lacks required fields
    #[error("Replication metadata file {path} is incomplete: {reason}")]
    MetadataIncomplete {
        /// Metadata file path
        path: PathBuf,
        /// Which field is missing or malformed
        reason: String,
    },

    /// Every value in an allocation range is taken
    #[error("No free {resource} left in range [{min}, {max}]")]
    ResourceExhausted {
        /// Kind of resource (`IP suffix`, `server-id`)
        resource: String,
        /// Lowest value in the range
        min: u32,
        /// Highest value in the range
        max: u32,
    },

    /// The allocation pool lock could not be acquired
    #[error("Failed to acquire allocation lock {path}: {reason}")]
    LockFailed {
        /// Lock file path
        path: PathBuf,
        /// Timeout or I/O failure description
        reason: String,
    },

    /// The jail configuration document does not exist
    #[error("Jail configuration not found: {path}")]
    ConfigNotFound {
        /// Expected `config.json` path
        path: PathBuf,
    },

    /// The jail configuration document is not valid
    #[error("Failed to parse jail configuration {path}: {reason}")]
    ConfigParse {
        /// `config.json` path
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// Local filesystem access failed
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The probe row written on the source never reached the replica
    #[error("Replication probe marker '{marker}' not found on replica; query output: {output}")]
    ReplicationProbeFailed {
        /// The marker value written on the source
        marker: String,
        /// What the replica returned instead
        output: String,
    },

    /// `SHOW REPLICA STATUS` reports a stopped thread or disallowed TLS
    #[error("Replica '{container}' is unhealthy: {summary}")]
    ReplicaStatusUnhealthy {
        /// Replica jail name
        container: String,
        /// Offending flags and last errors from the status report
        summary: String,
    },
}

impl ReplicationError {
    /// Wrap an I/O error with a description of what was being attempted.
    #[must_use]
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Reject command-line input, with the reason shown to the user.
    #[must_use]
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Process exit code for this error. Every aborting error exits with 1.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        1
    }

    /// `true` for failures found while verifying an otherwise finished replica.
    #[must_use]
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            Self::ReplicationProbeFailed { .. } | Self::ReplicaStatusUnhealthy { .. }
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = ReplicationError> = std::result::Result<T, E>;

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
