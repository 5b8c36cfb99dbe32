// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Replication metadata captured on the source at snapshot time.
//!
//! The metadata file is plain text with four newline-separated fields in a
//! fixed order. That order is the wire format between the source host and the
//! replica host:
//!
//! ```text
//! mysql-bin.000007
//! 4821
//! 10.1.1.5
//! primary
//! ```
//!
//! Trailing blank lines are ignored. A file with only three populated lines is
//! accepted when the source container name can be recovered from the snapshot
//! name (`{sourceContainer}_{suffix}`).

use crate::constants::{METADATA_FIELD_COUNT, METADATA_MIN_FIELD_COUNT};
use crate::errors::{ReplicationError, Result};
use std::path::Path;

/// Binlog coordinates plus the identity of the source they belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationMetadata {
    /// Binary log file name, e.g. `mysql-bin.000003`
    pub binlog_file: String,
    /// Offset within `binlog_file`
    pub binlog_position: u64,
    /// Address the replica uses to reach the source
    pub source_host: String,
    /// Jail running the source database
    pub source_container: String,
}

impl ReplicationMetadata {
    /// Stand-in used by dry-runs, where no probe runs and no file is read.
    #[must_use]
    pub fn placeholder(source_host: &str, source_container: &str) -> Self {
        Self {
            binlog_file: "<dry-run>".to_string(),
            binlog_position: 0,
            source_host: source_host.to_string(),
            source_container: source_container.to_string(),
        }
    }

    /// Build metadata from the output of `SHOW MASTER STATUS` in batch mode.
    ///
    /// The first non-empty line must carry at least two whitespace-separated
    /// columns: the binlog file and the numeric position.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::MetadataExtraction`] if the output does not
    /// contain a file name and a numeric position.
    pub fn from_master_status(
        output: &str,
        source_host: &str,
        source_container: &str,
    ) -> Result<Self> {
        let extraction_error = |reason: String| ReplicationError::MetadataExtraction {
            container: source_container.to_string(),
            reason,
        };

        let line = output
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| {
                extraction_error(
                    "empty master status output (is binary logging enabled?)".to_string(),
                )
            })?;

        let mut columns = line.split_whitespace();
        let (Some(binlog_file), Some(position)) = (columns.next(), columns.next()) else {
            return Err(extraction_error(format!(
                "expected binlog file and position, got '{line}'"
            )));
        };

        let binlog_position = position.parse::<u64>().map_err(|_| {
            extraction_error(format!("binlog position '{position}' is not a number"))
        })?;

        Ok(Self {
            binlog_file: binlog_file.to_string(),
            binlog_position,
            source_host: source_host.to_string(),
            source_container: source_container.to_string(),
        })
    }

    /// Serialize into the four-line file format.
    #[must_use]
    pub fn to_file_contents(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}\n",
            self.binlog_file, self.binlog_position, self.source_host, self.source_container
        )
    }

    /// Parse the four-line file format.
    ///
    /// `snapshot_name` lets a three-line file recover the source container name.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::MetadataIncomplete`] if fields are missing,
    /// empty, or the position is not a number.
    pub fn parse_file_contents(
        contents: &str,
        path: &Path,
        snapshot_name: Option<&str>,
    ) -> Result<Self> {
        let incomplete = |reason: String| ReplicationError::MetadataIncomplete {
            path: path.to_path_buf(),
            reason,
        };

        let lines: Vec<&str> = contents.trim_end().lines().map(str::trim).collect();
        let populated = lines.iter().filter(|line| !line.is_empty()).count();
        if populated < METADATA_MIN_FIELD_COUNT {
            return Err(incomplete(format!(
                "expected {METADATA_FIELD_COUNT} lines, found {populated}"
            )));
        }

        let field = |index: usize, name: &str| -> Result<String> {
            match lines.get(index) {
                Some(value) if !value.is_empty() => Ok((*value).to_string()),
                _ => Err(incomplete(format!("{name} (line {}) is empty", index + 1))),
            }
        };

        let binlog_file = field(0, "binlog file")?;
        let position = field(1, "binlog position")?;
        let binlog_position = position
            .parse::<u64>()
            .map_err(|_| incomplete(format!("binlog position '{position}' is not a number")))?;
        let source_host = field(2, "source host")?;

        let source_container = match field(3, "source container") {
            Ok(container) => container,
            Err(err) => snapshot_name
                .and_then(container_from_snapshot_name)
                .ok_or(err)?
                .to_string(),
        };

        Ok(Self {
            binlog_file,
            binlog_position,
            source_host,
            source_container,
        })
    }

    /// Read and parse a metadata file.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::MetadataFileMissing`] when the file does not
    /// exist, [`ReplicationError::Io`] when it cannot be read, and
    /// [`ReplicationError::MetadataIncomplete`] when it is malformed.
    pub async fn load(path: &Path, snapshot_name: Option<&str>) -> Result<Self> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ReplicationError::MetadataFileMissing {
                    path: path.to_path_buf(),
                });
            }
            Err(err) => {
                return Err(ReplicationError::io(
                    format!("reading metadata file {}", path.display()),
                    err,
                ));
            }
        };
        Self::parse_file_contents(&contents, path, snapshot_name)
    }
}

/// Source container part of `{sourceContainer}_{suffix}`.
#[must_use]
pub fn container_from_snapshot_name(snapshot_name: &str) -> Option<&str> {
    snapshot_name
        .rsplit_once('_')
        .map(|(container, _suffix)| container)
        .filter(|container| !container.is_empty())
}

#[cfg(test)]
#[path = "metadata_tests.rs"]
mod metadata_tests;
