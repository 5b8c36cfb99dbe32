// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! ZFS snapshot creation, export and import.
//!
//! A provisioning attempt is identified by a [`SnapshotRecord`]. Two related
//! but different strings address it:
//!
//! - the snapshot name `{sourceContainer}_{suffix}`, which names the transfer
//!   file (`.zfs`) and the metadata file (`.meta`) in the snapshot directory;
//! - the ZFS tag `{dataset}/{sourceContainer}@{suffix}`, which names the
//!   recursive snapshot on the source pool.
//!
//! On the source the binlog coordinates are read *before* the snapshot is
//! taken, so the metadata always describes the data in the stream.

use crate::config::SnapshotSettings;
use crate::constants::{
    MYSQL, SNAPSHOT_DATA_EXTENSION, SNAPSHOT_METADATA_EXTENSION, SNAPSHOT_SUFFIX_FORMAT, ZFS,
};
use crate::errors::{ReplicationError, Result};
use crate::executor::CommandLine;
use crate::jail::exec_command;
use crate::metadata::ReplicationMetadata;
use crate::report::Reporter;
use crate::transport::{Host, Shell};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Query returning the current binlog file and position in batch mode.
const MASTER_STATUS_QUERY: &str = "SHOW MASTER STATUS";

/// Files making up one exported snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    /// `{sourceContainer}_{suffix}`
    pub name: String,
    /// Serialized `zfs send` stream
    pub data_file_path: PathBuf,
    /// Four-line replication metadata file
    pub metadata_file_path: PathBuf,
}

impl SnapshotRecord {
    /// Record for an existing snapshot name inside `snapshot_dir`.
    #[must_use]
    pub fn from_name(snapshot_dir: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            data_file_path: snapshot_dir.join(format!("{name}.{SNAPSHOT_DATA_EXTENSION}")),
            metadata_file_path: snapshot_dir.join(format!("{name}.{SNAPSHOT_METADATA_EXTENSION}")),
        }
    }

    /// Same record relocated to another directory (e.g. after copying to this host).
    #[must_use]
    pub fn relocated(&self, snapshot_dir: &Path) -> Self {
        Self::from_name(snapshot_dir, &self.name)
    }
}

/// `{sourceContainer}_{suffix}`
#[must_use]
pub fn snapshot_name(container: &str, suffix: &str) -> String {
    format!("{container}_{suffix}")
}

/// ZFS tag `{dataset}@{suffix}` of the recursive snapshot.
#[must_use]
pub fn snapshot_tag(dataset: &str, suffix: &str) -> String {
    format!("{dataset}@{suffix}")
}

/// Timestamp suffix for a new snapshot, in local time.
#[must_use]
pub fn timestamp_suffix() -> String {
    chrono::Local::now().format(SNAPSHOT_SUFFIX_FORMAT).to_string()
}

/// Creates, ships and receives snapshots.
#[derive(Clone)]
pub struct SnapshotManager {
    shell: Shell,
    settings: SnapshotSettings,
    reporter: Reporter,
}

impl SnapshotManager {
    #[must_use]
    pub fn new(shell: Shell, settings: SnapshotSettings, reporter: Reporter) -> Self {
        Self {
            shell,
            settings,
            reporter,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &SnapshotSettings {
        &self.settings
    }

    /// Record for `name` in this host's snapshot directory.
    #[must_use]
    pub fn record(&self, name: &str) -> SnapshotRecord {
        SnapshotRecord::from_name(&self.settings.snapshot_dir, name)
    }

    /// Probe binlog coordinates, snapshot the source dataset, export it and
    /// write the metadata file next to the stream on `source`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::MetadataExtraction`] when the coordinate
    /// probe cannot be parsed (nothing has been touched at that point), or
    /// [`ReplicationError::CommandFailed`] when a ZFS or shell command fails.
    pub async fn create_and_export(
        &self,
        source: &Host,
        container: &str,
        suffix: &str,
    ) -> Result<SnapshotRecord> {
        let record = self.record(&snapshot_name(container, suffix));
        let dataset = self.settings.dataset(container);
        let tag = snapshot_tag(&dataset, suffix);

        self.reporter.step(format!(
            "Reading binlog coordinates of '{container}' on {source}"
        ));
        let output = self
            .shell
            .run(source, master_status_command(container))
            .await?;
        let metadata = if self.shell.is_dry_run() {
            ReplicationMetadata::placeholder(source.address(), container)
        } else {
            ReplicationMetadata::from_master_status(&output.stdout, source.address(), container)?
        };
        self.reporter.result(format!(
            "binlog {} at position {}",
            metadata.binlog_file, metadata.binlog_position
        ));

        self.reporter
            .step(format!("Creating snapshot {tag} on {source}"));
        self.shell
            .run(
                source,
                CommandLine::new(ZFS)
                    .args(["snapshot", "-r"])
                    .arg(&tag)
                    .describe(format!("Snapshotting {dataset}")),
            )
            .await?;

        self.reporter.step(format!(
            "Exporting snapshot to {}",
            record.data_file_path.display()
        ));
        self.shell
            .run(
                source,
                CommandLine::new("mkdir")
                    .arg("-p")
                    .arg(self.settings.snapshot_dir.to_string_lossy()),
            )
            .await?;
        self.shell
            .run(
                source,
                CommandLine::new(ZFS)
                    .args(["send", "-R"])
                    .arg(&tag)
                    .stdout_to(&record.data_file_path)
                    .describe(format!("Serializing {tag}")),
            )
            .await?;

        self.reporter.step(format!(
            "Writing replication metadata to {}",
            record.metadata_file_path.display()
        ));
        self.shell
            .run(
                source,
                CommandLine::new("printf")
                    .arg("%s")
                    .arg(metadata.to_file_contents())
                    .stdout_to(&record.metadata_file_path)
                    .describe(format!("Recording metadata for {}", record.name)),
            )
            .await?;

        info!("Exported snapshot {} on {}", record.name, source);
        Ok(record)
    }

    /// Check that both artifacts of `record` exist on `source`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::SnapshotNotFound`] naming the first missing file.
    pub async fn verify_remote_artifacts(
        &self,
        source: &Host,
        record: &SnapshotRecord,
    ) -> Result<()> {
        self.reporter
            .step(format!("Verifying snapshot '{}' on {source}", record.name));
        for path in [&record.data_file_path, &record.metadata_file_path] {
            if !self.shell.file_exists(source, path).await? {
                return Err(not_found(record, source.address(), path));
            }
            debug!("Found {} on {}", path.display(), source);
        }
        self.reporter.result("transfer and metadata files present");
        Ok(())
    }

    /// Copy the artifacts from `source` to this host's snapshot directory.
    ///
    /// Nothing is copied for a local source. Returns the record as it exists
    /// on this host.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::CommandFailed`] if a copy fails.
    pub async fn fetch(&self, source: &Host, record: &SnapshotRecord) -> Result<SnapshotRecord> {
        let local = record.relocated(&self.settings.snapshot_dir);
        if source.is_local() {
            return Ok(local);
        }

        self.reporter
            .step(format!("Copying snapshot '{}' from {source}", record.name));
        self.shell
            .run_local(
                CommandLine::new("mkdir")
                    .arg("-p")
                    .arg(self.settings.snapshot_dir.to_string_lossy()),
            )
            .await?;
        self.shell
            .copy_from(source, &record.data_file_path, &local.data_file_path)
            .await?;
        self.shell
            .copy_from(source, &record.metadata_file_path, &local.metadata_file_path)
            .await?;
        Ok(local)
    }

    /// Parse the metadata file of a record on this host.
    ///
    /// In dry-run a missing file yields `placeholder`, since nothing was
    /// exported or copied.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::MetadataFileMissing`] or
    /// [`ReplicationError::MetadataIncomplete`] when the file is absent or
    /// malformed.
    pub async fn read_metadata(
        &self,
        record: &SnapshotRecord,
        placeholder: ReplicationMetadata,
    ) -> Result<ReplicationMetadata> {
        self.reporter.step(format!(
            "Loading replication metadata {}",
            record.metadata_file_path.display()
        ));
        let loaded =
            ReplicationMetadata::load(&record.metadata_file_path, Some(&record.name)).await;
        let metadata = match loaded {
            Ok(metadata) => metadata,
            Err(ReplicationError::MetadataFileMissing { .. }) if self.shell.is_dry_run() => {
                self.reporter
                    .result("metadata file not present (dry-run), using placeholder");
                placeholder
            }
            Err(e) => return Err(e),
        };
        self.reporter.result(format!(
            "{} @ {} from '{}' on {}",
            metadata.binlog_file,
            metadata.binlog_position,
            metadata.source_container,
            metadata.source_host
        ));
        Ok(metadata)
    }

    /// Receive the local transfer file into the target jail's dataset,
    /// replacing whatever is there.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::CommandFailed`] if `zfs receive` fails.
    pub async fn receive(&self, local: &SnapshotRecord, target: &str) -> Result<()> {
        let dataset = self.settings.dataset(target);
        self.reporter
            .step(format!("Receiving snapshot '{}' into {dataset}", local.name));
        self.shell
            .run_local(
                CommandLine::new(ZFS)
                    .args(["receive", "-F"])
                    .arg(&dataset)
                    .stdin_from(&local.data_file_path)
                    .describe(format!(
                        "Restoring {} as {dataset}",
                        local.data_file_path.display()
                    )),
            )
            .await?;
        Ok(())
    }

    /// Check that both artifacts of `record` exist on this host.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::SnapshotNotFound`] naming the first missing file.
    pub async fn verify_local_artifacts(&self, record: &SnapshotRecord) -> Result<()> {
        self.reporter
            .step(format!("Verifying local snapshot '{}'", record.name));
        if self.shell.is_dry_run() {
            self.reporter.result(format!(
                "would check {} and {}",
                record.data_file_path.display(),
                record.metadata_file_path.display()
            ));
            return Ok(());
        }
        for path in [&record.data_file_path, &record.metadata_file_path] {
            let exists = tokio::fs::try_exists(path).await.map_err(|e| {
                ReplicationError::io(format!("checking {}", path.display()), e)
            })?;
            if !exists {
                return Err(not_found(record, "localhost", path));
            }
        }
        self.reporter.result("transfer and metadata files present");
        Ok(())
    }
}

fn master_status_command(container: &str) -> CommandLine {
    exec_command(container, MYSQL, ["-N", "-B", "-e", MASTER_STATUS_QUERY])
        .describe(format!("Probing master status in '{container}'"))
}

fn not_found(record: &SnapshotRecord, location: &str, path: &Path) -> ReplicationError {
    ReplicationError::SnapshotNotFound {
        snapshot: record.name.clone(),
        location: location.to_string(),
        path: path.to_path_buf(),
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod snapshot_tests;
