// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Where the snapshot comes from.
//!
//! A remote source snapshots a live jail over SSH and ships the result here; a
//! local source uses transfer and metadata files already staged on this host.
//! Everything after the snapshot is identical, so the orchestrator only sees
//! the [`SnapshotSource`] trait.
//!
//! Both variants parse the metadata file on this host before `zfs receive -F`
//! replaces anything.

use crate::certificates::CertificateProvisioner;
use crate::errors::Result;
use crate::metadata::{container_from_snapshot_name, ReplicationMetadata};
use crate::request::ReplicationRequest;
use crate::snapshot::{timestamp_suffix, SnapshotManager, SnapshotRecord};
use crate::transport::Host;
use async_trait::async_trait;
use std::sync::Arc;

/// How a provisioning run obtains its snapshot and certificates.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Short description for the step trace.
    fn describe(&self) -> String;

    /// Metadata stand-in used by dry-runs.
    fn placeholder_metadata(&self) -> ReplicationMetadata;

    /// Make the snapshot available on this host and receive it into `target`.
    ///
    /// Returns the record as it exists on this host with its parsed metadata.
    async fn prepare_snapshot(&self, target: &str) -> Result<(SnapshotRecord, ReplicationMetadata)>;

    /// Install the replication TLS material into `target`.
    async fn transfer_certificates(&self, target: &str) -> Result<()>;
}

/// Snapshot a live jail on another host.
pub struct RemoteSource {
    host: Host,
    container: String,
    snapshots: SnapshotManager,
    certificates: Arc<CertificateProvisioner>,
}

impl RemoteSource {
    #[must_use]
    pub fn new(
        host: Host,
        container: impl Into<String>,
        snapshots: SnapshotManager,
        certificates: Arc<CertificateProvisioner>,
    ) -> Self {
        Self {
            host,
            container: container.into(),
            snapshots,
            certificates,
        }
    }
}

#[async_trait]
impl SnapshotSource for RemoteSource {
    fn describe(&self) -> String {
        format!("jail '{}' on {}", self.container, self.host)
    }

    fn placeholder_metadata(&self) -> ReplicationMetadata {
        ReplicationMetadata::placeholder(self.host.address(), &self.container)
    }

    async fn prepare_snapshot(
        &self,
        target: &str,
    ) -> Result<(SnapshotRecord, ReplicationMetadata)> {
        let suffix = timestamp_suffix();
        let remote = self
            .snapshots
            .create_and_export(&self.host, &self.container, &suffix)
            .await?;
        self.snapshots
            .verify_remote_artifacts(&self.host, &remote)
            .await?;
        let local = self.snapshots.fetch(&self.host, &remote).await?;
        let metadata = self
            .snapshots
            .read_metadata(&local, self.placeholder_metadata())
            .await?;
        self.snapshots.receive(&local, target).await?;
        Ok((local, metadata))
    }

    async fn transfer_certificates(&self, target: &str) -> Result<()> {
        self.certificates
            .transfer(&self.host, &self.container, target)
            .await
    }
}

/// Use a snapshot already staged in this host's snapshot directory.
pub struct LocalSource {
    snapshot_name: String,
    snapshots: SnapshotManager,
    certificates: Arc<CertificateProvisioner>,
}

impl LocalSource {
    #[must_use]
    pub fn new(
        snapshot_name: impl Into<String>,
        snapshots: SnapshotManager,
        certificates: Arc<CertificateProvisioner>,
    ) -> Self {
        Self {
            snapshot_name: snapshot_name.into(),
            snapshots,
            certificates,
        }
    }
}

#[async_trait]
impl SnapshotSource for LocalSource {
    fn describe(&self) -> String {
        format!("local snapshot '{}'", self.snapshot_name)
    }

    fn placeholder_metadata(&self) -> ReplicationMetadata {
        let container =
            container_from_snapshot_name(&self.snapshot_name).unwrap_or(&self.snapshot_name);
        ReplicationMetadata::placeholder(Host::Local.address(), container)
    }

    async fn prepare_snapshot(
        &self,
        target: &str,
    ) -> Result<(SnapshotRecord, ReplicationMetadata)> {
        let record = self.snapshots.record(&self.snapshot_name);
        self.snapshots.verify_local_artifacts(&record).await?;
        let metadata = self
            .snapshots
            .read_metadata(&record, self.placeholder_metadata())
            .await?;
        self.snapshots.receive(&record, target).await?;
        Ok((record, metadata))
    }

    async fn transfer_certificates(&self, target: &str) -> Result<()> {
        self.certificates.transfer_from_local(target).await
    }
}

/// Pick the source variant for `request`.
#[must_use]
pub fn snapshot_source(
    request: &ReplicationRequest,
    snapshots: SnapshotManager,
    certificates: Arc<CertificateProvisioner>,
) -> Box<dyn SnapshotSource> {
    if request.is_local_source() {
        Box::new(LocalSource::new(
            request.source.name.clone(),
            snapshots,
            certificates,
        ))
    } else {
        Box::new(RemoteSource::new(
            request.source.host.clone(),
            request.source.name.clone(),
            snapshots,
            certificates,
        ))
    }
}
