// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Provisioning orchestration.
//!
//! A run is a single forward pass through [`ProvisionState`]:
//!
//! ```text
//! Requested -> JailChecked -> SnapshotReady -> ContainerConfigured
//!   -> ContainerRunning -> CertificatesTransferred -> DatabaseConfigured
//!   -> Verified
//! ```
//!
//! Any error moves the run to [`ProvisionState::Failed`] and aborts it. There is
//! no rollback: state mutated so far is left in place and a later run with
//! `force` starts over by destroying the target.
//!
//! The allocation pool lock is taken once the snapshot is in place and held
//! until the database step has written the new `server-id`.

pub mod strategy;

use crate::allocator::PoolLock;
use crate::certificates::CertificateProvisioner;
use crate::config::ReplicatorConfig;
use crate::container::ContainerConfigurator;
use crate::database::DatabaseConfigurator;
use crate::errors::{ReplicationError, Result};
use crate::executor::BoxedExecutor;
use crate::jail::JailRuntime;
use crate::metadata::ReplicationMetadata;
use crate::report::Reporter;
use crate::request::ReplicationRequest;
use crate::snapshot::{SnapshotManager, SnapshotRecord};
use crate::transport::{Host, Shell};
use crate::verifier::{ReplicationVerifier, VerificationOutcome};
use std::fmt;
use std::sync::Arc;
use strategy::{snapshot_source, SnapshotSource};
use tracing::{error, info};

/// Stage reached by a provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionState {
    Requested,
    JailChecked,
    SnapshotReady,
    ContainerConfigured,
    ContainerRunning,
    CertificatesTransferred,
    DatabaseConfigured,
    Verified,
    Failed,
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct ProvisionReport {
    pub target: String,
    pub snapshot: SnapshotRecord,
    pub metadata: ReplicationMetadata,
    /// `None` in dry-run
    pub server_id: Option<u32>,
    pub verification: VerificationOutcome,
}

/// Drives one provisioning run.
pub struct Replicator {
    request: ReplicationRequest,
    config: ReplicatorConfig,
    reporter: Reporter,
    runtime: JailRuntime,
    source: Box<dyn SnapshotSource>,
    containers: ContainerConfigurator,
    databases: DatabaseConfigurator,
    verifier: ReplicationVerifier,
    history: Vec<ProvisionState>,
}

impl Replicator {
    /// Wire every component for `request`.
    #[must_use]
    pub fn new(
        request: ReplicationRequest,
        config: ReplicatorConfig,
        executor: BoxedExecutor,
        reporter: Reporter,
    ) -> Self {
        let shell = Shell::new(executor, request.ssh_identity.clone(), request.dry_run);
        let runtime = JailRuntime::new(shell.clone(), Host::Local);

        let snapshots =
            SnapshotManager::new(shell.clone(), config.snapshot.clone(), reporter.clone());
        let certificates = Arc::new(CertificateProvisioner::new(
            runtime.clone(),
            config.jails.clone(),
            config.certificates.clone(),
            reporter.clone(),
        ));
        let source = snapshot_source(&request, snapshots, certificates);

        let containers = ContainerConfigurator::new(
            runtime.clone(),
            config.jails.clone(),
            config.network.clone(),
            config.snapshot.jails_dataset.clone(),
            reporter.clone(),
        );
        let databases = DatabaseConfigurator::new(
            runtime.clone(),
            config.jails.clone(),
            config.database.clone(),
            config.certificates.clone(),
            reporter.clone(),
        );
        let verifier = ReplicationVerifier::new(
            shell,
            config.verification.clone(),
            reporter.clone(),
            request.skip_verification,
        );

        Self {
            request,
            config,
            reporter,
            runtime,
            source,
            containers,
            databases,
            verifier,
            history: vec![ProvisionState::Requested],
        }
    }

    /// Current stage.
    #[must_use]
    pub fn state(&self) -> ProvisionState {
        self.history
            .last()
            .copied()
            .unwrap_or(ProvisionState::Requested)
    }

    /// Every stage entered so far, in order.
    #[must_use]
    pub fn history(&self) -> &[ProvisionState] {
        &self.history
    }

    fn advance(&mut self, state: ProvisionState) {
        info!("Provisioning '{}': {}", self.request.target, state);
        self.history.push(state);
    }

    /// Run every stage, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Returns the first [`ReplicationError`] raised by any stage.
    pub async fn run(&mut self) -> Result<ProvisionReport> {
        info!(
            "Provisioning '{}' from {}{}",
            self.request.target,
            self.source.describe(),
            if self.request.dry_run { " (dry-run)" } else { "" }
        );
        match self.provision().await {
            Ok(report) => Ok(report),
            Err(e) => {
                error!(
                    "Provisioning '{}' failed in state {}: {}",
                    self.request.target,
                    self.state(),
                    e
                );
                self.advance(ProvisionState::Failed);
                Err(e)
            }
        }
    }

    async fn provision(&mut self) -> Result<ProvisionReport> {
        let target = self.request.target.clone();
        let dry_run = self.request.dry_run;

        // Requested -> JailChecked
        self.reporter
            .step(format!("Checking whether jail '{target}' exists"));
        let exists = self.runtime.exists(&target).await?;
        if exists && !self.request.force {
            return Err(ReplicationError::TargetExists { container: target });
        }
        if exists {
            self.reporter
                .step(format!("Destroying existing jail '{target}' (--force)"));
            self.runtime.destroy(&target).await?;
        }
        self.advance(ProvisionState::JailChecked);

        // JailChecked -> SnapshotReady
        let (snapshot, metadata) = self.source.prepare_snapshot(&target).await?;
        self.advance(ProvisionState::SnapshotReady);

        let lock = if dry_run {
            None
        } else {
            let path = self.config.jails.lock_path();
            Some(PoolLock::acquire(&path, self.config.jails.lock_timeout()).await?)
        };

        // SnapshotReady -> ContainerConfigured
        self.check_root(&target)?;
        self.containers.configure(&target).await?;
        self.advance(ProvisionState::ContainerConfigured);

        // ContainerConfigured -> ContainerRunning
        self.reporter.step(format!("Starting jail '{target}'"));
        self.runtime.start(&target).await?;
        self.advance(ProvisionState::ContainerRunning);

        // ContainerRunning -> CertificatesTransferred
        self.source.transfer_certificates(&target).await?;
        self.advance(ProvisionState::CertificatesTransferred);

        // CertificatesTransferred -> DatabaseConfigured
        let server_id = self
            .databases
            .configure(&target, &snapshot.name, &metadata)
            .await?;
        drop(lock);
        self.advance(ProvisionState::DatabaseConfigured);

        // DatabaseConfigured -> Verified
        let verification = self
            .verifier
            .verify(
                &Host::parse(&metadata.source_host),
                &metadata.source_container,
                &target,
            )
            .await?;
        self.advance(ProvisionState::Verified);

        self.reporter.result(format!("jail '{target}' provisioned"));
        Ok(ProvisionReport {
            target,
            snapshot,
            metadata,
            server_id,
            verification,
        })
    }

    /// The received dataset must have produced the jail's root filesystem.
    fn check_root(&self, target: &str) -> Result<()> {
        let root = self.config.jails.root_path(target);
        self.reporter
            .step(format!("Checking root filesystem {}", root.display()));
        if self.request.dry_run {
            self.reporter.result("skipped (dry-run)");
            return Ok(());
        }
        if !root.is_dir() {
            return Err(ReplicationError::RootMissing {
                container: target.to_string(),
                path: root,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
