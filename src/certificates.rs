// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! TLS material for the replication channel.
//!
//! The replica authenticates to the source with a client certificate. The CA,
//! client certificate and client key are placed in the replica jail's
//! certificate directory, owned by the database user and readable only by it.

use crate::config::{CertificateSettings, JailSettings};
use crate::constants::CERT_FILE_MODE;
use crate::errors::Result;
use crate::executor::CommandLine;
use crate::jail::JailRuntime;
use crate::report::Reporter;
use crate::transport::Host;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Copies certificates into a replica jail and locks down their permissions.
pub struct CertificateProvisioner {
    runtime: JailRuntime,
    jails: JailSettings,
    settings: CertificateSettings,
    reporter: Reporter,
}

impl CertificateProvisioner {
    #[must_use]
    pub fn new(
        runtime: JailRuntime,
        jails: JailSettings,
        settings: CertificateSettings,
        reporter: Reporter,
    ) -> Self {
        Self {
            runtime,
            jails,
            settings,
            reporter,
        }
    }

    /// Where the certificates are staged on a remote source host.
    ///
    /// Defaults to the source jail's own certificate directory, seen from the host.
    #[must_use]
    pub fn remote_staging_dir(&self, source_container: &str) -> PathBuf {
        self.settings.remote_staging_dir.clone().unwrap_or_else(|| {
            self.jails
                .path_in_jail(source_container, &self.settings.jail_cert_dir)
        })
    }

    /// Copy the certificates from the source jail on `source`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::errors::ReplicationError::CommandFailed`] if a copy,
    /// `chown` or `chmod` fails.
    pub async fn transfer(
        &self,
        source: &Host,
        source_container: &str,
        target: &str,
    ) -> Result<()> {
        self.reporter.step(format!(
            "Transferring certificates from '{source_container}' on {source} to '{target}'"
        ));
        let staging = self.remote_staging_dir(source_container);
        self.install(source, &staging, target).await
    }

    /// Copy the certificates from this host's trusted directory.
    ///
    /// # Errors
    ///
    /// Returns [`crate::errors::ReplicationError::CommandFailed`] if a copy,
    /// `chown` or `chmod` fails.
    pub async fn transfer_from_local(&self, target: &str) -> Result<()> {
        self.reporter.step(format!(
            "Installing certificates from {} into '{target}'",
            self.settings.local_cert_dir.display()
        ));
        self.install(&Host::Local, &self.settings.local_cert_dir, target)
            .await
    }

    async fn install(&self, from: &Host, from_dir: &Path, target: &str) -> Result<()> {
        let shell = self.runtime.shell();
        let target_dir = self.jails.path_in_jail(target, &self.settings.jail_cert_dir);

        shell
            .run_local(
                CommandLine::new("mkdir")
                    .arg("-p")
                    .arg(target_dir.to_string_lossy()),
            )
            .await?;

        for file in CertificateSettings::file_names() {
            shell
                .copy_from(from, &from_dir.join(file), &target_dir.join(file))
                .await?;
            debug!("Installed {} into {}", file, target_dir.display());
        }

        let jail_dir = self.settings.jail_cert_dir.to_string_lossy().to_string();
        self.runtime
            .exec(
                target,
                "chown",
                ["-R".to_string(), self.settings.owner.clone(), jail_dir],
            )
            .await?;

        let files = [
            self.settings.ca_path(),
            self.settings.cert_path(),
            self.settings.key_path(),
        ];
        self.runtime
            .exec(
                target,
                "chmod",
                std::iter::once(CERT_FILE_MODE.to_string())
                    .chain(files.iter().map(|path| path.to_string_lossy().to_string())),
            )
            .await?;

        self.reporter.result(format!(
            "certificates installed in {} (owner {}, mode {})",
            self.settings.jail_cert_dir.display(),
            self.settings.owner,
            CERT_FILE_MODE
        ));
        Ok(())
    }
}

#[cfg(test)]
#[path = "certificates_tests.rs"]
mod certificates_tests;
