// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Turning the cloned MySQL instance into a replica.
//!
//! Three stages, run in order by [`DatabaseConfigurator::configure`]:
//!
//! 1. **Config**: upsert `server-id`, TLS paths and `relay-log` in the jail's
//!    `my.cnf` (see [`mycnf`]). The new `server-id` is the lowest free value
//!    across sibling jails, never the one inherited from the source.
//! 2. **Restart**: stop MySQL, delete the instance identity file (`auto.cnf`)
//!    so the clone gets a fresh server UUID, start MySQL.
//! 3. **Replication**: write the setup script (see [`script`]) to a temporary
//!    file inside the jail, run it through `mysql`, remove the file.

pub mod mycnf;
pub mod script;

use crate::allocator::{first_free, server_id, used_server_ids};
use crate::config::{CertificateSettings, DatabaseSettings, JailSettings};
use crate::constants::{MYSQL, SERVER_ID_MAX, SERVER_ID_MIN};
use crate::errors::{ReplicationError, Result};
use crate::jail::JailRuntime;
use crate::metadata::ReplicationMetadata;
use crate::report::Reporter;
use mycnf::MyCnfEdits;
use std::io::Write as _;
use std::path::Path;
use tracing::{debug, info, warn};

/// Configures MySQL inside a replica jail.
pub struct DatabaseConfigurator {
    runtime: JailRuntime,
    jails: JailSettings,
    settings: DatabaseSettings,
    certificates: CertificateSettings,
    reporter: Reporter,
}

impl DatabaseConfigurator {
    #[must_use]
    pub fn new(
        runtime: JailRuntime,
        jails: JailSettings,
        settings: DatabaseSettings,
        certificates: CertificateSettings,
        reporter: Reporter,
    ) -> Self {
        Self {
            runtime,
            jails,
            settings,
            certificates,
            reporter,
        }
    }

    /// Configure, restart and start replicating from `metadata`.
    ///
    /// Returns the `server-id` written, or `None` in dry-run.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::ResourceExhausted`] when no `server-id` is
    /// free, [`ReplicationError::ConfigNotFound`]/[`ReplicationError::Io`] for
    /// `my.cnf` access problems, and [`ReplicationError::CommandFailed`] when a
    /// service or `mysql` command fails.
    pub async fn configure(
        &self,
        target: &str,
        snapshot_name: &str,
        metadata: &ReplicationMetadata,
    ) -> Result<Option<u32>> {
        info!(
            "Configuring database in '{}' from snapshot '{}'",
            target, snapshot_name
        );
        let server_id = self.update_config(target).await?;
        self.restart_with_fresh_identity(target).await?;
        self.inject_replication(target, metadata).await?;
        Ok(server_id)
    }

    /// Rewrite `my.cnf` with a freshly allocated `server-id`.
    ///
    /// # Errors
    ///
    /// See [`DatabaseConfigurator::configure`].
    pub async fn update_config(&self, target: &str) -> Result<Option<u32>> {
        let path = self.jails.path_in_jail(target, &self.settings.config_path);
        self.reporter
            .step(format!("Updating MySQL configuration {}", path.display()));

        if self.runtime.shell().is_dry_run() {
            self.reporter.result(format!(
                "would set server-id, TLS paths and relay log in {}",
                path.display()
            ));
            return Ok(None);
        }

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ReplicationError::ConfigNotFound { path });
            }
            Err(err) => {
                return Err(ReplicationError::io(
                    format!("reading {}", path.display()),
                    err,
                ))
            }
        };

        let mut used = used_server_ids(&self.jails, &self.settings.config_path, target)?;
        // The clone still carries the source's id.
        if let Some(inherited) = server_id(&contents) {
            used.insert(inherited);
        }
        let id = first_free(&used, SERVER_ID_MIN, SERVER_ID_MAX, "server-id")?;
        debug!("server-ids in use: {:?}, picked {}", used, id);

        let ca = self.certificates.ca_path();
        let cert = self.certificates.cert_path();
        let key = self.certificates.key_path();
        let updated = mycnf::apply(
            &contents,
            &MyCnfEdits {
                server_id: id,
                ssl_ca: &ca,
                ssl_cert: &cert,
                ssl_key: &key,
                relay_log: &self.settings.relay_log,
            },
        );
        tokio::fs::write(&path, updated)
            .await
            .map_err(|e| ReplicationError::io(format!("writing {}", path.display()), e))?;

        self.reporter.result(format!("server-id = {id}"));
        Ok(Some(id))
    }

    /// Stop MySQL, drop the instance identity file, start MySQL.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::CommandFailed`] if a service command fails.
    pub async fn restart_with_fresh_identity(&self, target: &str) -> Result<()> {
        self.reporter
            .step(format!("Restarting MySQL in '{target}' with a new server UUID"));
        let service = &self.settings.service;
        self.runtime.service(target, service, "stop").await?;
        self.runtime
            .exec(
                target,
                "rm",
                [
                    "-f".to_string(),
                    self.settings
                        .instance_identity_file
                        .to_string_lossy()
                        .to_string(),
                ],
            )
            .await?;
        self.runtime.service(target, service, "start").await?;
        Ok(())
    }

    /// Run the replication setup script inside the jail.
    ///
    /// The temporary script file is removed whether or not `mysql` succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::Io`] if the script cannot be staged and
    /// [`ReplicationError::CommandFailed`] if `mysql` fails.
    pub async fn inject_replication(
        &self,
        target: &str,
        metadata: &ReplicationMetadata,
    ) -> Result<()> {
        self.reporter.step(format!(
            "Pointing '{target}' at {} ({} @ {})",
            metadata.source_host, metadata.binlog_file, metadata.binlog_position
        ));
        let sql = script::replication_script(metadata, &self.settings, &self.certificates);
        debug!("Replication script:\n{}", script::redacted(&sql, &self.settings));

        if self.runtime.shell().is_dry_run() {
            self.runtime
                .exec(target, MYSQL, ["-e", "source <replication script>"])
                .await?;
            return Ok(());
        }

        let tmp_dir = self.jails.path_in_jail(target, Path::new("/tmp"));
        tokio::fs::create_dir_all(&tmp_dir)
            .await
            .map_err(|e| ReplicationError::io(format!("creating {}", tmp_dir.display()), e))?;
        let mut staged = tempfile::Builder::new()
            .prefix("jailrep-")
            .suffix(".sql")
            .tempfile_in(&tmp_dir)
            .map_err(|e| ReplicationError::io("creating replication script", e))?;
        staged
            .write_all(sql.as_bytes())
            .and_then(|()| staged.flush())
            .map_err(|e| ReplicationError::io("writing replication script", e))?;

        let file_name = staged
            .path()
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let result = self
            .runtime
            .exec(target, MYSQL, ["-e".to_string(), format!("source /tmp/{file_name}")])
            .await;

        if let Err(e) = staged.close() {
            warn!("Failed to remove temporary replication script: {}", e);
        }

        let output = result?;
        debug!("Replica status after setup:\n{}", output.stdout);
        self.reporter.result("replication configured");
        Ok(())
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
