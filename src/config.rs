// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Runtime configuration.
//!
//! [`ReplicatorConfig`] is built once at startup, from an optional YAML file,
//! and handed to the orchestrator. Each component only ever receives its own
//! section, so the settings a component depends on are visible in its
//! constructor signature.
//!
//! ```yaml
//! jails:
//!   jails_root: /iocage/jails
//! network:
//!   subnet_prefix: "10.0.0"
//!   default_router: "10.0.0.1"
//! database:
//!   replication_user: replicator
//! ```
//!
//! Every field is optional; missing fields fall back to the defaults in
//! [`crate::constants`]. The replication password can also be supplied through
//! the `JAILREP_REPLICATION_PASSWORD` environment variable.

use crate::constants::{
    CA_CERT_FILE, CLIENT_CERT_FILE, CLIENT_KEY_FILE, DEFAULT_CERT_OWNER,
    DEFAULT_INSTANCE_IDENTITY_FILE, DEFAULT_JAILS_DATASET, DEFAULT_JAILS_ROOT,
    DEFAULT_JAIL_CERT_DIR, DEFAULT_LOCAL_CERT_DIR, DEFAULT_MYSQL_CONFIG_PATH, DEFAULT_MYSQL_SERVICE,
    DEFAULT_NETWORK_INTERFACE, DEFAULT_OS_RELEASE, DEFAULT_POOL_LOCK_FILE, DEFAULT_PREFIX_LENGTH,
    DEFAULT_PROBE_DATABASE, DEFAULT_PROBE_SETTLE_SECS, DEFAULT_PROBE_TABLE, DEFAULT_RELAY_LOG,
    DEFAULT_REPLICATION_USER, DEFAULT_ROUTER, DEFAULT_SNAPSHOT_DIR, DEFAULT_SUBNET_PREFIX,
    ENV_REPLICATION_PASSWORD, JAIL_CONFIG_FILE, JAIL_ROOT_DIR, POOL_LOCK_TIMEOUT_SECS,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Top-level configuration, one section per component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicatorConfig {
    pub jails: JailSettings,
    pub snapshot: SnapshotSettings,
    pub network: NetworkSettings,
    pub certificates: CertificateSettings,
    pub database: DatabaseSettings,
    pub verification: VerificationSettings,
}

impl ReplicatorConfig {
    /// Load the configuration from `path`, or use defaults when `path` is `None`.
    ///
    /// Environment overrides are applied afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid YAML for
    /// this schema.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                debug!("Loading configuration from {}", path.display());
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_yaml(&contents)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => {
                debug!("No config file given, using built-in defaults");
                Self::default()
            }
        };

        if let Ok(password) = std::env::var(ENV_REPLICATION_PASSWORD) {
            debug!("Replication password taken from {}", ENV_REPLICATION_PASSWORD);
            config.database.replication_password = password;
        }

        Ok(config)
    }

    /// Parse a YAML document; absent fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid YAML for this schema.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).context("Invalid jailrep configuration")
    }
}

/// Where jails live on this host, and how to address files inside them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JailSettings {
    /// Directory with one sub-directory per jail
    pub jails_root: PathBuf,
    /// Allocation lock file; defaults to `.jailrep.lock` under `jails_root`
    pub lock_file: Option<PathBuf>,
    /// How long to wait for another run holding the lock
    pub lock_timeout_secs: u64,
}

impl Default for JailSettings {
    fn default() -> Self {
        Self {
            jails_root: PathBuf::from(DEFAULT_JAILS_ROOT),
            lock_file: None,
            lock_timeout_secs: POOL_LOCK_TIMEOUT_SECS,
        }
    }
}

impl JailSettings {
    #[must_use]
    pub fn jail_dir(&self, name: &str) -> PathBuf {
        self.jails_root.join(name)
    }

    /// `config.json` of the jail.
    #[must_use]
    pub fn config_path(&self, name: &str) -> PathBuf {
        self.jail_dir(name).join(JAIL_CONFIG_FILE)
    }

    /// Filesystem root of the jail as seen from the host.
    #[must_use]
    pub fn root_path(&self, name: &str) -> PathBuf {
        self.jail_dir(name).join(JAIL_ROOT_DIR)
    }

    /// Translate an absolute path inside the jail into a host path.
    #[must_use]
    pub fn path_in_jail(&self, name: &str, inner: &Path) -> PathBuf {
        let relative = inner.strip_prefix("/").unwrap_or(inner);
        self.root_path(name).join(relative)
    }

    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.lock_file
            .clone()
            .unwrap_or_else(|| self.jails_root.join(DEFAULT_POOL_LOCK_FILE))
    }

    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

/// Snapshot transfer layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSettings {
    /// Directory for transfer and metadata files, same path on every host
    pub snapshot_dir: PathBuf,
    /// Dataset that parents every jail dataset, same on every host
    pub jails_dataset: String,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            snapshot_dir: PathBuf::from(DEFAULT_SNAPSHOT_DIR),
            jails_dataset: DEFAULT_JAILS_DATASET.to_string(),
        }
    }
}

impl SnapshotSettings {
    /// Dataset backing the named jail.
    #[must_use]
    pub fn dataset(&self, container: &str) -> String {
        format!("{}/{}", self.jails_dataset, container)
    }
}

/// Values written into the replica's jail configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub interface: String,
    /// First three octets of the jail network
    pub subnet_prefix: String,
    pub prefix_length: u8,
    pub default_router: String,
    pub os_release: String,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            interface: DEFAULT_NETWORK_INTERFACE.to_string(),
            subnet_prefix: DEFAULT_SUBNET_PREFIX.to_string(),
            prefix_length: DEFAULT_PREFIX_LENGTH,
            default_router: DEFAULT_ROUTER.to_string(),
            os_release: DEFAULT_OS_RELEASE.to_string(),
        }
    }
}

/// TLS material placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateSettings {
    /// Directory inside the jail holding CA, certificate and key
    pub jail_cert_dir: PathBuf,
    /// Trusted directory on this host used by local provisioning
    pub local_cert_dir: PathBuf,
    /// Staging directory on the source host; defaults to the source jail's cert dir
    pub remote_staging_dir: Option<PathBuf>,
    /// `user:group` owning the files inside the jail
    pub owner: String,
}

impl Default for CertificateSettings {
    fn default() -> Self {
        Self {
            jail_cert_dir: PathBuf::from(DEFAULT_JAIL_CERT_DIR),
            local_cert_dir: PathBuf::from(DEFAULT_LOCAL_CERT_DIR),
            remote_staging_dir: None,
            owner: DEFAULT_CERT_OWNER.to_string(),
        }
    }
}

impl CertificateSettings {
    /// The three TLS file names, in CA, certificate, key order.
    #[must_use]
    pub fn file_names() -> [&'static str; 3] {
        [CA_CERT_FILE, CLIENT_CERT_FILE, CLIENT_KEY_FILE]
    }

    #[must_use]
    pub fn ca_path(&self) -> PathBuf {
        self.jail_cert_dir.join(CA_CERT_FILE)
    }

    #[must_use]
    pub fn cert_path(&self) -> PathBuf {
        self.jail_cert_dir.join(CLIENT_CERT_FILE)
    }

    #[must_use]
    pub fn key_path(&self) -> PathBuf {
        self.jail_cert_dir.join(CLIENT_KEY_FILE)
    }
}

/// MySQL settings for the replica.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// `my.cnf` path inside the jail
    pub config_path: PathBuf,
    /// rc service name
    pub service: String,
    /// Instance identity file inside the jail (`auto.cnf`)
    pub instance_identity_file: PathBuf,
    /// Relay log basename written when `relay-log` is absent
    pub relay_log: String,
    pub replication_user: String,
    pub replication_password: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_MYSQL_CONFIG_PATH),
            service: DEFAULT_MYSQL_SERVICE.to_string(),
            instance_identity_file: PathBuf::from(DEFAULT_INSTANCE_IDENTITY_FILE),
            relay_log: DEFAULT_RELAY_LOG.to_string(),
            replication_user: DEFAULT_REPLICATION_USER.to_string(),
            replication_password: String::new(),
        }
    }
}

// Keep the password out of logs.
impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("config_path", &self.config_path)
            .field("service", &self.service)
            .field("instance_identity_file", &self.instance_identity_file)
            .field("relay_log", &self.relay_log)
            .field("replication_user", &self.replication_user)
            .field("replication_password", &"<redacted>")
            .finish()
    }
}

/// End-to-end probe settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSettings {
    pub probe_database: String,
    pub probe_table: String,
    /// Seconds to wait between writing on the source and reading on the replica
    pub settle_secs: u64,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            probe_database: DEFAULT_PROBE_DATABASE.to_string(),
            probe_table: DEFAULT_PROBE_TABLE.to_string(),
            settle_secs: DEFAULT_PROBE_SETTLE_SECS,
        }
    }
}

impl VerificationSettings {
    #[must_use]
    pub fn settle_interval(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    /// `database.table` of the probe table.
    #[must_use]
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.probe_database, self.probe_table)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
