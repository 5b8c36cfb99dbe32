// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Rewriting a received jail's iocage configuration.
//!
//! After `zfs receive` the target jail carries a copy of the source's
//! `config.json`. [`ContainerConfigurator::configure`] gives it its own
//! identity: a free IP on the jail network, hostname and UUID derived from the
//! jail name, its own dataset path and autostart at boot.
//!
//! Keys this crate does not manage are preserved as-is.

use crate::allocator::{first_free, used_ip_suffixes};
use crate::config::{JailSettings, NetworkSettings};
use crate::constants::{IP_SUFFIX_MAX, IP_SUFFIX_MIN};
use crate::errors::{ReplicationError, Result};
use crate::jail::JailRuntime;
use crate::report::Reporter;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// The fields of an iocage `config.json` that provisioning sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// `<iface>|10.0.0.N/24`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip4_addr: Option<String>,

    #[serde(default, with = "flag")]
    pub boot: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaultrouter: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_hostname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_hostuuid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jail_zfs_dataset: Option<String>,

    #[serde(default, with = "flag")]
    pub allow_raw_sockets: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,

    /// Everything else iocage keeps in the document
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ContainerConfig {
    /// Read and parse `config.json`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::ConfigNotFound`] if the file does not exist
    /// and [`ReplicationError::ConfigParse`] if it is not a valid document.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ReplicationError::ConfigNotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(err) => {
                return Err(ReplicationError::io(
                    format!("reading {}", path.display()),
                    err,
                ));
            }
        };
        serde_json::from_str(&contents).map_err(|e| ReplicationError::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Write the document back, pretty-printed like iocage does.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::Io`] if the file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let mut contents = serde_json::to_string_pretty(self).map_err(|e| {
            ReplicationError::ConfigParse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        contents.push('\n');
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| ReplicationError::io(format!("writing {}", path.display()), e))
    }
}

/// Hostname for a jail: underscores are not valid in hostnames.
#[must_use]
pub fn hostname_for(container: &str) -> String {
    container.replace('_', "-")
}

/// Configures a freshly received jail.
pub struct ContainerConfigurator {
    runtime: JailRuntime,
    jails: JailSettings,
    network: NetworkSettings,
    jails_dataset: String,
    reporter: Reporter,
}

impl ContainerConfigurator {
    #[must_use]
    pub fn new(
        runtime: JailRuntime,
        jails: JailSettings,
        network: NetworkSettings,
        jails_dataset: impl Into<String>,
        reporter: Reporter,
    ) -> Self {
        Self {
            runtime,
            jails,
            network,
            jails_dataset: jails_dataset.into(),
            reporter,
        }
    }

    /// Give `container` its own network identity and enable autostart.
    ///
    /// In dry-run nothing is read, allocated or written.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::ConfigNotFound`]/[`ReplicationError::ConfigParse`]
    /// for a missing or malformed document, [`ReplicationError::ResourceExhausted`]
    /// when no IP suffix is free, and [`ReplicationError::CommandFailed`] if
    /// `iocage set` fails.
    pub async fn configure(&self, container: &str) -> Result<()> {
        let path = self.jails.config_path(container);
        self.reporter
            .step(format!("Configuring jail '{container}'"));

        if self.runtime.shell().is_dry_run() {
            self.reporter
                .result(format!("would rewrite {}", path.display()));
            return Ok(());
        }

        let mut config = ContainerConfig::load(&path).await?;

        let used = used_ip_suffixes(&self.jails, container)?;
        let suffix = first_free(&used, IP_SUFFIX_MIN, IP_SUFFIX_MAX, "IP suffix")?;
        debug!("IP suffixes in use: {:?}, picked {}", used, suffix);

        let network = &self.network;
        config.ip4_addr = Some(format!(
            "{}|{}.{}/{}",
            network.interface, network.subnet_prefix, suffix, network.prefix_length
        ));
        config.boot = true;
        config.defaultrouter = Some(network.default_router.clone());
        config.host_hostname = Some(hostname_for(container));
        config.host_hostuuid = Some(container.to_string());
        config.jail_zfs_dataset = Some(format!("{}/{container}", self.jails_dataset));
        config.allow_raw_sockets = true;
        config.release = Some(network.os_release.clone());

        config.save(&path).await?;
        self.reporter.result(format!(
            "{} -> {}",
            container,
            config.ip4_addr.as_deref().unwrap_or_default()
        ));
        info!("Wrote {}", path.display());

        self.runtime.enable_boot(container).await?;
        Ok(())
    }
}

/// iocage stores booleans as `0`/`1`; older documents use `"on"`/`"off"`.
mod flag {
    use serde::de::{self, Deserializer, Unexpected};
    use serde::{Deserialize, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Bool(value) => Ok(value),
            serde_json::Value::Number(number) => match number.as_u64() {
                Some(0) => Ok(false),
                Some(1) => Ok(true),
                _ => Err(de::Error::invalid_value(
                    Unexpected::Other(&number.to_string()),
                    &"0 or 1",
                )),
            },
            serde_json::Value::String(value) => match value.as_str() {
                "1" | "on" | "yes" | "true" => Ok(true),
                "0" | "off" | "no" | "false" => Ok(false),
                other => Err(de::Error::invalid_value(Unexpected::Str(other), &"a flag")),
            },
            serde_json::Value::Null => Ok(false),
            other => Err(de::Error::invalid_type(
                Unexpected::Other(&other.to_string()),
                &"a flag",
            )),
        }
    }
}

#[cfg(test)]
#[path = "container_tests.rs"]
mod container_tests;
