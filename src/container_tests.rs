// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for jail configuration rewriting.

#[cfg(test)]
mod tests {
    use crate::config::{JailSettings, NetworkSettings};
    use crate::container::{hostname_for, ContainerConfig, ContainerConfigurator};
    use crate::errors::ReplicationError;
    use crate::executor::fake::FakeExecutor;
    use crate::jail::JailRuntime;
    use crate::report::Reporter;
    use crate::transport::{Host, Shell};
    use std::sync::Arc;
    use tempfile::TempDir;

    const SOURCE_CONFIG: &str = r#"{
        "ip4_addr": "vnet0|10.0.0.2/24",
        "boot": 0,
        "defaultrouter": "10.0.0.1",
        "host_hostname": "primary",
        "host_hostuuid": "primary",
        "jail_zfs_dataset": "zroot/iocage/jails/primary",
        "allow_raw_sockets": "off",
        "release": "13.2-RELEASE",
        "vnet": 1,
        "notes": "cloned"
    }"#;

    fn write_jail(dir: &TempDir, name: &str, contents: &str) {
        std::fs::create_dir_all(dir.path().join(name)).unwrap();
        std::fs::write(dir.path().join(name).join("config.json"), contents).unwrap();
    }

    fn configurator(
        fake: &Arc<FakeExecutor>,
        dir: &TempDir,
        dry_run: bool,
    ) -> ContainerConfigurator {
        let shell = Shell::new(fake.clone().as_executor(), None, dry_run);
        ContainerConfigurator::new(
            JailRuntime::new(shell, Host::Local),
            JailSettings {
                jails_root: dir.path().to_path_buf(),
                lock_file: None,
                ..JailSettings::default()
            },
            NetworkSettings::default(),
            "zroot/iocage/jails",
            Reporter::new(),
        )
    }

    #[test]
    fn test_hostname_replaces_underscores() {
        assert_eq!(hostname_for("db_replica_1"), "db-replica-1");
        assert_eq!(hostname_for("replica1"), "replica1");
    }

    #[test]
    fn test_flags_accept_iocage_spellings() {
        let config: ContainerConfig =
            serde_json::from_str(r#"{"boot": "on", "allow_raw_sockets": 1}"#).unwrap();
        assert!(config.boot);
        assert!(config.allow_raw_sockets);

        let config: ContainerConfig =
            serde_json::from_str(r#"{"boot": false, "allow_raw_sockets": "0"}"#).unwrap();
        assert!(!config.boot);
        assert!(!config.allow_raw_sockets);

        assert!(serde_json::from_str::<ContainerConfig>(r#"{"boot": 7}"#).is_err());
    }

    #[tokio::test]
    async fn test_configure_assigns_identity_and_free_ip() {
        let dir = TempDir::new().unwrap();
        write_jail(&dir, "primary", SOURCE_CONFIG);
        write_jail(&dir, "app", r#"{"ip4_addr": "vnet0|10.0.0.3/24"}"#);
        write_jail(&dir, "db_replica", SOURCE_CONFIG);
        let fake = FakeExecutor::new();

        configurator(&fake, &dir, false)
            .configure("db_replica")
            .await
            .unwrap();

        let written = std::fs::read_to_string(dir.path().join("db_replica/config.json")).unwrap();
        let document: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(document["ip4_addr"], "vnet0|10.0.0.4/24");
        assert_eq!(document["boot"], 1);
        assert_eq!(document["defaultrouter"], "10.0.0.1");
        assert_eq!(document["host_hostname"], "db-replica");
        assert_eq!(document["host_hostuuid"], "db_replica");
        assert_eq!(document["jail_zfs_dataset"], "zroot/iocage/jails/db_replica");
        assert_eq!(document["allow_raw_sockets"], 1);
        assert_eq!(document["release"], "14.1-RELEASE");
        assert_eq!(document["vnet"], 1);
        assert_eq!(document["notes"], "cloned");

        assert_eq!(fake.rendered_calls(), vec!["iocage set boot=on db_replica"]);
    }

    #[tokio::test]
    async fn test_configure_missing_document() {
        let dir = TempDir::new().unwrap();
        let fake = FakeExecutor::new();

        let err = configurator(&fake, &dir, false)
            .configure("replica1")
            .await
            .unwrap_err();

        assert!(matches!(err, ReplicationError::ConfigNotFound { .. }));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_configure_malformed_document() {
        let dir = TempDir::new().unwrap();
        write_jail(&dir, "replica1", "{\"ip4_addr\": ");
        let fake = FakeExecutor::new();

        let err = configurator(&fake, &dir, false)
            .configure("replica1")
            .await
            .unwrap_err();

        assert!(matches!(err, ReplicationError::ConfigParse { .. }));
    }

    #[tokio::test]
    async fn test_dry_run_leaves_document_untouched() {
        let dir = TempDir::new().unwrap();
        write_jail(&dir, "replica1", SOURCE_CONFIG);
        let fake = FakeExecutor::new();

        configurator(&fake, &dir, true)
            .configure("replica1")
            .await
            .unwrap();

        let contents = std::fs::read_to_string(dir.path().join("replica1/config.json")).unwrap();
        assert_eq!(contents, SOURCE_CONFIG);
        assert!(fake.calls().is_empty());
    }
}
