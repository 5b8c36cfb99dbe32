// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for configuration loading and path helpers.

#[cfg(test)]
mod tests {
    use crate::config::*;
    use std::io::Write;
    use std::path::{Path, PathBuf};

    #[test]
    fn test_defaults() {
        let config = ReplicatorConfig::default();

        assert_eq!(config.jails.jails_root, PathBuf::from("/iocage/jails"));
        assert_eq!(config.snapshot.jails_dataset, "zroot/iocage/jails");
        assert_eq!(config.network.subnet_prefix, "10.0.0");
        assert_eq!(config.network.prefix_length, 24);
        assert_eq!(config.database.service, "mysql-server");
        assert_eq!(config.verification.settle_secs, 4);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r"
network:
  default_router: 10.9.0.1
  subnet_prefix: '10.9.0'
database:
  replication_user: repl
";
        let config = ReplicatorConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.network.default_router, "10.9.0.1");
        assert_eq!(config.network.subnet_prefix, "10.9.0");
        assert_eq!(config.network.interface, "vnet0");
        assert_eq!(config.database.replication_user, "repl");
        assert_eq!(config.database.relay_log, "mysql-relay-bin");
        assert_eq!(config.jails, JailSettings::default());
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(
            ReplicatorConfig::from_yaml("  \n").unwrap(),
            ReplicatorConfig::default()
        );
    }

    #[test]
    fn test_invalid_yaml_is_rejected() {
        let result = ReplicatorConfig::from_yaml("network: [not, a, map]");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "verification:\n  settle_secs: 9").unwrap();

        let config = ReplicatorConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.verification.settle_secs, 9);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = ReplicatorConfig::load(Some(Path::new("/nonexistent/jailrep.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_jail_paths() {
        let jails = JailSettings {
            jails_root: PathBuf::from("/iocage/jails"),
            lock_file: None,
            ..JailSettings::default()
        };

        assert_eq!(
            jails.config_path("replica1"),
            PathBuf::from("/iocage/jails/replica1/config.json")
        );
        assert_eq!(
            jails.root_path("replica1"),
            PathBuf::from("/iocage/jails/replica1/root")
        );
        assert_eq!(
            jails.path_in_jail("replica1", Path::new("/usr/local/etc/mysql/my.cnf")),
            PathBuf::from("/iocage/jails/replica1/root/usr/local/etc/mysql/my.cnf")
        );
        assert_eq!(
            jails.lock_path(),
            PathBuf::from("/iocage/jails/.jailrep.lock")
        );
    }

    #[test]
    fn test_dataset_name() {
        let snapshot = SnapshotSettings::default();
        assert_eq!(snapshot.dataset("primary"), "zroot/iocage/jails/primary");
    }

    #[test]
    fn test_certificate_paths() {
        let certs = CertificateSettings::default();
        assert_eq!(
            certs.ca_path(),
            PathBuf::from("/usr/local/etc/mysql/certs/ca.pem")
        );
        assert_eq!(
            certs.key_path(),
            PathBuf::from("/usr/local/etc/mysql/certs/client-key.pem")
        );
    }

    #[test]
    fn test_database_debug_redacts_password() {
        let settings = DatabaseSettings {
            replication_password: "s3cret".to_string(),
            ..DatabaseSettings::default()
        };
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
    }
}
