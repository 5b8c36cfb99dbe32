// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for replica database configuration.

#[cfg(test)]
mod tests {
    use crate::allocator::server_id;
    use crate::config::{CertificateSettings, DatabaseSettings, JailSettings};
    use crate::database::DatabaseConfigurator;
    use crate::errors::ReplicationError;
    use crate::executor::fake::FakeExecutor;
    use crate::executor::Output;
    use crate::jail::JailRuntime;
    use crate::metadata::ReplicationMetadata;
    use crate::report::Reporter;
    use crate::transport::{Host, Shell};
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    // =====================================================
    // Helper Functions
    // =====================================================

    fn metadata() -> ReplicationMetadata {
        ReplicationMetadata {
            binlog_file: "mysql-bin.000007".to_string(),
            binlog_position: 4821,
            source_host: "10.1.1.5".to_string(),
            source_container: "primary".to_string(),
        }
    }

    fn write_my_cnf(dir: &TempDir, jail: &str, server_id: u32) {
        let etc = dir.path().join(jail).join("root/usr/local/etc/mysql");
        std::fs::create_dir_all(&etc).unwrap();
        std::fs::write(
            etc.join("my.cnf"),
            format!("[mysqld]\nserver-id = {server_id}\nlog-bin = mysql-bin\n"),
        )
        .unwrap();
    }

    fn read_my_cnf(dir: &TempDir, jail: &str) -> String {
        std::fs::read_to_string(dir.path().join(jail).join("root/usr/local/etc/mysql/my.cnf"))
            .unwrap()
    }

    fn configurator(
        fake: &Arc<FakeExecutor>,
        dir: &TempDir,
        dry_run: bool,
    ) -> DatabaseConfigurator {
        let shell = Shell::new(fake.clone().as_executor(), None, dry_run);
        DatabaseConfigurator::new(
            JailRuntime::new(shell, Host::Local),
            JailSettings {
                jails_root: dir.path().to_path_buf(),
                lock_file: None,
                ..JailSettings::default()
            },
            DatabaseSettings {
                replication_password: "s3cr3t".to_string(),
                ..DatabaseSettings::default()
            },
            CertificateSettings::default(),
            Reporter::new(),
        )
    }

    // =====================================================
    // Config stage
    // =====================================================

    #[tokio::test]
    async fn test_update_config_never_reuses_inherited_server_id() {
        let dir = TempDir::new().unwrap();
        write_my_cnf(&dir, "primary", 2);
        write_my_cnf(&dir, "replica0", 3);
        // Cloned from primary.
        write_my_cnf(&dir, "replica1", 2);
        let fake = FakeExecutor::new();

        let id = configurator(&fake, &dir, false)
            .update_config("replica1")
            .await
            .unwrap();

        assert_eq!(id, Some(4));
        let written = read_my_cnf(&dir, "replica1");
        assert_eq!(server_id(&written), Some(4));
        assert!(written.contains("ssl-cert = /usr/local/etc/mysql/certs/client-cert.pem"));
        assert!(written.contains("relay-log = mysql-relay-bin"));
        assert_eq!(server_id(&read_my_cnf(&dir, "primary")), Some(2));
        assert_eq!(server_id(&read_my_cnf(&dir, "replica0")), Some(3));
    }

    #[tokio::test]
    async fn test_update_config_exhausted() {
        let dir = TempDir::new().unwrap();
        for id in 2..=99 {
            write_my_cnf(&dir, &format!("jail{id}"), id);
        }
        write_my_cnf(&dir, "replica1", 1);
        let fake = FakeExecutor::new();

        let err = configurator(&fake, &dir, false)
            .update_config("replica1")
            .await
            .unwrap_err();

        assert!(matches!(err, ReplicationError::ResourceExhausted { .. }));
    }

    #[tokio::test]
    async fn test_update_config_missing_file() {
        let dir = TempDir::new().unwrap();
        let fake = FakeExecutor::new();

        let err = configurator(&fake, &dir, false)
            .update_config("replica1")
            .await
            .unwrap_err();

        assert!(matches!(err, ReplicationError::ConfigNotFound { .. }));
    }

    // =====================================================
    // Restart and replication stages
    // =====================================================

    #[tokio::test]
    async fn test_configure_full_sequence() {
        let dir = TempDir::new().unwrap();
        write_my_cnf(&dir, "primary", 1);
        write_my_cnf(&dir, "replica1", 1);
        let tmp_dir = dir.path().join("replica1/root/tmp");

        let captured = Arc::new(Mutex::new(String::new()));
        let fake = FakeExecutor::new();
        {
            let captured = captured.clone();
            let tmp_dir = tmp_dir.clone();
            fake.set_handler(Box::new(move |command| {
                if let Some(source) = command.args.iter().find(|arg| arg.starts_with("source ")) {
                    let file_name = Path::new(source.trim_start_matches("source "))
                        .file_name()
                        .unwrap()
                        .to_owned();
                    *captured.lock().unwrap() =
                        std::fs::read_to_string(tmp_dir.join(file_name)).unwrap();
                }
                Output::success()
            }));
        }

        let id = configurator(&fake, &dir, false)
            .configure("replica1", "primary_20250101120000", &metadata())
            .await
            .unwrap();

        assert_eq!(id, Some(2));
        let calls = fake.rendered_calls();
        assert_eq!(calls[0], "iocage exec replica1 service mysql-server stop");
        assert_eq!(calls[1], "iocage exec replica1 rm -f /var/db/mysql/auto.cnf");
        assert_eq!(calls[2], "iocage exec replica1 service mysql-server start");
        assert!(calls[3].starts_with("iocage exec replica1 mysql -e 'source /tmp/jailrep-"));

        let script = captured.lock().unwrap().clone();
        assert!(script.contains("MASTER_LOG_FILE='mysql-bin.000007'"));
        assert!(script.contains("MASTER_LOG_POS=4821"));
        assert_eq!(std::fs::read_dir(&tmp_dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_script_removed_when_mysql_fails() {
        let dir = TempDir::new().unwrap();
        write_my_cnf(&dir, "replica1", 1);
        let fake = FakeExecutor::new();
        fake.set_handler(Box::new(|command| {
            if command.has_arg("mysql") {
                Output::failure()
            } else {
                Output::success()
            }
        }));

        let err = configurator(&fake, &dir, false)
            .inject_replication("replica1", &metadata())
            .await
            .unwrap_err();

        assert!(matches!(err, ReplicationError::CommandFailed(_)));
        let tmp_dir = dir.path().join("replica1/root/tmp");
        assert_eq!(std::fs::read_dir(tmp_dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        write_my_cnf(&dir, "replica1", 1);
        let before = read_my_cnf(&dir, "replica1");
        let fake = FakeExecutor::new();

        let id = configurator(&fake, &dir, true)
            .configure("replica1", "primary_1", &metadata())
            .await
            .unwrap();

        assert_eq!(id, None);
        assert_eq!(read_my_cnf(&dir, "replica1"), before);
        assert!(!dir.path().join("replica1/root/tmp").exists());
        assert!(fake.calls().is_empty());
    }
}
