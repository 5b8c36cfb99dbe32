// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

// Common test utilities for integration tests

#![allow(dead_code)]

use jailrep::config::{JailSettings, ReplicatorConfig, SnapshotSettings, VerificationSettings};
use jailrep::executor::fake::FakeExecutor;
use jailrep::executor::{CommandLine, Output};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const SOURCE_HOST: &str = "10.1.1.5";
pub const SOURCE_JAIL: &str = "primary";
pub const METADATA: &str = "mysql-bin.000007\n4821\n10.1.1.5\nprimary\n";

pub const HEALTHY_STATUS: &str = "\
*************************** 1. row ***************************
           Replica_IO_Running: Yes
          Replica_SQL_Running: Yes
           Source_SSL_Allowed: Yes
";

/// A throwaway jails root plus a fake executor that behaves like a jail host.
///
/// The handler simulates just enough of `iocage`, `zfs`, `scp`, `cp` and
/// `mysql` for a provisioning run: `zfs receive` clones the source jail's
/// directory, `iocage destroy` removes a jail, copies create their
/// destination, and the replica echoes back whatever probe marker was written.
pub struct TestHost {
    pub dir: TempDir,
    pub fake: Arc<FakeExecutor>,
    pub replica_status: Arc<Mutex<String>>,
}

impl TestHost {
    pub fn new() -> Self {
        let host = Self {
            dir: TempDir::new().unwrap(),
            fake: FakeExecutor::new(),
            replica_status: Arc::new(Mutex::new(HEALTHY_STATUS.to_string())),
        };
        std::fs::create_dir_all(host.jails_root()).unwrap();
        host.add_jail(SOURCE_JAIL, 2, 1);
        host.install_handler();
        host
    }

    pub fn jails_root(&self) -> PathBuf {
        self.dir.path().join("jails")
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.dir.path().join("snapshots")
    }

    pub fn config(&self) -> ReplicatorConfig {
        ReplicatorConfig {
            jails: JailSettings {
                jails_root: self.jails_root(),
                lock_file: Some(self.dir.path().join("jailrep.lock")),
                ..JailSettings::default()
            },
            snapshot: SnapshotSettings {
                snapshot_dir: self.snapshot_dir(),
                ..SnapshotSettings::default()
            },
            verification: VerificationSettings {
                settle_secs: 0,
                ..VerificationSettings::default()
            },
            ..ReplicatorConfig::default()
        }
    }

    /// Create a jail directory with `config.json` and `my.cnf`.
    pub fn add_jail(&self, name: &str, ip_suffix: u32, server_id: u32) {
        let jail = self.jails_root().join(name);
        let mysql_etc = jail.join("root/usr/local/etc/mysql");
        std::fs::create_dir_all(&mysql_etc).unwrap();
        std::fs::write(
            jail.join("config.json"),
            format!(
                r#"{{"ip4_addr": "vnet0|10.0.0.{ip_suffix}/24", "boot": 0, "host_hostuuid": "{name}", "vnet": 1}}"#
            ),
        )
        .unwrap();
        std::fs::write(
            mysql_etc.join("my.cnf"),
            format!("[mysqld]\nserver-id = {server_id}\nlog-bin = mysql-bin\n"),
        )
        .unwrap();
    }

    /// Place transfer and metadata files in the local snapshot directory.
    pub fn stage_snapshot(&self, name: &str, metadata: &str) {
        std::fs::create_dir_all(self.snapshot_dir()).unwrap();
        std::fs::write(self.snapshot_dir().join(format!("{name}.zfs")), b"stream").unwrap();
        std::fs::write(self.snapshot_dir().join(format!("{name}.meta")), metadata).unwrap();
    }

    pub fn jail_path(&self, name: &str) -> PathBuf {
        self.jails_root().join(name)
    }

    pub fn read_jail_file(&self, name: &str, relative: &str) -> String {
        std::fs::read_to_string(self.jail_path(name).join(relative)).unwrap()
    }

    pub fn calls(&self) -> Vec<String> {
        self.fake.rendered_calls()
    }

    /// Index of the first recorded command containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.calls().iter().position(|call| call.contains(needle))
    }

    fn install_handler(&self) {
        let jails_root = self.jails_root();
        let marker = Arc::new(Mutex::new(String::new()));
        let status = self.replica_status.clone();
        self.fake.set_handler(Box::new(move |command| {
            simulate(command, &jails_root, &marker, &status)
        }));
    }
}

fn simulate(
    command: &CommandLine,
    jails_root: &Path,
    marker: &Mutex<String>,
    status: &Mutex<String>,
) -> Output {
    let args: Vec<&str> = command.args.iter().map(String::as_str).collect();
    let rendered = command.to_shell_string();

    match (command.program.as_str(), args.as_slice()) {
        ("iocage", ["list", ..]) => {
            let mut names: Vec<String> = std::fs::read_dir(jails_root)
                .map(|entries| {
                    entries
                        .filter_map(Result::ok)
                        .filter(|entry| entry.path().is_dir())
                        .map(|entry| entry.file_name().to_string_lossy().to_string())
                        .collect()
                })
                .unwrap_or_default();
            names.sort();
            Output::with_stdout(names.join("\n"))
        }
        ("iocage", ["destroy", "-f", name]) => {
            std::fs::remove_dir_all(jails_root.join(name)).unwrap();
            Output::success()
        }
        ("iocage", ["exec", _, "mysql", ..]) if rendered.contains("SELECT marker") => {
            Output::with_stdout(format!("{}\n", marker.lock().unwrap()))
        }
        ("iocage", ["exec", _, "mysql", ..]) if rendered.contains("SHOW REPLICA STATUS") => {
            Output::with_stdout(status.lock().unwrap().clone())
        }
        ("zfs", ["receive", "-F", dataset]) => {
            let target = dataset.rsplit('/').next().unwrap();
            clone_jail(&jails_root.join(SOURCE_JAIL), &jails_root.join(target));
            Output::success()
        }
        ("mkdir", ["-p", path]) => {
            std::fs::create_dir_all(path).unwrap();
            Output::success()
        }
        ("scp" | "cp", [.., _, destination]) => {
            let destination = Path::new(destination);
            let contents = if destination.extension().is_some_and(|ext| ext == "meta") {
                METADATA
            } else {
                "copied"
            };
            std::fs::write(destination, contents).unwrap();
            Output::success()
        }
        ("ssh", _) if rendered.contains("SHOW MASTER STATUS") => {
            Output::with_stdout("mysql-bin.000007\t4821\t\t\t\n")
        }
        ("ssh", _) if rendered.contains("INSERT INTO") => {
            let start = rendered.find("jailrep-").unwrap();
            let value: String = rendered[start..]
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
                .collect();
            *marker.lock().unwrap() = value;
            Output::success()
        }
        _ => Output::success(),
    }
}

fn clone_jail(source: &Path, destination: &Path) {
    for relative in ["config.json", "root/usr/local/etc/mysql/my.cnf"] {
        let to = destination.join(relative);
        std::fs::create_dir_all(to.parent().unwrap()).unwrap();
        std::fs::copy(source.join(relative), to).unwrap();
    }
}
