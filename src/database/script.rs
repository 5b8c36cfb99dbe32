// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! SQL that points a replica at its source.

use crate::config::{CertificateSettings, DatabaseSettings};
use crate::metadata::ReplicationMetadata;
use std::fmt::Write as _;
use std::path::Path;

/// Quote a value as a MySQL string literal.
#[must_use]
pub fn sql_string(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "''");
    format!("'{escaped}'")
}

fn sql_path(path: &Path) -> String {
    sql_string(&path.to_string_lossy())
}

/// Build the replication setup script for `metadata`.
///
/// The script resets any replication state inherited from the source, points
/// the replica at the binlog coordinates captured with the snapshot over TLS,
/// starts the replica threads and prints their status.
#[must_use]
pub fn replication_script(
    metadata: &ReplicationMetadata,
    database: &DatabaseSettings,
    certificates: &CertificateSettings,
) -> String {
    let mut script = String::new();
    script.push_str("STOP REPLICA;\n");
    script.push_str("RESET REPLICA ALL;\n");
    script.push_str("CHANGE MASTER TO\n");
    let options = [
        format!("MASTER_HOST={}", sql_string(&metadata.source_host)),
        format!("MASTER_USER={}", sql_string(&database.replication_user)),
        format!(
            "MASTER_PASSWORD={}",
            sql_string(&database.replication_password)
        ),
        format!("MASTER_LOG_FILE={}", sql_string(&metadata.binlog_file)),
        format!("MASTER_LOG_POS={}", metadata.binlog_position),
        "MASTER_SSL=1".to_string(),
        format!("MASTER_SSL_CA={}", sql_path(&certificates.ca_path())),
        format!("MASTER_SSL_CERT={}", sql_path(&certificates.cert_path())),
        format!("MASTER_SSL_KEY={}", sql_path(&certificates.key_path())),
    ];
    let _ = writeln!(script, "  {};", options.join(",\n  "));
    script.push_str("START REPLICA;\n");
    script.push_str("SHOW REPLICA STATUS;\n");
    script
}

/// The script with the password literal masked, for logs.
#[must_use]
pub fn redacted(script: &str, database: &DatabaseSettings) -> String {
    if database.replication_password.is_empty() {
        return script.to_string();
    }
    script.replace(
        &sql_string(&database.replication_password),
        "'<redacted>'",
    )
}

#[cfg(test)]
#[path = "script_tests.rs"]
mod script_tests;
