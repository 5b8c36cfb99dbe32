// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for jailrep.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance. Most of them are the
//! defaults behind [`crate::config::ReplicatorConfig`].

// ============================================================================
// External Programs
// ============================================================================

/// iocage jail manager CLI
pub const IOCAGE: &str = "iocage";

/// ZFS administration CLI
pub const ZFS: &str = "zfs";

/// OpenSSH client used for remote commands
pub const SSH: &str = "ssh";

/// OpenSSH copy client used for remote file transfers
pub const SCP: &str = "scp";

/// MySQL command-line client (run inside jails)
pub const MYSQL: &str = "mysql";

/// FreeBSD service control (run inside jails)
pub const SERVICE: &str = "service";

// ============================================================================
// Jail Layout
// ============================================================================

/// Default directory holding one sub-directory per iocage jail
pub const DEFAULT_JAILS_ROOT: &str = "/iocage/jails";

/// Default ZFS dataset that parents every jail dataset
pub const DEFAULT_JAILS_DATASET: &str = "zroot/iocage/jails";

/// Jail configuration document, relative to the jail directory
pub const JAIL_CONFIG_FILE: &str = "config.json";

/// Jail filesystem root, relative to the jail directory
pub const JAIL_ROOT_DIR: &str = "root";

/// Lock file guarding IP and server-id allocation, relative to the jails root
pub const DEFAULT_POOL_LOCK_FILE: &str = ".jailrep.lock";

// ============================================================================
// Snapshot Artifacts
// ============================================================================

/// Default directory for snapshot transfer files, on both source and target hosts
pub const DEFAULT_SNAPSHOT_DIR: &str = "/var/tmp/jailrep";

/// Extension of the serialized ZFS send stream
pub const SNAPSHOT_DATA_EXTENSION: &str = "zfs";

/// Extension of the replication metadata file
pub const SNAPSHOT_METADATA_EXTENSION: &str = "meta";

/// `chrono` format of the timestamp suffix shared by snapshot names and tags
pub const SNAPSHOT_SUFFIX_FORMAT: &str = "%Y%m%d%H%M%S";

/// Number of populated lines in a canonical metadata file
pub const METADATA_FIELD_COUNT: usize = 4;

/// Minimum populated lines accepted when the container name can be derived
pub const METADATA_MIN_FIELD_COUNT: usize = 3;

// ============================================================================
// Resource Allocation
// ============================================================================

/// Lowest IP suffix handed out to a jail (`.1` is the router)
pub const IP_SUFFIX_MIN: u32 = 2;

/// Highest IP suffix handed out to a jail
pub const IP_SUFFIX_MAX: u32 = 253;

/// Lowest MySQL `server-id` handed out to a replica
pub const SERVER_ID_MIN: u32 = 2;

/// Highest MySQL `server-id` handed out to a replica
pub const SERVER_ID_MAX: u32 = 99;

/// Give up waiting for the pool lock after 10 minutes
pub const POOL_LOCK_TIMEOUT_SECS: u64 = 600;

/// Interval between pool lock attempts
pub const POOL_LOCK_POLL_INTERVAL_MILLIS: u64 = 500;

/// Upper bound of random jitter added to each poll interval
pub const POOL_LOCK_POLL_JITTER_MILLIS: u64 = 250;

// ============================================================================
// Network
// ============================================================================

/// Default VNET interface used in `ip4_addr`
pub const DEFAULT_NETWORK_INTERFACE: &str = "vnet0";

/// Default /24 network the jails live in (first three octets)
pub const DEFAULT_SUBNET_PREFIX: &str = "10.0.0";

/// Prefix length written into `ip4_addr`
pub const DEFAULT_PREFIX_LENGTH: u8 = 24;

/// Default router for replica jails
pub const DEFAULT_ROUTER: &str = "10.0.0.1";

/// Default FreeBSD release recorded in the jail configuration
pub const DEFAULT_OS_RELEASE: &str = "14.1-RELEASE";

// ============================================================================
// Certificates
// ============================================================================

/// Default directory inside a jail holding MySQL TLS material
pub const DEFAULT_JAIL_CERT_DIR: &str = "/usr/local/etc/mysql/certs";

/// Default trusted directory on the local host holding pre-staged TLS material
pub const DEFAULT_LOCAL_CERT_DIR: &str = "/usr/local/etc/jailrep/certs";

/// Certificate authority file name
pub const CA_CERT_FILE: &str = "ca.pem";

/// Client certificate file name
pub const CLIENT_CERT_FILE: &str = "client-cert.pem";

/// Client private key file name
pub const CLIENT_KEY_FILE: &str = "client-key.pem";

/// Default owner of the TLS material inside the jail
pub const DEFAULT_CERT_OWNER: &str = "mysql:mysql";

/// Owner read/write only
pub const CERT_FILE_MODE: &str = "600";

// ============================================================================
// MySQL
// ============================================================================

/// Default MySQL configuration file, as seen from inside the jail
pub const DEFAULT_MYSQL_CONFIG_PATH: &str = "/usr/local/etc/mysql/my.cnf";

/// Default MySQL rc service name
pub const DEFAULT_MYSQL_SERVICE: &str = "mysql-server";

/// File holding the server UUID; deleting it makes MySQL generate a new one
pub const DEFAULT_INSTANCE_IDENTITY_FILE: &str = "/var/db/mysql/auto.cnf";

/// Default relay log basename
pub const DEFAULT_RELAY_LOG: &str = "mysql-relay-bin";

/// Primary server section of `my.cnf`
pub const MYSQLD_SECTION: &str = "[mysqld]";

/// Default replication account name
pub const DEFAULT_REPLICATION_USER: &str = "replicator";

// ============================================================================
// Verification
// ============================================================================

/// Default database holding the end-to-end probe table
pub const DEFAULT_PROBE_DATABASE: &str = "jailrep_probe";

/// Default end-to-end probe table
pub const DEFAULT_PROBE_TABLE: &str = "replication_check";

/// Time to let the replica apply the probe row before reading it back
pub const DEFAULT_PROBE_SETTLE_SECS: u64 = 4;

/// Value MySQL reports for a healthy replication flag
pub const STATUS_YES: &str = "Yes";

// ============================================================================
// Environment
// ============================================================================

/// Environment variable overriding the replication password
pub const ENV_REPLICATION_PASSWORD: &str = "JAILREP_REPLICATION_PASSWORD";

/// Environment variable pointing at the YAML configuration file
pub const ENV_CONFIG_PATH: &str = "JAILREP_CONFIG";

/// Environment variable selecting the log output format (`text` or `json`)
pub const ENV_LOG_FORMAT: &str = "RUST_LOG_FORMAT";

/// Host alias that means "this machine"
pub const LOCALHOST: &str = "localhost";
