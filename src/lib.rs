// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # jailrep - MySQL replicas in iocage jails
//!
//! jailrep provisions a MySQL replica inside an iocage jail on the local host
//! from a ZFS snapshot of a running source jail, either on another host over
//! SSH or from snapshot files already staged locally.
//!
//! ## Overview
//!
//! A provisioning run:
//!
//! - snapshots the source jail and records its binary-log coordinates
//! - ships and receives the snapshot into a new jail dataset
//! - rewrites the jail's network identity and the replica's `server-id`
//! - installs the replication TLS material
//! - points the replica at the source and verifies that data flows
//!
//! ## Modules
//!
//! - [`replicator`] - The provisioning state machine
//! - [`snapshot`] - ZFS snapshot creation, export and import
//! - [`container`] - Jail `config.json` rewriting
//! - [`certificates`] - TLS material transfer
//! - [`database`] - `my.cnf` edits and replication bootstrap
//! - [`verifier`] - End-to-end replication checks
//! - [`executor`] and [`transport`] - Running host commands, locally or over SSH
//!
//! ## Example
//!
//! ```rust,no_run
//! use jailrep::config::ReplicatorConfig;
//! use jailrep::executor::HostExecutor;
//! use jailrep::replicator::Replicator;
//! use jailrep::report::Reporter;
//! use jailrep::request::ReplicationRequest;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let request = ReplicationRequest::new(
//!     "10.1.1.5:primary",
//!     "localhost:replica1",
//!     false,
//!     true,
//!     false,
//!     None,
//! )?;
//! let mut replicator = Replicator::new(
//!     request,
//!     ReplicatorConfig::default(),
//!     HostExecutor::new().as_executor(),
//!     Reporter::new(),
//! );
//! replicator.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod allocator;
pub mod certificates;
pub mod config;
pub mod constants;
pub mod container;
pub mod database;
pub mod errors;
pub mod executor;
pub mod jail;
pub mod metadata;
pub mod replicator;
pub mod report;
pub mod request;
pub mod snapshot;
pub mod transport;
pub mod verifier;
