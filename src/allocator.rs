// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Free-slot allocation of per-host resources.
//!
//! Both IP suffixes and MySQL `server-id`s are allocated the same way: scan the
//! sibling jails on this host, collect the values already in use, and return
//! the lowest free value in an inclusive range.
//!
//! The scan itself does not reserve anything. Callers hold a [`PoolLock`] from
//! before the first scan until the chosen values are written, so two runs on
//! the same host cannot pick the same value.

use crate::config::JailSettings;
use crate::constants::{POOL_LOCK_POLL_INTERVAL_MILLIS, POOL_LOCK_POLL_JITTER_MILLIS};
use crate::database::mycnf::{is_mysqld_header, is_section_header};
use crate::errors::{ReplicationError, Result};
use regex::Regex;
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Last octet of each address in an iocage `ip4_addr` value (`vnet0|10.0.0.5/24`).
static IP_SUFFIX_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{1,3}\.\d{1,3}\.\d{1,3}\.(\d{1,3})(?:/\d{1,2})?").expect("valid regex")
});

/// `server-id = N` (or `server_id=N`) directive line in `my.cnf`.
static SERVER_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*server[-_]id[ \t]*=[ \t]*(\d+)").expect("valid regex")
});

/// Return the lowest value in `[min, max]` that is not in `used`.
///
/// # Errors
///
/// Returns [`ReplicationError::ResourceExhausted`] when every value is taken.
pub fn first_free(used: &BTreeSet<u32>, min: u32, max: u32, resource: &str) -> Result<u32> {
    (min..=max)
        .find(|candidate| !used.contains(candidate))
        .ok_or_else(|| ReplicationError::ResourceExhausted {
            resource: resource.to_string(),
            min,
            max,
        })
}

/// Extract every IP suffix from an `ip4_addr` value.
#[must_use]
pub fn ip_suffixes(ip4_addr: &str) -> Vec<u32> {
    IP_SUFFIX_PATTERN
        .captures_iter(ip4_addr)
        .filter_map(|captures| captures.get(1)?.as_str().parse().ok())
        .collect()
}

/// Extract the `server-id` mysqld runs with from a `my.cnf` body.
///
/// Only `[mysqld]` groups count, and the last occurrence wins.
#[must_use]
pub fn server_id(contents: &str) -> Option<u32> {
    let mut in_mysqld = false;
    let mut found = None;
    for line in contents.lines() {
        if is_section_header(line) {
            in_mysqld = is_mysqld_header(line);
            continue;
        }
        if !in_mysqld {
            continue;
        }
        if let Some(id) = SERVER_ID_PATTERN
            .captures(line)
            .and_then(|captures| captures.get(1)?.as_str().parse().ok())
        {
            found = Some(id);
        }
    }
    found
}

/// Names of every jail directory under the jails root, except `exclude`.
///
/// # Errors
///
/// Returns [`ReplicationError::Io`] if the jails root cannot be listed.
pub fn sibling_jails(jails: &JailSettings, exclude: &str) -> Result<Vec<String>> {
    let entries = match std::fs::read_dir(&jails.jails_root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            warn!(
                "Jails root {} does not exist, assuming no siblings",
                jails.jails_root.display()
            );
            return Ok(Vec::new());
        }
        Err(err) => {
            return Err(ReplicationError::io(
                format!("listing jails in {}", jails.jails_root.display()),
                err,
            ));
        }
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| {
            ReplicationError::io(
                format!("listing jails in {}", jails.jails_root.display()),
                err,
            )
        })?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name != exclude {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// IP suffixes used by sibling jails' `config.json` documents.
///
/// Unreadable or malformed sibling documents are logged and skipped.
///
/// # Errors
///
/// Returns [`ReplicationError::Io`] if the jails root cannot be listed.
pub fn used_ip_suffixes(jails: &JailSettings, exclude: &str) -> Result<BTreeSet<u32>> {
    let mut used = BTreeSet::new();
    for name in sibling_jails(jails, exclude)? {
        let path = jails.config_path(&name);
        let Ok(contents) = std::fs::read_to_string(&path) else {
            debug!("No readable jail config at {}, skipping", path.display());
            continue;
        };
        let document: serde_json::Value = match serde_json::from_str(&contents) {
            Ok(document) => document,
            Err(e) => {
                warn!("Skipping malformed jail config {}: {}", path.display(), e);
                continue;
            }
        };
        if let Some(ip4_addr) = document.get("ip4_addr").and_then(|value| value.as_str()) {
            let suffixes = ip_suffixes(ip4_addr);
            debug!("Jail {} uses IP suffixes {:?}", name, suffixes);
            used.extend(suffixes);
        }
    }
    Ok(used)
}

/// `server-id`s used by sibling jails' MySQL configuration files.
///
/// `config_path` is the `my.cnf` location inside each jail.
///
/// # Errors
///
/// Returns [`ReplicationError::Io`] if the jails root cannot be listed.
pub fn used_server_ids(
    jails: &JailSettings,
    config_path: &Path,
    exclude: &str,
) -> Result<BTreeSet<u32>> {
    let mut used = BTreeSet::new();
    for name in sibling_jails(jails, exclude)? {
        let path = jails.path_in_jail(&name, config_path);
        let Ok(contents) = std::fs::read_to_string(&path) else {
            continue;
        };
        if let Some(id) = server_id(&contents) {
            debug!("Jail {} uses server-id {}", name, id);
            used.insert(id);
        }
    }
    Ok(used)
}

/// Exclusive lock over the allocation pool of this host.
///
/// Held for as long as the guard lives; the kernel drops the `flock` when the
/// file is closed, including on process exit.
#[derive(Debug)]
pub struct PoolLock {
    _file: File,
    path: PathBuf,
}

impl PoolLock {
    /// Take the lock, polling with jitter until `timeout` expires.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::LockFailed`] on timeout or I/O failure.
    pub async fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        let lock_failed = |reason: String| ReplicationError::LockFailed {
            path: path.to_path_buf(),
            reason,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| lock_failed(format!("creating {}: {e}", parent.display())))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| lock_failed(format!("opening lock file: {e}")))?;

        let start = Instant::now();
        let mut waiting_logged = false;
        loop {
            match try_flock_exclusive(&file) {
                Ok(true) => {
                    info!("Acquired allocation lock {}", path.display());
                    return Ok(Self {
                        _file: file,
                        path: path.to_path_buf(),
                    });
                }
                Ok(false) => {}
                Err(e) => return Err(lock_failed(e.to_string())),
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(lock_failed(format!(
                    "still held by another run after {}s",
                    elapsed.as_secs()
                )));
            }
            if !waiting_logged {
                info!(
                    "Allocation lock {} held by another run, waiting",
                    path.display()
                );
                waiting_logged = true;
            }
            let jitter_ms = rand::random::<u64>() % (POOL_LOCK_POLL_JITTER_MILLIS + 1);
            tokio::time::sleep(Duration::from_millis(
                POOL_LOCK_POLL_INTERVAL_MILLIS + jitter_ms,
            ))
            .await;
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PoolLock {
    fn drop(&mut self) {
        debug!("Released allocation lock {}", self.path.display());
    }
}

/// Try to take an exclusive `flock` without blocking.
///
/// Returns `Ok(false)` when another process holds it.
fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: `fd` is a valid descriptor owned by `file` for the duration of the call.
        #[allow(unsafe_code)]
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK)
        {
            return Ok(false);
        }
        Err(err)
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(true)
    }
}

#[cfg(test)]
#[path = "allocator_tests.rs"]
mod allocator_tests;
