// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Line-oriented upserts on `my.cnf`.
//!
//! Every edit is confined to `[mysqld]`, which is created if it is missing. A
//! directive that already exists is replaced in place (and any later duplicates,
//! including ones in a repeated `[mysqld]` group, are dropped); a missing one is
//! inserted directly under the first section header. Applying the same edits twice yields the same
//! bytes as applying them once.

use crate::constants::MYSQLD_SECTION;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Replica-specific directives written into `[mysqld]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MyCnfEdits<'a> {
    pub server_id: u32,
    pub ssl_ca: &'a Path,
    pub ssl_cert: &'a Path,
    pub ssl_key: &'a Path,
    /// Only written when no `relay-log` directive exists yet
    pub relay_log: &'a str,
}

static RELAY_LOG: LazyLock<Regex> = LazyLock::new(|| directive_pattern("relay[-_]log"));
static SSL_KEY: LazyLock<Regex> = LazyLock::new(|| directive_pattern("ssl[-_]key"));
static SSL_CERT: LazyLock<Regex> = LazyLock::new(|| directive_pattern("ssl[-_]cert"));
static SSL_CA: LazyLock<Regex> = LazyLock::new(|| directive_pattern("ssl[-_]ca"));
static SERVER_ID: LazyLock<Regex> = LazyLock::new(|| directive_pattern("server[-_]id"));

fn directive_pattern(key: &str) -> Regex {
    Regex::new(&format!(r"^[ \t]*{key}[ \t]*=")).expect("valid regex")
}

/// Apply `edits` to a `my.cnf` body.
#[must_use]
pub fn apply(contents: &str, edits: &MyCnfEdits<'_>) -> String {
    let mut lines: Vec<String> = contents.lines().map(str::to_string).collect();
    let header = ensure_section(&mut lines);

    // Inserted directives land directly under the header in reverse call order,
    // so the relay log is handled first to end up last.
    if find_directive(&lines, &RELAY_LOG).is_none() {
        lines.insert(header + 1, directive("relay-log", edits.relay_log));
    }
    upsert(&mut lines, header, &SSL_KEY, &directive("ssl-key", edits.ssl_key.display()));
    upsert(&mut lines, header, &SSL_CERT, &directive("ssl-cert", edits.ssl_cert.display()));
    upsert(&mut lines, header, &SSL_CA, &directive("ssl-ca", edits.ssl_ca.display()));
    upsert(&mut lines, header, &SERVER_ID, &directive("server-id", edits.server_id));

    let mut output = lines.join("\n");
    output.push('\n');
    output
}

fn directive(key: &str, value: impl std::fmt::Display) -> String {
    format!("{key} = {value}")
}

/// Whether `line` opens an option group.
pub(crate) fn is_section_header(line: &str) -> bool {
    line.trim_start().starts_with('[')
}

/// Whether `line` opens a `[mysqld]` group.
///
/// Group names are case-insensitive and may carry inner padding or a
/// trailing comment: `[ mysqld ]`, `[MySQLd] # primary`.
pub(crate) fn is_mysqld_header(line: &str) -> bool {
    let Some(rest) = line.trim().strip_prefix('[') else {
        return false;
    };
    let Some((name, tail)) = rest.split_once(']') else {
        return false;
    };
    let tail = tail.trim_start();
    (tail.is_empty() || tail.starts_with('#') || tail.starts_with(';'))
        && name.trim().eq_ignore_ascii_case("mysqld")
}

/// Index of the first `[mysqld]` header, appending the section when absent.
fn ensure_section(lines: &mut Vec<String>) -> usize {
    if let Some(index) = lines.iter().position(|line| is_mysqld_header(line)) {
        return index;
    }
    if lines.last().is_some_and(|line| !line.trim().is_empty()) {
        lines.push(String::new());
    }
    lines.push(MYSQLD_SECTION.to_string());
    lines.len() - 1
}

/// Indices of every line inside a `[mysqld]` group, headers excluded.
fn mysqld_body(lines: &[String]) -> Vec<usize> {
    let mut inside = false;
    let mut body = Vec::new();
    for (index, line) in lines.iter().enumerate() {
        if is_section_header(line) {
            inside = is_mysqld_header(line);
        } else if inside {
            body.push(index);
        }
    }
    body
}

fn find_directive(lines: &[String], pattern: &Regex) -> Option<usize> {
    mysqld_body(lines)
        .into_iter()
        .find(|&index| pattern.is_match(&lines[index]))
}

fn upsert(lines: &mut Vec<String>, header: usize, pattern: &Regex, replacement: &str) {
    let matches: Vec<usize> = mysqld_body(lines)
        .into_iter()
        .filter(|&index| pattern.is_match(&lines[index]))
        .collect();

    match matches.split_first() {
        Some((&first, duplicates)) => {
            lines[first] = replacement.to_string();
            for &index in duplicates.iter().rev() {
                lines.remove(index);
            }
        }
        None => lines.insert(header + 1, replacement.to_string()),
    }
}

#[cfg(test)]
#[path = "mycnf_tests.rs"]
mod mycnf_tests;
