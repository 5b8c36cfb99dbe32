// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Human-readable step trace for a provisioning run.
//!
//! A [`Reporter`] is created per run and passed to every component that
//! announces a step. Each step is numbered, logged through `tracing`, and kept
//! in memory so the complete trace is available after the run, including
//! dry-runs and failed runs.

use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

/// Numbered step trace, cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    steps: Arc<Mutex<Vec<String>>>,
}

impl Reporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce the next step and return its number, starting at 1.
    pub fn step(&self, title: impl Into<String>) -> usize {
        let title = title.into();
        let mut steps = self.steps.lock().unwrap_or_else(PoisonError::into_inner);
        steps.push(title.clone());
        let number = steps.len();
        info!(step = number, "==> {}", title);
        number
    }

    /// Record a result line for the current step.
    pub fn result(&self, message: impl AsRef<str>) {
        info!("    {}", message.as_ref());
    }

    /// Record a skipped step with the reason it was skipped.
    pub fn skipped(&self, title: impl AsRef<str>, reason: impl AsRef<str>) -> usize {
        self.step(format!("{} (skipped: {})", title.as_ref(), reason.as_ref()))
    }

    /// Record a non-fatal problem.
    pub fn warning(&self, message: impl AsRef<str>) {
        warn!("    {}", message.as_ref());
    }

    /// All step titles announced so far, in order.
    #[must_use]
    pub fn steps(&self) -> Vec<String> {
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod report_tests;
