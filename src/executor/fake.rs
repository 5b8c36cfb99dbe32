// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! An executor which records commands and answers them from a handler.

use super::{log_input, log_output, output_to_exec_error, BoxedExecutor, CommandLine, Executor};
use super::{ExecutionError, Output};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};

/// Handler deciding the output of each command a [`FakeExecutor`] sees.
pub type BoxedHandler = Box<dyn FnMut(&CommandLine) -> Output + Send>;

struct FakeState {
    calls: Vec<CommandLine>,
    handler: BoxedHandler,
}

/// An executor that never starts a process.
///
/// Every command is recorded; the output comes from the installed handler,
/// which defaults to a quiet success. A non-zero handler output is turned into
/// [`ExecutionError::CommandFailure`] exactly like a real command.
pub struct FakeExecutor {
    state: Mutex<FakeState>,
}

impl FakeExecutor {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                calls: Vec::new(),
                handler: Box::new(|_| Output::success()),
            }),
        })
    }

    /// Replace the handler.
    pub fn set_handler(&self, handler: BoxedHandler) {
        self.lock().handler = handler;
    }

    /// Perform some type coercion to access the commonly-used trait object.
    #[must_use]
    pub fn as_executor(self: Arc<Self>) -> BoxedExecutor {
        self
    }

    /// Every command seen so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<CommandLine> {
        self.lock().calls.clone()
    }

    /// Every command seen so far, rendered as shell strings.
    #[must_use]
    pub fn rendered_calls(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .map(CommandLine::to_shell_string)
            .collect()
    }

    /// Number of recorded commands whose rendered form contains `needle`.
    #[must_use]
    pub fn count_containing(&self, needle: &str) -> usize {
        self.rendered_calls()
            .iter()
            .filter(|call| call.contains(needle))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    async fn execute(&self, command: &CommandLine) -> Result<Output, ExecutionError> {
        let output = {
            let mut state = self.lock();
            let id = state.calls.len() as u64;
            log_input(id, command);
            state.calls.push(command.clone());
            let output = (state.handler)(command);
            log_output(id, &output);
            output
        };

        if !output.is_success() {
            return Err(output_to_exec_error(command, &output));
        }
        Ok(output)
    }
}
