// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Command execution.
//!
//! Every external program jailrep touches (`iocage`, `zfs`, `ssh`, `scp`, `mysql`
//! inside a jail) is described as a [`CommandLine`]: a program plus an argument
//! vector, never a shell string. An [`Executor`] runs it and hands back the
//! captured [`Output`], turning a non-zero exit into [`ExecutionError::CommandFailure`].
//!
//! - In production this is a [`HostExecutor`] backed by `tokio::process`.
//! - Under test a [`fake::FakeExecutor`] records commands and answers them.
//!
//! Dry-run handling lives one layer up, in [`crate::transport::Shell`], so that
//! a dry-run never reaches any executor at all.

pub mod fake;

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// A program invocation: argument vector plus optional file redirections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Program to run, looked up in `PATH`
    pub program: String,
    /// Arguments, passed verbatim
    pub args: Vec<String>,
    /// File connected to the program's stdin
    pub stdin: Option<PathBuf>,
    /// File receiving the program's stdout instead of capturing it
    pub stdout: Option<PathBuf>,
    /// Human-readable description logged before the command runs
    pub description: Option<String>,
}

impl CommandLine {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            stdout: None,
            description: None,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Feed the contents of `path` to the program's stdin.
    #[must_use]
    pub fn stdin_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    /// Write the program's stdout to `path` (truncating it).
    #[must_use]
    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Render the command as a single POSIX shell string.
    ///
    /// Every word is quoted with `shell-escape`; redirections are appended after
    /// their quoted file names. This is only used where a transport can carry
    /// nothing but a string (the remote side of `ssh`), and for logging.
    #[must_use]
    pub fn to_shell_string(&self) -> String {
        let mut words: Vec<String> = std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|word| quote(word))
            .collect();

        if let Some(path) = &self.stdin {
            words.push("<".to_string());
            words.push(quote(&path.to_string_lossy()));
        }
        if let Some(path) = &self.stdout {
            words.push(">".to_string());
            words.push(quote(&path.to_string_lossy()));
        }

        words.join(" ")
    }

    /// `true` if `needle` appears as one of the arguments.
    #[must_use]
    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|arg| arg == needle)
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_shell_string())
    }
}

fn quote(word: &str) -> String {
    shell_escape::unix::escape(word.into()).into_owned()
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    /// Exit code; `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    #[must_use]
    pub fn success() -> Self {
        Self {
            code: Some(0),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failure() -> Self {
        Self {
            code: Some(1),
            ..Self::default()
        }
    }

    /// Successful output carrying `stdout`.
    #[must_use]
    pub fn with_stdout(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::Output> for Output {
    fn from(output: std::process::Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

/// Details of a command that ran and exited unsuccessfully.
#[derive(Debug)]
pub struct CommandFailureInfo {
    pub command: String,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl fmt::Display for CommandFailureInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self
            .code
            .map_or_else(|| "signal".to_string(), |code| code.to_string());
        write!(
            f,
            "Command [{}] executed and failed with status: {}",
            self.command, status
        )?;
        write!(f, "  stdout: {}", self.stdout.trim_end())?;
        write!(f, "  stderr: {}", self.stderr.trim_end())
    }
}

/// Errors raised while running a [`CommandLine`].
#[derive(thiserror::Error, Debug)]
pub enum ExecutionError {
    /// The program could not be started at all
    #[error("Failed to start execution of [{command}]: {err}")]
    ExecutionStart {
        command: String,
        #[source]
        err: std::io::Error,
    },

    /// A stdin/stdout redirection file could not be opened
    #[error("Failed to open redirect file {path} for [{command}]: {err}")]
    Redirect {
        command: String,
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    /// The program ran and exited non-zero
    #[error("{0}")]
    CommandFailure(Box<CommandFailureInfo>),
}

impl ExecutionError {
    /// `true` when the command ran but returned a non-zero status.
    #[must_use]
    pub fn is_command_failure(&self) -> bool {
        matches!(self, Self::CommandFailure(_))
    }
}

/// Build the error for a finished command with an unsuccessful status.
#[must_use]
pub fn output_to_exec_error(command: &CommandLine, output: &Output) -> ExecutionError {
    ExecutionError::CommandFailure(Box::new(CommandFailureInfo {
        command: command.to_shell_string(),
        code: output.code,
        stdout: output.stdout.clone(),
        stderr: output.stderr.clone(),
    }))
}

pub(crate) fn log_input(id: u64, command: &CommandLine) {
    if let Some(description) = &command.description {
        info!(id, "{}", description);
    }
    info!(id, command = %command, "running command via executor");
}

pub(crate) fn log_output(id: u64, output: &Output) {
    info!(
        id,
        result = if output.is_success() { "OK" } else { "ERROR" },
        status = output
            .code
            .map_or_else(|| "none".to_string(), |code| code.to_string()),
        "finished running command via executor"
    );
    if !output.stdout.is_empty() {
        debug!(id, stdout = %output.stdout.trim_end(), "finished command stdout");
    }
    if !output.stderr.is_empty() {
        debug!(id, stderr = %output.stderr.trim_end(), "finished command stderr");
    }
}

/// Shared handle to an executor trait object.
pub type BoxedExecutor = Arc<dyn Executor>;

/// Runs [`CommandLine`]s and returns their captured output.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Executes a command, waiting for it to complete.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] if the command cannot be started, a redirect
    /// file cannot be opened, or the command exits non-zero.
    async fn execute(&self, command: &CommandLine) -> Result<Output, ExecutionError>;
}

/// Executor that runs commands on this machine.
pub struct HostExecutor {
    counter: AtomicU64,
}

impl HostExecutor {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            counter: AtomicU64::new(0),
        })
    }

    /// Perform some type coercion to access the commonly-used trait object.
    #[must_use]
    pub fn as_executor(self: Arc<Self>) -> BoxedExecutor {
        self
    }

    fn build(
        command: &CommandLine,
    ) -> Result<tokio::process::Command, ExecutionError> {
        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args);

        match &command.stdin {
            Some(path) => {
                let file = std::fs::File::open(path).map_err(|err| ExecutionError::Redirect {
                    command: command.to_shell_string(),
                    path: path.clone(),
                    err,
                })?;
                cmd.stdin(Stdio::from(file));
            }
            None => {
                cmd.stdin(Stdio::null());
            }
        }

        if let Some(path) = &command.stdout {
            let file = std::fs::File::create(path).map_err(|err| ExecutionError::Redirect {
                command: command.to_shell_string(),
                path: path.clone(),
                err,
            })?;
            cmd.stdout(Stdio::from(file));
        }

        Ok(cmd)
    }
}

#[async_trait]
impl Executor for HostExecutor {
    async fn execute(&self, command: &CommandLine) -> Result<Output, ExecutionError> {
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        log_input(id, command);

        let mut cmd = Self::build(command)?;
        let output: Output = cmd
            .output()
            .await
            .map_err(|err| {
                error!(id, "Could not start program");
                ExecutionError::ExecutionStart {
                    command: command.to_shell_string(),
                    err,
                }
            })?
            .into();

        log_output(id, &output);
        if !output.is_success() {
            return Err(output_to_exec_error(command, &output));
        }
        Ok(output)
    }
}
