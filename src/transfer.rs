//! Out-of-band archive download via `kubectl cp`.
//!
//! Copying a binary archive over the exec stream is fragile (TTY
//! mangling, partial frames), so the transfer shells out to the cluster
//! CLI's dedicated copy subcommand instead. The subprocess boundary sits
//! behind [`CommandRunner`] to support fakes in tests.

use std::ffi::OsString;
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::info;

use crate::exec::ExecTarget;

/// Default name of the cluster CLI binary resolved from `PATH`.
pub const DEFAULT_KUBECTL_BIN: &str = "kubectl";

/// Settings for the copy subprocess.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransferConfig {
    /// Path to the `kubectl` executable.
    pub kubectl_bin: String,
    /// Kubeconfig granting access to the cluster, passed through to the
    /// subprocess.
    pub kubeconfig: Utf8PathBuf,
}

impl TransferConfig {
    /// Creates a configuration using the default `kubectl` binary.
    #[must_use]
    pub fn new(kubeconfig: Utf8PathBuf) -> Self {
        Self {
            kubectl_bin: String::from(DEFAULT_KUBECTL_BIN),
            kubeconfig,
        }
    }

    /// Ensures configuration values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidConfig`] when any required field is
    /// empty.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.kubectl_bin.trim().is_empty() {
            return Err(TransferError::InvalidConfig {
                field: String::from("kubectl_bin"),
            });
        }
        if self.kubeconfig.as_str().trim().is_empty() {
            return Err(TransferError::InvalidConfig {
                field: String::from("kubeconfig"),
            });
        }
        Ok(())
    }
}

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, TransferError>;
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, TransferError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| TransferError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Errors surfaced while copying the archive to the local filesystem.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TransferError {
    /// Raised when configuration is missing required values.
    #[error("invalid transfer configuration: missing {field}")]
    InvalidConfig {
        /// Configuration field that failed validation.
        field: String,
    },
    /// Raised when the copy subprocess cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the copy subprocess completes with a non-zero exit code.
    #[error("{program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Command name used for the attempted operation.
        program: String,
        /// Exit status as reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the process.
        stderr: String,
    },
}

/// Copies the archive out of the pod with the cluster CLI.
#[derive(Clone, Debug)]
pub struct Transfer<R: CommandRunner> {
    config: TransferConfig,
    runner: R,
}

impl Transfer<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidConfig`] when validation fails.
    pub fn with_process_runner(config: TransferConfig) -> Result<Self, TransferError> {
        Self::new(config, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> Transfer<R> {
    /// Creates a new transfer using the provided runner and configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidConfig`] when configuration
    /// validation fails.
    pub fn new(config: TransferConfig, runner: R) -> Result<Self, TransferError> {
        config.validate()?;
        Ok(Self { config, runner })
    }

    /// Copies `remote_path` inside the pod to the identical local path.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Spawn`] when the subprocess cannot start
    /// and [`TransferError::CommandFailure`] on any non-zero exit; there
    /// is no retry.
    pub fn copy_to_local(
        &self,
        target: &ExecTarget,
        remote_path: &Utf8Path,
    ) -> Result<(), TransferError> {
        let args = self.build_copy_args(target, remote_path);
        let output = self.runner.run(&self.config.kubectl_bin, &args)?;
        if output.is_success() {
            info!(path = %remote_path, "archive copied from the pod to the local filesystem");
            return Ok(());
        }

        let status_text = output
            .code
            .map_or_else(|| String::from("unknown"), |code| code.to_string());
        Err(TransferError::CommandFailure {
            program: self.config.kubectl_bin.clone(),
            status: output.code,
            status_text,
            stderr: output.stderr,
        })
    }

    fn build_copy_args(&self, target: &ExecTarget, remote_path: &Utf8Path) -> Vec<OsString> {
        vec![
            OsString::from("cp"),
            OsString::from("-n"),
            OsString::from(&target.namespace),
            OsString::from("-c"),
            OsString::from(&target.container),
            OsString::from(format!("{}:{remote_path}", target.pod)),
            OsString::from(remote_path),
            OsString::from("--kubeconfig"),
            OsString::from(self.config.kubeconfig.as_str()),
        ]
    }
}
