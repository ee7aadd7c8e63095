//! Remote archive creation and removal.
//!
//! The archive is produced by running tar inside the pod against a live
//! filesystem. Jenkins keeps writing while tar reads, so the command
//! tolerates files that change or vanish mid-read and the exit policy
//! treats tar's exit code 1 (archive usable, some files skipped) as
//! benign. Exit codes of two or more, and any stream failure, are fatal.
//! Removal has no such tolerance.

use camino::Utf8Path;
use thiserror::Error;
use tokio::io::AsyncWrite;
use tracing::info;

use crate::cluster::{Cluster, ClusterError};
use crate::exec::{ExecOutput, ExecTarget};

/// Path of the tar binary inside the Jenkins container.
pub const TAR_BIN: &str = "/bin/tar";
/// Path of the rm binary inside the Jenkins container.
pub const RM_BIN: &str = "/bin/rm";

/// Exit code tar uses when files changed during archiving but the
/// archive itself is usable.
const FILES_CHANGED_EXIT_CODE: i32 = 1;

/// Volatile or bulky subpaths excluded from the archive, relative to the
/// source directory.
const EXCLUDED_SUBPATHS: &[&str] = &[
    "plugins",
    "casc_configs",
    "war",
    "secret*",
    "log*",
    "caches",
];

/// Errors raised while producing the remote archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Raised when the exec stream itself fails.
    #[error("archive exec failed: {0}")]
    Exec(#[from] ClusterError),
    /// Raised when tar exits with a code the policy does not tolerate.
    #[error("tar exited with status {code}: {stderr}")]
    TarFailed {
        /// Exit code reported by tar.
        code: i32,
        /// Stderr captured from the remote command.
        stderr: String,
    },
}

/// Errors raised while deleting the remote archive.
#[derive(Debug, Error)]
pub enum CleanupError {
    /// Raised when the exec stream itself fails.
    #[error("cleanup exec failed: {0}")]
    Exec(#[from] ClusterError),
    /// Raised when the removal command exits with a non-zero code.
    #[error("rm exited with status {code}: {stderr}")]
    RemoveFailed {
        /// Exit code reported by rm.
        code: i32,
        /// Stderr captured from the remote command.
        stderr: String,
    },
}

/// Builds the filtering tar command executed inside the pod.
#[must_use]
pub fn tar_command(source: &Utf8Path, archive: &Utf8Path) -> Vec<String> {
    let mut command = vec![
        String::from(TAR_BIN),
        String::from("--ignore-failed-read"),
        String::from("-cvzf"),
        archive.to_string(),
        String::from("--exclude-vcs"),
    ];
    for subpath in EXCLUDED_SUBPATHS {
        command.push(format!("--exclude={source}/{subpath}"));
    }
    command.push(String::from("--warning=no-file-changed"));
    command.push(source.to_string());
    command
}

/// Builds the recursive force-delete command for the remote archive.
#[must_use]
pub fn removal_command(archive: &Utf8Path) -> Vec<String> {
    vec![
        String::from(RM_BIN),
        String::from("-rf"),
        archive.to_string(),
    ]
}

/// Creates the archive inside the pod, streaming tar's stdout into
/// `stdout`.
///
/// Non-empty stderr is logged regardless of the outcome; it never by
/// itself constitutes failure.
///
/// # Errors
///
/// Returns [`ArchiveError::Exec`] when the exec stream fails and
/// [`ArchiveError::TarFailed`] when tar exits with a code other than
/// zero or one.
pub async fn create_archive<C: Cluster>(
    cluster: &C,
    target: &ExecTarget,
    source: &Utf8Path,
    archive: &Utf8Path,
    stdout: &mut (dyn AsyncWrite + Send + Unpin),
) -> Result<(), ArchiveError> {
    let command = tar_command(source, archive);
    let output = cluster.exec(target, &command, stdout).await?;
    log_remote_stderr(&output);

    match output.exit_code {
        0 => Ok(()),
        FILES_CHANGED_EXIT_CODE => {
            info!("tar finished with exit code 1; files changed during archiving, continuing");
            Ok(())
        }
        code => Err(ArchiveError::TarFailed {
            code,
            stderr: output.stderr_lossy(),
        }),
    }
}

/// Deletes the archive from the pod after a successful upload.
///
/// # Errors
///
/// Returns [`CleanupError::Exec`] when the exec stream fails and
/// [`CleanupError::RemoveFailed`] on any non-zero exit; no exit code is
/// tolerated here.
pub async fn remove_archive<C: Cluster>(
    cluster: &C,
    target: &ExecTarget,
    archive: &Utf8Path,
) -> Result<(), CleanupError> {
    let command = removal_command(archive);
    let mut discard = tokio::io::sink();
    let output = cluster.exec(target, &command, &mut discard).await?;
    log_remote_stderr(&output);

    if !output.is_success() {
        return Err(CleanupError::RemoveFailed {
            code: output.exit_code,
            stderr: output.stderr_lossy(),
        });
    }

    info!(archive = %archive, "archive deleted from the remote pod");
    Ok(())
}

fn log_remote_stderr(output: &ExecOutput) {
    if !output.stderr.is_empty() {
        info!(stderr = %output.stderr_lossy(), "remote command wrote to stderr");
    }
}
