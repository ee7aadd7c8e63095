//! Value types for remote command execution inside a pod.
//!
//! The exec subprotocol reports command termination as a structured
//! [`Status`] object rather than an exit code on the stream itself. This
//! module decodes that object into a plain integer so callers can apply
//! exit-code-specific policy without inspecting free-form message text.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;

use crate::cluster::ClusterError;

const STATUS_SUCCESS: &str = "Success";
const STATUS_FAILURE: &str = "Failure";
const REASON_NON_ZERO_EXIT: &str = "NonZeroExitCode";
const CAUSE_EXIT_CODE: &str = "ExitCode";

/// Names the pod and container a command is executed in.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecTarget {
    /// Namespace the pod lives in.
    pub namespace: String,
    /// Name of the pod.
    pub pod: String,
    /// Container within the pod that receives the command.
    pub container: String,
}

/// Result of a completed remote command.
///
/// Remote stdout is streamed into the caller's sink while the command
/// runs, so only the exit code and the buffered stderr appear here. A
/// non-zero exit code is not a transport failure: callers receive both
/// the code and the stderr the command produced.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecOutput {
    /// Exit code reported by the remote process.
    pub exit_code: i32,
    /// Standard error captured over the stream's stderr channel.
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    /// Returns `true` when the remote command exited with code zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the captured stderr as text, replacing invalid UTF-8.
    #[must_use]
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Decodes the termination [`Status`] frame into an exit code.
///
/// `Success` maps to zero. A `Failure` with the `NonZeroExitCode` reason
/// carries the code as an `ExitCode` cause, which is parsed as-is. Any
/// other shape means the command did not run to completion.
///
/// # Errors
///
/// Returns [`ClusterError::Status`] when the stream closed without a
/// status frame, when a non-zero exit carries no parsable code, or when
/// the failure is not an exit code at all (for example a missing
/// container).
pub fn exit_code_from_status(status: Option<&Status>) -> Result<i32, ClusterError> {
    let Some(frame) = status else {
        return Err(ClusterError::Status {
            message: String::from("exec stream closed without reporting a status"),
        });
    };

    match frame.status.as_deref() {
        Some(STATUS_SUCCESS) => Ok(0),
        Some(STATUS_FAILURE) if frame.reason.as_deref() == Some(REASON_NON_ZERO_EXIT) => frame
            .details
            .as_ref()
            .and_then(|details| details.causes.as_ref())
            .and_then(|causes| {
                causes
                    .iter()
                    .find(|cause| cause.reason.as_deref() == Some(CAUSE_EXIT_CODE))
            })
            .and_then(|cause| cause.message.as_deref())
            .and_then(|code| code.parse().ok())
            .ok_or_else(|| ClusterError::Status {
                message: format!(
                    "non-zero exit reported without a parsable code: {:?}",
                    frame.message
                ),
            }),
        _ => Err(ClusterError::Status {
            message: frame
                .message
                .clone()
                .unwrap_or_else(|| String::from("exec failed without a message")),
        }),
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Status, StatusCause, StatusDetails};
    use rstest::rstest;

    use super::*;

    fn success_status() -> Status {
        Status {
            status: Some(String::from("Success")),
            ..Status::default()
        }
    }

    fn non_zero_status(code: &str) -> Status {
        Status {
            status: Some(String::from("Failure")),
            reason: Some(String::from("NonZeroExitCode")),
            message: Some(format!("command terminated with exit code {code}")),
            details: Some(StatusDetails {
                causes: Some(vec![StatusCause {
                    reason: Some(String::from("ExitCode")),
                    message: Some(String::from(code)),
                    ..StatusCause::default()
                }]),
                ..StatusDetails::default()
            }),
            ..Status::default()
        }
    }

    #[test]
    fn success_status_decodes_to_zero() {
        let code = exit_code_from_status(Some(&success_status())).expect("success decodes");
        assert_eq!(code, 0);
    }

    #[rstest]
    #[case("1", 1)]
    #[case("2", 2)]
    #[case("137", 137)]
    fn non_zero_exit_cause_decodes_to_its_code(#[case] raw: &str, #[case] expected: i32) {
        let code = exit_code_from_status(Some(&non_zero_status(raw))).expect("exit cause decodes");
        assert_eq!(code, expected);
    }

    #[test]
    fn missing_status_frame_is_an_error() {
        let err = exit_code_from_status(None).expect_err("missing status should error");
        assert!(
            matches!(err, ClusterError::Status { ref message } if message.contains("without reporting")),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn failure_without_exit_cause_is_an_error() {
        let status = Status {
            status: Some(String::from("Failure")),
            reason: Some(String::from("InternalError")),
            message: Some(String::from("container not found")),
            ..Status::default()
        };

        let err = exit_code_from_status(Some(&status)).expect_err("other failures should error");
        assert!(
            matches!(err, ClusterError::Status { ref message } if message.contains("container not found")),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn non_zero_exit_without_parsable_cause_is_an_error() {
        let status = Status {
            status: Some(String::from("Failure")),
            reason: Some(String::from("NonZeroExitCode")),
            message: Some(String::from("command terminated abnormally")),
            ..Status::default()
        };

        let err = exit_code_from_status(Some(&status)).expect_err("unparsable cause should error");
        assert!(matches!(err, ClusterError::Status { .. }), "unexpected error: {err}");
    }

    #[test]
    fn exec_output_success_is_exit_code_zero() {
        let output = ExecOutput {
            exit_code: 0,
            stderr: Vec::new(),
        };
        assert!(output.is_success());

        let failed = ExecOutput {
            exit_code: 2,
            stderr: b"tar: unexpected EOF".to_vec(),
        };
        assert!(!failed.is_success());
        assert_eq!(failed.stderr_lossy(), "tar: unexpected EOF");
    }
}
