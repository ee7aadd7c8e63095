//! Orchestrates the end-to-end backup pipeline.
//!
//! The flow is strictly linear: discover ready pods, archive the home
//! directory inside the first one, copy the archive to the local
//! filesystem, upload it to the object store, and only then delete the
//! remote copy. Each step either hands a value to the next or halts the
//! pipeline; components return structured errors and only the binary
//! entry point terminates the process.

use camino::Utf8PathBuf;
use thiserror::Error;
use tokio::io::AsyncWrite;
use tracing::info;

use crate::archive::{ArchiveError, CleanupError, create_archive, remove_archive};
use crate::cluster::{Cluster, ClusterError};
use crate::exec::ExecTarget;
use crate::store::{ObjectStore, UploadError, Uploader};
use crate::transfer::{CommandRunner, Transfer, TransferError};

/// Label selector identifying the Jenkins controller pod.
pub const JENKINS_SELECTOR: &str = "app.kubernetes.io/component=jenkins-controller";
/// Container that holds the Jenkins home directory.
pub const JENKINS_CONTAINER: &str = "jenkins";
/// Directory archived out of the pod.
pub const JENKINS_HOME: &str = "/var/jenkins_home";
/// Archive location, identical inside the pod and on the local host.
pub const ARCHIVE_PATH: &str = "/tmp/jenkins_home.tar.gz";

/// Parameters describing one backup run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BackupRequest {
    /// Namespace the controller pod lives in.
    pub namespace: String,
    /// Label selector used to discover candidate pods.
    pub selector: String,
    /// Container the archive commands run in.
    pub container: String,
    /// Directory inside the pod to archive.
    pub source_path: Utf8PathBuf,
    /// Archive path, used both inside the pod and locally.
    pub archive_path: Utf8PathBuf,
}

impl BackupRequest {
    /// Starts a builder for a [`BackupRequest`].
    #[must_use]
    pub fn builder() -> BackupRequestBuilder {
        BackupRequestBuilder::new()
    }

    /// Builds the standard Jenkins controller request for `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Validation`] when `namespace` is empty.
    pub fn for_namespace(namespace: &str) -> Result<Self, RequestError> {
        Self::builder()
            .namespace(namespace)
            .selector(JENKINS_SELECTOR)
            .container(JENKINS_CONTAINER)
            .source_path(JENKINS_HOME)
            .archive_path(ARCHIVE_PATH)
            .build()
    }

    /// Validates the request, returning a descriptive error when a
    /// required field is missing.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Validation`] when any field is empty.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.namespace.is_empty() {
            return Err(RequestError::Validation(String::from("namespace")));
        }
        if self.selector.is_empty() {
            return Err(RequestError::Validation(String::from("selector")));
        }
        if self.container.is_empty() {
            return Err(RequestError::Validation(String::from("container")));
        }
        if self.source_path.as_str().is_empty() {
            return Err(RequestError::Validation(String::from("source_path")));
        }
        if self.archive_path.as_str().is_empty() {
            return Err(RequestError::Validation(String::from("archive_path")));
        }
        Ok(())
    }
}

/// Builder for [`BackupRequest`] that defers trimming and validation to
/// construction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BackupRequestBuilder {
    namespace: String,
    selector: String,
    container: String,
    source_path: Utf8PathBuf,
    archive_path: Utf8PathBuf,
}

impl BackupRequestBuilder {
    /// Creates an empty builder; fields must be populated before build.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the namespace.
    #[must_use]
    pub fn namespace(mut self, value: impl Into<String>) -> Self {
        self.namespace = value.into();
        self
    }

    /// Sets the label selector.
    #[must_use]
    pub fn selector(mut self, value: impl Into<String>) -> Self {
        self.selector = value.into();
        self
    }

    /// Sets the container name.
    #[must_use]
    pub fn container(mut self, value: impl Into<String>) -> Self {
        self.container = value.into();
        self
    }

    /// Sets the source directory.
    #[must_use]
    pub fn source_path(mut self, value: impl Into<Utf8PathBuf>) -> Self {
        self.source_path = value.into();
        self
    }

    /// Sets the archive path.
    #[must_use]
    pub fn archive_path(mut self, value: impl Into<Utf8PathBuf>) -> Self {
        self.archive_path = value.into();
        self
    }

    /// Builds and validates the [`BackupRequest`], trimming string
    /// inputs.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Validation`] when any required field is
    /// empty.
    pub fn build(self) -> Result<BackupRequest, RequestError> {
        let request = BackupRequest {
            namespace: self.namespace.trim().to_owned(),
            selector: self.selector.trim().to_owned(),
            container: self.container.trim().to_owned(),
            source_path: Utf8PathBuf::from(self.source_path.as_str().trim()),
            archive_path: Utf8PathBuf::from(self.archive_path.as_str().trim()),
        };
        request.validate()?;
        Ok(request)
    }
}

/// Errors raised when a request is missing required fields.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum RequestError {
    /// Raised when a request field is empty.
    #[error("missing or empty field: {0}")]
    Validation(String),
}

/// Outcome of a completed backup run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BackupReceipt {
    /// Pod the archive was taken from.
    pub pod: String,
    /// Object key the archive was uploaded under.
    pub object_key: String,
}

/// Errors surfaced while performing a backup run.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Raised when the ready-pod listing fails.
    #[error("failed to list ready pods: {0}")]
    Select(#[source] ClusterError),
    /// Raised when the selector matched no ready pods. Distinct from a
    /// connectivity failure: the cluster answered, but nothing qualified
    /// for backup.
    #[error(
        "no ready pods matched selector {selector:?} in namespace {namespace:?}; \
         check the kubeconfig, namespace, and selector"
    )]
    NoReadyPods {
        /// Namespace that was searched.
        namespace: String,
        /// Selector that matched no ready pods.
        selector: String,
    },
    /// Raised when archive creation fails.
    #[error("archive creation failed: {0}")]
    Archive(#[from] ArchiveError),
    /// Raised when the archive cannot be copied to the local filesystem.
    #[error("archive download failed: {0}")]
    Transfer(#[from] TransferError),
    /// Raised when the archive cannot be uploaded to the object store.
    #[error("archive upload failed: {0}")]
    Upload(#[from] UploadError),
    /// Raised when the remote archive cannot be deleted after upload.
    #[error("remote archive cleanup failed: {0}")]
    Cleanup(#[from] CleanupError),
}

/// Executes the backup flow using the provided collaborators.
#[derive(Debug)]
pub struct BackupOrchestrator<C, R: CommandRunner, S> {
    cluster: C,
    transfer: Transfer<R>,
    uploader: Uploader<S>,
}

impl<C, R, S> BackupOrchestrator<C, R, S>
where
    C: Cluster,
    R: CommandRunner,
    S: ObjectStore,
{
    /// Creates a new orchestrator.
    #[must_use]
    pub const fn new(cluster: C, transfer: Transfer<R>, uploader: Uploader<S>) -> Self {
        Self {
            cluster,
            transfer,
            uploader,
        }
    }

    /// Runs the pipeline end to end and returns what was backed up.
    ///
    /// Ready pods are ordered lexicographically by name and the first
    /// one is backed up, so repeated runs against the same cluster pick
    /// the same pod. Remote cleanup only runs once the upload has
    /// succeeded; when cleanup itself fails the archive remains in the
    /// pod and the error is surfaced for the operator.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError`] when pod discovery, archive creation,
    /// download, upload, or cleanup fail, and
    /// [`BackupError::NoReadyPods`] when nothing qualified for backup.
    pub async fn execute(
        &self,
        request: &BackupRequest,
        stdout: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<BackupReceipt, BackupError> {
        let mut pods = self
            .cluster
            .ready_pods(&request.namespace, &request.selector)
            .await
            .map_err(BackupError::Select)?;
        pods.sort();

        let Some(pod) = pods.first().cloned() else {
            return Err(BackupError::NoReadyPods {
                namespace: request.namespace.clone(),
                selector: request.selector.clone(),
            });
        };
        info!(?pods, chosen = %pod, "ready pods discovered");

        let target = ExecTarget {
            namespace: request.namespace.clone(),
            pod: pod.clone(),
            container: request.container.clone(),
        };

        create_archive(
            &self.cluster,
            &target,
            &request.source_path,
            &request.archive_path,
            stdout,
        )
        .await?;

        self.transfer.copy_to_local(&target, &request.archive_path)?;

        let object_key = self.uploader.upload(&request.archive_path).await?;

        remove_archive(&self.cluster, &target, &request.archive_path).await?;

        Ok(BackupReceipt { pod, object_key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rejects_empty_namespace() {
        let err = BackupRequest::builder()
            .selector(JENKINS_SELECTOR)
            .container(JENKINS_CONTAINER)
            .source_path(JENKINS_HOME)
            .archive_path(ARCHIVE_PATH)
            .build()
            .expect_err("empty namespace should fail");

        assert_eq!(err, RequestError::Validation(String::from("namespace")));
    }

    #[test]
    fn builder_trims_whitespace() {
        let request = BackupRequest::builder()
            .namespace("  jenkins  ")
            .selector(JENKINS_SELECTOR)
            .container(JENKINS_CONTAINER)
            .source_path(JENKINS_HOME)
            .archive_path(ARCHIVE_PATH)
            .build()
            .expect("request builds");

        assert_eq!(request.namespace, "jenkins");
    }

    #[test]
    fn for_namespace_uses_the_fixed_jenkins_values() {
        let request = BackupRequest::for_namespace("jenkins").expect("request builds");

        assert_eq!(request.selector, JENKINS_SELECTOR);
        assert_eq!(request.container, JENKINS_CONTAINER);
        assert_eq!(request.source_path, Utf8PathBuf::from(JENKINS_HOME));
        assert_eq!(request.archive_path, Utf8PathBuf::from(ARCHIVE_PATH));
    }

    #[test]
    fn for_namespace_rejects_blank_namespace() {
        let err = BackupRequest::for_namespace("   ").expect_err("blank namespace should fail");
        assert_eq!(err, RequestError::Validation(String::from("namespace")));
    }
}
