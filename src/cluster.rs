//! Cluster capability handle and its Kubernetes implementation.
//!
//! The pipeline talks to the cluster through the [`Cluster`] trait: one
//! operation to list ready pods and one to execute a command inside a
//! container over the pod-exec subprotocol. [`KubeCluster`] is the single
//! conforming implementation, holding an authenticated [`kube::Client`]
//! built from an explicit kubeconfig path. Tests substitute scripted
//! fakes for the trait.

use std::future::Future;
use std::pin::Pin;

use camino::Utf8Path;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, AttachParams, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWrite};
use tracing::debug;

use crate::exec::{ExecOutput, ExecTarget, exit_code_from_status};
use crate::pods::ready_pod_names;

/// Errors raised while talking to the cluster.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Raised when the kubeconfig cannot be read or interpreted.
    #[error("failed to load kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),
    /// Raised when an API call against the cluster fails.
    #[error("cluster API call failed: {0}")]
    Api(#[from] kube::Error),
    /// Raised when reading or writing an exec stream fails mid-flight.
    #[error("exec stream failed: {message}")]
    Stream {
        /// Operating system or transport error description.
        message: String,
    },
    /// Raised when the exec protocol did not attach an expected channel.
    #[error("exec {channel} channel was not attached")]
    MissingChannel {
        /// Name of the absent channel.
        channel: &'static str,
    },
    /// Raised when the termination status cannot be interpreted.
    #[error("exec status could not be interpreted: {message}")]
    Status {
        /// Description of the malformed or missing status.
        message: String,
    },
}

/// Future returned by cluster operations.
pub type ClusterFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ClusterError>> + Send + 'a>>;

/// Capability interface the backup pipeline requires from a cluster.
pub trait Cluster {
    /// Lists the names of pods whose status conditions are all `True`.
    ///
    /// The returned sequence preserves the order of the underlying list
    /// call. An empty sequence is a valid result, not an error; callers
    /// decide how to treat it.
    fn ready_pods<'a>(
        &'a self,
        namespace: &'a str,
        selector: &'a str,
    ) -> ClusterFuture<'a, Vec<String>>;

    /// Runs `command` inside the target container.
    ///
    /// Remote stdout is streamed into `stdout` as it arrives; stderr is
    /// buffered and returned in the [`ExecOutput`] together with the
    /// decoded exit code. The call blocks until the remote process exits
    /// or the stream errors; there is no timeout.
    fn exec<'a>(
        &'a self,
        target: &'a ExecTarget,
        command: &'a [String],
        stdout: &'a mut (dyn AsyncWrite + Send + Unpin),
    ) -> ClusterFuture<'a, ExecOutput>;
}

/// Cluster handle backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Builds an authenticated handle from a kubeconfig file.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Kubeconfig`] when the file cannot be read
    /// or parsed, and [`ClusterError::Api`] when no client can be built
    /// from it.
    pub async fn connect(kubeconfig: &Utf8Path) -> Result<Self, ClusterError> {
        let raw = Kubeconfig::read_from(kubeconfig.as_std_path())?;
        let config = Config::from_custom_kubeconfig(raw, &KubeConfigOptions::default()).await?;
        let client = Client::try_from(config)?;
        Ok(Self { client })
    }
}

impl Cluster for KubeCluster {
    fn ready_pods<'a>(
        &'a self,
        namespace: &'a str,
        selector: &'a str,
    ) -> ClusterFuture<'a, Vec<String>> {
        Box::pin(async move {
            let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
            let params = ListParams::default().labels(selector);
            let list = pods.list(&params).await?;
            Ok(ready_pod_names(&list.items))
        })
    }

    fn exec<'a>(
        &'a self,
        target: &'a ExecTarget,
        command: &'a [String],
        stdout: &'a mut (dyn AsyncWrite + Send + Unpin),
    ) -> ClusterFuture<'a, ExecOutput> {
        Box::pin(async move {
            debug!(
                pod = %target.pod,
                container = %target.container,
                namespace = %target.namespace,
                ?command,
                "executing command in pod"
            );

            let pods: Api<Pod> = Api::namespaced(self.client.clone(), &target.namespace);
            let params = AttachParams::default()
                .container(&target.container)
                .stdin(false)
                .stdout(true)
                .stderr(true);

            let mut attached = pods.exec(&target.pod, command.iter().cloned(), &params).await?;
            let mut remote_stdout =
                attached
                    .stdout()
                    .ok_or(ClusterError::MissingChannel { channel: "stdout" })?;
            let mut remote_stderr =
                attached
                    .stderr()
                    .ok_or(ClusterError::MissingChannel { channel: "stderr" })?;
            let status_frame = attached
                .take_status()
                .ok_or(ClusterError::MissingChannel { channel: "status" })?;

            let mut stderr = Vec::new();
            let (stdout_copied, stderr_read) = tokio::join!(
                tokio::io::copy(&mut remote_stdout, stdout),
                remote_stderr.read_to_end(&mut stderr),
            );
            stdout_copied.map_err(|err| ClusterError::Stream {
                message: err.to_string(),
            })?;
            stderr_read.map_err(|err| ClusterError::Stream {
                message: err.to_string(),
            })?;

            let termination = status_frame.await;
            attached.join().await.map_err(|err| ClusterError::Stream {
                message: err.to_string(),
            })?;

            let exit_code = exit_code_from_status(termination.as_ref())?;
            Ok(ExecOutput { exit_code, stderr })
        })
    }
}
