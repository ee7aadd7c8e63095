//! Core library for the Jenkins backup tool.
//!
//! The crate exposes a linear pipeline that archives a Jenkins
//! controller's home directory out of its Kubernetes pod, copies the
//! archive to the local filesystem, uploads it to an object store under
//! a date-stamped key, and removes the remote copy once the upload has
//! succeeded.

pub mod archive;
pub mod cluster;
pub mod config;
pub mod exec;
pub mod pods;
pub mod run;
pub mod store;
pub mod transfer;

pub use archive::{ArchiveError, CleanupError, create_archive, remove_archive};
pub use cluster::{Cluster, ClusterError, ClusterFuture, KubeCluster};
pub use config::{BackupConfig, ConfigError, StoreConfig};
pub use exec::{ExecOutput, ExecTarget};
pub use run::{
    ARCHIVE_PATH, BackupError, BackupOrchestrator, BackupReceipt, BackupRequest,
    BackupRequestBuilder, JENKINS_CONTAINER, JENKINS_HOME, JENKINS_SELECTOR, RequestError,
};
pub use store::{ObjectStore, S3Store, StoreError, StoreFuture, UploadError, Uploader};
pub use transfer::{
    CommandOutput, CommandRunner, ProcessCommandRunner, Transfer, TransferConfig, TransferError,
};
