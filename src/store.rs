//! Object store upload with date-stamped naming.
//!
//! The local archive is renamed in place to carry the backup date before
//! the body is streamed to the bucket, so the object key and the file on
//! disk always agree. The rename is deliberately not rolled back when a
//! later step fails. Uploads go through the [`ObjectStore`] trait;
//! [`S3Store`] is the production implementation.

use std::fs;
use std::future::Future;
use std::pin::Pin;

use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{Local, NaiveDate};
use thiserror::Error;
use tracing::info;

/// Prefix under which every uploaded archive is namespaced.
pub const OBJECT_PREFIX: &str = "/jenkins-backup";

/// Date format appended to the archive name, e.g. `04-30-2021`.
pub const DATE_FORMAT: &str = "%m-%d-%Y";

/// Retry budget for transient network errors during upload.
const UPLOAD_MAX_ATTEMPTS: u32 = 3;

/// Errors raised by object store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Raised when the local file cannot be opened for streaming.
    #[error("unable to open {path}: {message}")]
    Open {
        /// File that could not be read.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the upload does not complete within the retry budget.
    #[error("upload to bucket {bucket} failed: {message}")]
    Upload {
        /// Destination bucket.
        bucket: String,
        /// Service error description.
        message: String,
    },
}

/// Errors raised while preparing and uploading the archive.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Raised when the date-stamp rename fails.
    #[error("unable to rename {path}: {message}")]
    Rename {
        /// File that could not be renamed.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the archive path has no final component to derive a
    /// key from.
    #[error("archive path has no file name: {path}")]
    MissingFileName {
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// Raised when the store rejects the upload.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Future returned by object store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Minimal interface implemented by object stores.
pub trait ObjectStore {
    /// Streams the file at `path` to `key` in `bucket`.
    fn put_file<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        path: &'a Utf8Path,
    ) -> StoreFuture<'a, ()>;
}

/// Object store backed by S3.
#[derive(Clone, Debug)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    /// Builds a client scoped to `region` with a bounded retry budget for
    /// transient network errors.
    pub async fn connect(region: String) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region))
            .retry_config(RetryConfig::standard().with_max_attempts(UPLOAD_MAX_ATTEMPTS))
            .load()
            .await;
        Self {
            client: Client::new(&config),
        }
    }
}

impl ObjectStore for S3Store {
    fn put_file<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        path: &'a Utf8Path,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let body = ByteStream::from_path(path.as_std_path()).await.map_err(|err| {
                StoreError::Open {
                    path: path.to_owned(),
                    message: err.to_string(),
                }
            })?;

            self.client
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(body)
                .send()
                .await
                .map_err(|err| StoreError::Upload {
                    bucket: bucket.to_owned(),
                    message: err.to_string(),
                })?;

            Ok(())
        })
    }
}

/// Appends `date` to the path in `MM-DD-YYYY` form.
#[must_use]
pub fn date_stamped_path(path: &Utf8Path, date: NaiveDate) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{path}.{}", date.format(DATE_FORMAT)))
}

/// Derives the bucket key for a stamped archive path.
///
/// The key always begins with the backup namespace prefix and ends with
/// the basename of the stamped file.
///
/// # Errors
///
/// Returns [`UploadError::MissingFileName`] when the path has no final
/// component.
pub fn object_key(path: &Utf8Path) -> Result<String, UploadError> {
    let base = path.file_name().ok_or_else(|| UploadError::MissingFileName {
        path: path.to_owned(),
    })?;
    Ok(format!("{OBJECT_PREFIX}/{base}"))
}

/// Renames the archive with the backup date and streams it to a bucket.
#[derive(Clone, Debug)]
pub struct Uploader<S> {
    store: S,
    bucket: String,
}

impl<S: ObjectStore> Uploader<S> {
    /// Creates a new uploader targeting `bucket`.
    #[must_use]
    pub const fn new(store: S, bucket: String) -> Self {
        Self { store, bucket }
    }

    /// Stamps the local archive with today's date and uploads it.
    ///
    /// The rename happens before the upload and is not reverted on
    /// failure; the local file keeps its stamped name either way. The
    /// local archive is never deleted.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Rename`] when the archive cannot be
    /// renamed, [`UploadError::MissingFileName`] when no key can be
    /// derived, and [`UploadError::Store`] when the upload fails after
    /// the store's retry budget.
    pub async fn upload(&self, local_path: &Utf8Path) -> Result<String, UploadError> {
        let stamped = date_stamped_path(local_path, Local::now().date_naive());
        fs::rename(local_path, &stamped).map_err(|err| UploadError::Rename {
            path: local_path.to_owned(),
            message: err.to_string(),
        })?;

        let key = object_key(&stamped)?;
        self.store.put_file(&self.bucket, &key, &stamped).await?;
        info!(key = %key, bucket = %self.bucket, "archive uploaded to the object store");
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use std::fs::write;
    use std::sync::Mutex;

    use tempfile::TempDir;

    use super::*;

    struct RecordingStore {
        puts: Mutex<Vec<(String, String, Utf8PathBuf)>>,
        fail: bool,
    }

    impl RecordingStore {
        fn succeeding() -> Self {
            Self {
                puts: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                puts: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn puts(&self) -> Vec<(String, String, Utf8PathBuf)> {
            self.puts.lock().expect("puts lock").clone()
        }
    }

    impl ObjectStore for &RecordingStore {
        fn put_file<'a>(
            &'a self,
            bucket: &'a str,
            key: &'a str,
            path: &'a Utf8Path,
        ) -> StoreFuture<'a, ()> {
            Box::pin(async move {
                self.puts.lock().expect("puts lock").push((
                    bucket.to_owned(),
                    key.to_owned(),
                    path.to_owned(),
                ));
                if self.fail {
                    return Err(StoreError::Upload {
                        bucket: bucket.to_owned(),
                        message: String::from("simulated transient failure"),
                    });
                }
                Ok(())
            })
        }
    }

    fn april_30() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 4, 30).expect("valid date")
    }

    fn workspace_archive(dir: &TempDir) -> Utf8PathBuf {
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .expect("temp path should be UTF-8");
        let archive = root.join("jenkins_home.tar.gz");
        write(&archive, b"archive-bytes").expect("write archive fixture");
        archive
    }

    #[test]
    fn stamped_path_appends_the_date() {
        let stamped = date_stamped_path(
            Utf8PathBuf::from("/tmp/jenkins_home.tar.gz").as_path(),
            april_30(),
        );
        assert_eq!(stamped, Utf8PathBuf::from("/tmp/jenkins_home.tar.gz.04-30-2021"));
    }

    #[test]
    fn object_key_joins_prefix_and_basename() {
        let key = object_key(Utf8PathBuf::from("/tmp/jenkins_home.tar.gz.04-30-2021").as_path())
            .expect("key derives");
        assert_eq!(key, "/jenkins-backup/jenkins_home.tar.gz.04-30-2021");
    }

    #[test]
    fn keys_for_two_dates_differ_only_in_the_suffix() {
        let archive = Utf8PathBuf::from("/tmp/jenkins_home.tar.gz");
        let first = object_key(&date_stamped_path(&archive, april_30())).expect("key derives");
        let second = object_key(&date_stamped_path(
            &archive,
            NaiveDate::from_ymd_opt(2021, 5, 1).expect("valid date"),
        ))
        .expect("key derives");

        assert_eq!(first, "/jenkins-backup/jenkins_home.tar.gz.04-30-2021");
        assert_eq!(second, "/jenkins-backup/jenkins_home.tar.gz.05-01-2021");
    }

    #[test]
    fn object_key_requires_a_file_name() {
        let err = object_key(Utf8PathBuf::from("/").as_path()).expect_err("no basename");
        assert!(matches!(err, UploadError::MissingFileName { .. }));
    }

    #[tokio::test]
    async fn upload_renames_then_streams_the_stamped_file() {
        let dir = TempDir::new().expect("create temp dir");
        let archive = workspace_archive(&dir);
        let store = RecordingStore::succeeding();
        let uploader = Uploader::new(&store, String::from("backups"));

        let key = uploader.upload(&archive).await.expect("upload succeeds");

        assert!(key.starts_with("/jenkins-backup/jenkins_home.tar.gz."));
        assert!(!archive.exists(), "original name should no longer exist");

        let puts = store.puts();
        assert_eq!(puts.len(), 1);
        let Some((bucket, put_key, path)) = puts.first() else {
            panic!("store recorded no puts");
        };
        assert_eq!(bucket, "backups");
        assert_eq!(put_key, &key);
        assert!(path.exists(), "stamped file should exist on disk");
    }

    #[tokio::test]
    async fn failed_upload_leaves_the_renamed_file_behind() {
        let dir = TempDir::new().expect("create temp dir");
        let archive = workspace_archive(&dir);
        let store = RecordingStore::failing();
        let uploader = Uploader::new(&store, String::from("backups"));

        let err = uploader.upload(&archive).await.expect_err("upload fails");
        assert!(matches!(err, UploadError::Store(StoreError::Upload { .. })));

        assert!(
            !archive.exists(),
            "rename must not be rolled back after a failed upload"
        );
        let puts = store.puts();
        let Some((_, _, stamped)) = puts.first() else {
            panic!("store recorded no puts");
        };
        assert!(stamped.exists(), "stamped file should remain on disk");
        assert!(
            stamped
                .file_name()
                .is_some_and(|name| name.starts_with("jenkins_home.tar.gz.")),
            "stamped name should extend the original: {stamped}"
        );
    }
}
