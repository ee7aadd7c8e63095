//! Configuration loading via `ortho-config`.
//!
//! Both structs default every field to an empty string so loading never
//! fails on absence alone; [`BackupConfig::load_from_env`] and
//! [`StoreConfig::load_from_env`] validate presence eagerly and report
//! which environment variable to set. This keeps the assertion ahead of
//! any remote call.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Backup target configuration derived from the environment.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "JENKINS")]
pub struct BackupConfig {
    /// Namespace hosting the Jenkins controller pod.
    #[ortho_config(default = String::new())]
    pub namespace: String,
}

/// Object store configuration derived from the environment.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "S3")]
pub struct StoreConfig {
    /// Region the upload session is scoped to.
    #[ortho_config(default = String::new())]
    pub region: String,
    /// Bucket that receives the archive.
    #[ortho_config(default = String::new())]
    pub bucket_name: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
    section: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
        section: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
            section,
        }
    }
}

fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to [{}] in jenkins-backup.toml",
            metadata.description, metadata.env_var, metadata.toml_key, metadata.section
        )));
    }
    Ok(())
}

impl BackupConfig {
    /// Loads and validates configuration from the environment without
    /// consuming CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge
    /// sources and [`ConfigError::MissingField`] when a required value is
    /// absent.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let config = Self::load_from_iter([std::ffi::OsString::from("jenkins-backup")])
            .map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that required values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the environment
    /// variable to set when a value is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.namespace,
            &FieldMetadata::new(
                "Jenkins namespace",
                "JENKINS_NAMESPACE",
                "namespace",
                "backup",
            ),
        )
    }
}

impl StoreConfig {
    /// Loads and validates configuration from the environment without
    /// consuming CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge
    /// sources and [`ConfigError::MissingField`] when a required value is
    /// absent.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let config = Self::load_from_iter([std::ffi::OsString::from("jenkins-backup")])
            .map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that required values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the environment
    /// variable to set when a value is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.region,
            &FieldMetadata::new("storage region", "S3_REGION", "region", "store"),
        )?;
        require_field(
            &self.bucket_name,
            &FieldMetadata::new(
                "storage bucket name",
                "S3_BUCKET_NAME",
                "bucket_name",
                "store",
            ),
        )?;
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_config_rejects_empty_namespace() {
        let config = BackupConfig {
            namespace: String::from("  "),
        };

        let err = config.validate().expect_err("blank namespace should fail");
        assert!(
            matches!(err, ConfigError::MissingField(ref message) if message.contains("JENKINS_NAMESPACE")),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn backup_config_accepts_populated_namespace() {
        let config = BackupConfig {
            namespace: String::from("jenkins"),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn store_config_reports_first_missing_field() {
        let config = StoreConfig {
            region: String::new(),
            bucket_name: String::from("backups"),
        };

        let err = config.validate().expect_err("missing region should fail");
        assert!(
            matches!(err, ConfigError::MissingField(ref message) if message.contains("S3_REGION")),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn store_config_reports_missing_bucket() {
        let config = StoreConfig {
            region: String::from("eu-west-1"),
            bucket_name: String::new(),
        };

        let err = config.validate().expect_err("missing bucket should fail");
        assert!(
            matches!(err, ConfigError::MissingField(ref message) if message.contains("S3_BUCKET_NAME")),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn store_config_accepts_complete_values() {
        let config = StoreConfig {
            region: String::from("eu-west-1"),
            bucket_name: String::from("backups"),
        };
        assert!(config.validate().is_ok());
    }
}
