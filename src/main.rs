//! Binary entry point for the Jenkins backup CLI.

use std::process;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use jenkins_backup::{
    BackupConfig, BackupError, BackupOrchestrator, BackupRequest, ClusterError, ConfigError,
    KubeCluster, RequestError, S3Store, StoreConfig, Transfer, TransferConfig, TransferError,
    Uploader,
};

#[derive(Debug, Parser)]
#[command(
    name = "jenkins-backup",
    about = "Archive a Jenkins controller's home directory out of its pod and upload it to S3"
)]
struct Cli {
    /// Path to the kubeconfig granting access to the target cluster.
    #[arg(long, value_name = "PATH")]
    kubeconfig: Utf8PathBuf,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid backup request: {0}")]
    Request(#[from] RequestError),
    #[error("cluster connection failed: {0}")]
    Cluster(#[from] ClusterError),
    #[error("transfer setup failed: {0}")]
    Transfer(#[from] TransferError),
    #[error(transparent)]
    Backup(#[from] BackupError),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            error!(error = %err, "backup failed");
            1
        }
    };

    process::exit(exit_code);
}

/// Mirrors the original deployment's logging: JSON records on stdout at
/// info level unless `RUST_LOG` narrows or widens the filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let backup_config = BackupConfig::load_from_env()?;
    let store_config = StoreConfig::load_from_env()?;
    info!("configuration checks passed, starting jenkins backup");

    let cluster = KubeCluster::connect(&cli.kubeconfig).await?;
    let transfer = Transfer::with_process_runner(TransferConfig::new(cli.kubeconfig.clone()))?;
    let store = S3Store::connect(store_config.region.clone()).await;
    let uploader = Uploader::new(store, store_config.bucket_name.clone());

    let request = BackupRequest::for_namespace(&backup_config.namespace)?;
    let orchestrator = BackupOrchestrator::new(cluster, transfer, uploader);

    let mut tar_listing = tokio::io::sink();
    let receipt = orchestrator.execute(&request, &mut tar_listing).await?;
    info!(
        pod = %receipt.pod,
        object_key = %receipt.object_key,
        "backup finished successfully"
    );
    Ok(())
}
