//! namespace-backup-webhook: creates and removes Velero backups as namespaces
//! gain or lose the backup-target labels.

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use namespace_backup_webhook::client::KubeResourceClient;
use namespace_backup_webhook::config::Args;
use namespace_backup_webhook::orchestrator::BackupOrchestrator;
use namespace_backup_webhook::webhook;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level_filter = args.log_filter();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        level_filter
            .clone()
            .unwrap_or_else(|| "info,kube=warn,hyper=warn,tower=warn,warp=warn".into())
            .into()
    });

    if args.log_format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    if level_filter.is_none() {
        warn!(level = %args.log_level, "unknown log level, falling back to info");
    }

    let settings = args.backup_settings();
    let server = args.server_settings();

    info!(
        velero_namespace = %settings.velero_namespace,
        cron_expression = %settings.cron_expression,
        csi_snapshot_timeout = %settings.csi_snapshot_timeout,
        storage_location = %settings.storage_location,
        backup_ttl = %settings.backup_ttl,
        default_volumes_to_fs_backup = settings.default_volumes_to_fs_backup,
        backup_suffix = %settings.backup_suffix,
        admission_timeout = ?settings.admission_timeout,
        log_format = %args.log_format,
        log_level = %args.log_level,
        "starting namespace-backup-webhook"
    );

    let orchestrator = Arc::new(BackupOrchestrator::new(
        Arc::new(KubeResourceClient::new()),
        settings,
    ));

    webhook::run(server, orchestrator).await;

    Ok(())
}
