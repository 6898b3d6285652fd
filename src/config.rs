//! Process configuration, read once from flags or the environment.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

const DEFAULT_TLS_CERT: &str = "/etc/admission-webhook/tls/tls.crt";
const DEFAULT_TLS_KEY: &str = "/etc/admission-webhook/tls/tls.key";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "namespace-backup-webhook",
    about = "Admission webhook that manages Velero schedules for labelled namespaces"
)]
pub struct Args {
    /// Namespace holding the Velero Schedule and Backup resources.
    #[arg(long, default_value = "velero", env = "VELERO_NAMESPACE")]
    pub velero_namespace: String,

    /// When the schedule runs, e.g. a cron expression or "@every 1h".
    #[arg(long, default_value = "@every 1h", env = "CRON_EXPRESSION")]
    pub cron_expression: String,

    /// How long Velero waits for CSI VolumeSnapshots to become ReadyToUse.
    #[arg(long, default_value = "10m", env = "CSI_SNAPSHOT_TIMEOUT")]
    pub csi_snapshot_timeout: String,

    /// BackupStorageLocation the backups are written to.
    #[arg(long, default_value = "default", env = "STORAGE_LOCATION")]
    pub storage_location: String,

    /// Retention of each backup before Velero garbage-collects it.
    #[arg(long, default_value = "720h0m0s", env = "BACKUP_TTL")]
    pub backup_ttl: String,

    /// Use file-system backup for all pod volumes by default.
    #[arg(
        long,
        default_value = "true",
        env = "DEFAULT_VOLUMES_TO_FS_BACKUP",
        value_parser = parse_flag,
        action = clap::ArgAction::Set
    )]
    pub default_volumes_to_fs_backup: bool,

    /// Suffix appended to the namespace name to form the schedule name.
    #[arg(long, default_value = "backup", env = "BACKUP_SUFFIX")]
    pub backup_suffix: String,

    /// Log format: "text" for human-readable, "json" for structured.
    #[arg(long, default_value = "text", env = "LOG_FORMAT")]
    pub log_format: String,

    /// Log level: trace, debug, info, warn, error.
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,

    /// Port for the HTTPS webhook server.
    #[arg(long, default_value = "443", env = "WEBHOOK_PORT")]
    pub webhook_port: u16,

    /// Path to the TLS certificate for the webhook server.
    #[arg(long, default_value = DEFAULT_TLS_CERT, env = "WEBHOOK_TLS_CERT")]
    pub webhook_tls_cert: String,

    /// Path to the TLS key for the webhook server.
    #[arg(long, default_value = DEFAULT_TLS_KEY, env = "WEBHOOK_TLS_KEY")]
    pub webhook_tls_key: String,

    /// Budget for the Velero API calls of one admission request. Keep it below
    /// the webhook's `timeoutSeconds` so the response is always written.
    #[arg(long, default_value = "8", env = "ADMISSION_TIMEOUT_SECONDS")]
    pub admission_timeout_seconds: u64,
}

/// Template values for the Velero resources the webhook creates.
#[derive(Clone, Debug)]
pub struct BackupSettings {
    pub velero_namespace: String,
    pub cron_expression: String,
    pub csi_snapshot_timeout: String,
    pub storage_location: String,
    pub backup_ttl: String,
    pub default_volumes_to_fs_backup: bool,
    pub backup_suffix: String,
    pub admission_timeout: Duration,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            velero_namespace: "velero".into(),
            cron_expression: "@every 1h".into(),
            csi_snapshot_timeout: "10m".into(),
            storage_location: "default".into(),
            backup_ttl: "720h0m0s".into(),
            default_volumes_to_fs_backup: true,
            backup_suffix: "backup".into(),
            admission_timeout: Duration::from_secs(8),
        }
    }
}

/// Where and how the HTTPS server listens.
#[derive(Clone, Debug)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub tls_cert: String,
    pub tls_key: String,
}

impl Args {
    /// Settings for the Velero resources. A setting given as an empty string
    /// keeps its default.
    pub fn backup_settings(&self) -> BackupSettings {
        let defaults = BackupSettings::default();
        BackupSettings {
            velero_namespace: or_default(&self.velero_namespace, defaults.velero_namespace),
            cron_expression: or_default(&self.cron_expression, defaults.cron_expression),
            csi_snapshot_timeout: or_default(
                &self.csi_snapshot_timeout,
                defaults.csi_snapshot_timeout,
            ),
            storage_location: or_default(&self.storage_location, defaults.storage_location),
            backup_ttl: or_default(&self.backup_ttl, defaults.backup_ttl),
            default_volumes_to_fs_backup: self.default_volumes_to_fs_backup,
            backup_suffix: or_default(&self.backup_suffix, defaults.backup_suffix),
            admission_timeout: Duration::from_secs(self.admission_timeout_seconds),
        }
    }

    pub fn server_settings(&self) -> ServerSettings {
        ServerSettings {
            addr: SocketAddr::from(([0, 0, 0, 0], self.webhook_port)),
            tls_cert: or_default(&self.webhook_tls_cert, DEFAULT_TLS_CERT.into()),
            tls_key: or_default(&self.webhook_tls_key, DEFAULT_TLS_KEY.into()),
        }
    }

    /// Filter directive for `tracing_subscriber::EnvFilter`, or `None` when
    /// the configured level is not recognised.
    pub fn log_filter(&self) -> Option<String> {
        let level = normalize_level(&self.log_level)?;
        Some(format!("{level},kube=warn,hyper=warn,tower=warn,warp=warn"))
    }
}

/// An exported but empty variable counts as unset.
fn or_default(value: &str, default: String) -> String {
    if value.is_empty() {
        default
    } else {
        value.to_string()
    }
}

/// Empty or case-insensitive "true" enables the flag; anything else disables it.
fn parse_flag(value: &str) -> Result<bool, String> {
    Ok(value.is_empty() || value.eq_ignore_ascii_case("true"))
}

/// Map the accepted level names onto tracing's levels.
fn normalize_level(level: &str) -> Option<&'static str> {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "" | "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "fatal" | "panic" => Some("error"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["namespace-backup-webhook"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_match_backup_settings_default() {
        let args = parse(&["--velero-namespace", "velero"]);
        let settings = args.backup_settings();
        let defaults = BackupSettings::default();

        assert_eq!(settings.velero_namespace, defaults.velero_namespace);
        assert_eq!(settings.cron_expression, "@every 1h");
        assert_eq!(settings.csi_snapshot_timeout, "10m");
        assert_eq!(settings.storage_location, "default");
        assert_eq!(settings.backup_ttl, "720h0m0s");
        assert!(settings.default_volumes_to_fs_backup);
        assert_eq!(settings.backup_suffix, "backup");
        assert_eq!(settings.admission_timeout, Duration::from_secs(8));
    }

    #[test]
    fn test_empty_values_fall_back_to_defaults() {
        let args = parse(&[
            "--velero-namespace",
            "",
            "--backup-suffix",
            "",
            "--cron-expression",
            "",
            "--storage-location",
            "",
            "--backup-ttl",
            "",
            "--csi-snapshot-timeout",
            "",
            "--webhook-tls-cert",
            "",
        ]);
        let settings = args.backup_settings();

        assert_eq!(settings.velero_namespace, "velero");
        assert_eq!(settings.backup_suffix, "backup");
        assert_eq!(settings.cron_expression, "@every 1h");
        assert_eq!(settings.storage_location, "default");
        assert_eq!(settings.backup_ttl, "720h0m0s");
        assert_eq!(settings.csi_snapshot_timeout, "10m");
        assert_eq!(args.server_settings().tls_cert, DEFAULT_TLS_CERT);
    }

    #[test]
    fn test_explicit_values_are_kept() {
        let args = parse(&["--velero-namespace", "backups", "--backup-suffix", "snap"]);
        let settings = args.backup_settings();
        assert_eq!(settings.velero_namespace, "backups");
        assert_eq!(settings.backup_suffix, "snap");
    }

    #[test]
    fn test_fs_backup_flag_parsing() {
        assert!(parse_flag("").unwrap());
        assert!(parse_flag("true").unwrap());
        assert!(parse_flag("TRUE").unwrap());
        assert!(!parse_flag("false").unwrap());
        assert!(!parse_flag("yes").unwrap());
        assert!(!parse_flag("1").unwrap());
    }

    #[test]
    fn test_fs_backup_flag_from_cli() {
        let args = parse(&["--default-volumes-to-fs-backup", "False"]);
        assert!(!args.backup_settings().default_volumes_to_fs_backup);
    }

    #[test]
    fn test_server_settings_bind_all_interfaces() {
        let args = parse(&["--webhook-port", "8443"]);
        let server = args.server_settings();
        assert_eq!(server.addr.to_string(), "0.0.0.0:8443");
        assert_eq!(server.tls_cert, "/etc/admission-webhook/tls/tls.crt");
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(normalize_level("DEBUG"), Some("debug"));
        assert_eq!(normalize_level("warning"), Some("warn"));
        assert_eq!(normalize_level("fatal"), Some("error"));
        assert_eq!(normalize_level("verbose"), None);

        let args = parse(&["--log-level", "debug"]);
        assert!(args.log_filter().unwrap().starts_with("debug,"));
    }
}
