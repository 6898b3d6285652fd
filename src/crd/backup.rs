use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::BackupSettings;

/// Velero `Backup`: a one-shot backup of the included namespaces.
///
/// The spec doubles as the template of a [`super::schedule::Schedule`].
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(group = "velero.io", version = "v1", kind = "Backup", namespaced)]
#[serde(rename_all = "camelCase")]
pub struct BackupSpec {
    pub csi_snapshot_timeout: String,
    pub included_namespaces: Vec<String>,
    pub storage_location: String,
    pub ttl: String,
    pub default_volumes_to_fs_backup: bool,
}

impl BackupSpec {
    /// Backup template covering exactly one namespace.
    pub fn for_namespace(settings: &BackupSettings, namespace: &str) -> Self {
        Self {
            csi_snapshot_timeout: settings.csi_snapshot_timeout.clone(),
            included_namespaces: vec![namespace.to_string()],
            storage_location: settings.storage_location.clone(),
            ttl: settings.backup_ttl.clone(),
            default_volumes_to_fs_backup: settings.default_volumes_to_fs_backup,
        }
    }
}

/// Build the instant backup `name` for `namespace`, placed in the Velero namespace.
pub fn instant_backup(settings: &BackupSettings, name: &str, namespace: &str) -> Backup {
    let mut backup = Backup::new(name, BackupSpec::for_namespace(settings, namespace));
    backup.metadata.namespace = Some(settings.velero_namespace.clone());
    backup
}
