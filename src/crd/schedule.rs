use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::backup::BackupSpec;
use crate::config::BackupSettings;

/// Velero `Schedule`: runs a backup template on a recurring expression.
#[derive(CustomResource, Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(group = "velero.io", version = "v1", kind = "Schedule", namespaced)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSpec {
    pub schedule: String,
    #[serde(default)]
    pub use_owner_references_in_backup: bool,
    pub template: BackupSpec,
}

/// Build the recurring schedule `name` backing up `namespace`.
pub fn namespace_schedule(settings: &BackupSettings, name: &str, namespace: &str) -> Schedule {
    let spec = ScheduleSpec {
        schedule: settings.cron_expression.clone(),
        use_owner_references_in_backup: false,
        template: BackupSpec::for_namespace(settings, namespace),
    };
    let mut schedule = Schedule::new(name, spec);
    schedule.metadata.namespace = Some(settings.velero_namespace.clone());
    schedule
}
