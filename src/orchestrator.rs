//! Idempotent management of the Velero resources for one namespace.
//!
//! Activation creates the recurring schedule and an instant backup;
//! deactivation deletes the schedule. Already-exists on create and
//! not-found on delete mean the cluster is already where we want it, so
//! replaying an intent is harmless. Instant backups are never deduplicated:
//! every activation gets a backup name of its own. Nothing here retries.

use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::ResourceExt;
use serde::Serialize;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};

use crate::client::{to_dynamic, ResourceClient, ResourceScope};
use crate::config::BackupSettings;
use crate::crd::backup::{instant_backup, Backup};
use crate::crd::schedule::{namespace_schedule, Schedule};
use crate::error::{Error, Result};
use crate::transition::TransitionIntent;

/// Result of one resource mutation.
#[derive(Debug)]
pub enum Outcome {
    /// The call changed the cluster.
    Applied,
    /// Nothing to do: the schedule already existed, or was already gone.
    AlreadyInDesiredState,
    /// The backend refused or did not answer in time.
    BackendError(Error),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    pub fn is_already_in_desired_state(&self) -> bool {
        matches!(self, Self::AlreadyInDesiredState)
    }

    pub fn backend_error(&self) -> Option<&Error> {
        match self {
            Self::BackendError(e) => Some(e),
            _ => None,
        }
    }
}

/// What one admission call did to the Velero resources.
#[derive(Debug)]
pub struct OrchestrationReport {
    pub intent: TransitionIntent,
    pub namespace: String,
    /// Create (activate) or delete (deactivate) of the schedule.
    pub schedule: Option<Outcome>,
    /// Create of the instant backup; activation only.
    pub backup: Option<Outcome>,
}

impl OrchestrationReport {
    fn noop(namespace: &str) -> Self {
        Self {
            intent: TransitionIntent::NoOp,
            namespace: namespace.to_string(),
            schedule: None,
            backup: None,
        }
    }

    /// Backend errors, labelled with the resource kind they hit.
    pub fn backend_errors(&self) -> Vec<(&'static str, &Error)> {
        [("Schedule", &self.schedule), ("Backup", &self.backup)]
            .into_iter()
            .filter_map(|(kind, outcome)| {
                outcome
                    .as_ref()
                    .and_then(Outcome::backend_error)
                    .map(|e| (kind, e))
            })
            .collect()
    }
}

/// Instant by which the Velero calls of one admission request must finish.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    /// A deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }
}

pub struct BackupOrchestrator {
    client: Arc<dyn ResourceClient>,
    settings: BackupSettings,
    schedules: ResourceScope,
    backups: ResourceScope,
    /// Nanosecond stamp of the last instant backup; stamps only move forward.
    last_stamp: AtomicI64,
}

impl BackupOrchestrator {
    pub fn new(client: Arc<dyn ResourceClient>, settings: BackupSettings) -> Self {
        let schedules = ResourceScope::of::<Schedule>(&settings.velero_namespace);
        let backups = ResourceScope::of::<Backup>(&settings.velero_namespace);
        Self {
            client,
            settings,
            schedules,
            backups,
            last_stamp: AtomicI64::new(i64::MIN),
        }
    }

    /// Deadline for an admission request starting now, bounded by the
    /// configured budget.
    pub fn deadline(&self) -> Deadline {
        self.deadline_within(None)
    }

    /// Like [`Self::deadline`], shortened to the API server's own timeout
    /// for the call when it sent one.
    pub fn deadline_within(&self, caller: Option<Duration>) -> Deadline {
        let budget = self.settings.admission_timeout;
        Deadline::after(caller.map_or(budget, |caller| caller.min(budget)))
    }

    /// Make sure the resource client can reach the cluster.
    pub async fn connect(&self, deadline: Deadline) -> Result<()> {
        bounded(deadline, self.client.connect()).await
    }

    /// Name of the recurring schedule for `namespace`.
    pub fn schedule_name(&self, namespace: &str) -> String {
        format!("{namespace}-{}", self.settings.backup_suffix)
    }

    /// Name of an instant backup for `namespace` taken at `at`: the UTC
    /// timestamp to the second, then the nanoseconds.
    pub fn backup_name(&self, namespace: &str, at: DateTime<Utc>) -> String {
        format!(
            "{}-{}",
            self.schedule_name(namespace),
            at.format("%Y%m%d%H%M%S-%9f")
        )
    }

    /// `now`, or one nanosecond past the previous stamp when the clock has
    /// not moved on, so no two activations share a backup name.
    fn next_stamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let Some(nanos) = now.timestamp_nanos_opt() else {
            return now;
        };
        let advance = |last: i64| nanos.max(last.saturating_add(1));
        let last = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(advance(last)))
            .unwrap_or_else(|last| last);
        DateTime::from_timestamp_nanos(advance(last))
    }

    pub async fn apply(
        &self,
        intent: TransitionIntent,
        namespace: &str,
        deadline: Deadline,
    ) -> OrchestrationReport {
        match intent {
            TransitionIntent::Activate => self.activate(namespace, deadline).await,
            TransitionIntent::Deactivate => self.deactivate(namespace, deadline).await,
            TransitionIntent::NoOp => OrchestrationReport::noop(namespace),
        }
    }

    pub async fn activate(&self, namespace: &str, deadline: Deadline) -> OrchestrationReport {
        self.activate_at(namespace, Utc::now(), deadline).await
    }

    /// Create the schedule (absorbing already-exists) and an instant backup
    /// stamped with `now`.
    pub async fn activate_at(
        &self,
        namespace: &str,
        now: DateTime<Utc>,
        deadline: Deadline,
    ) -> OrchestrationReport {
        let schedule_name = self.schedule_name(namespace);

        match bounded(deadline, self.client.get(&self.schedules, &schedule_name)).await {
            Ok(_) => info!(schedule = %schedule_name, "Velero schedule already exists"),
            Err(e) if e.is_not_found() => {
                info!(schedule = %schedule_name, "Velero schedule not found")
            }
            Err(e) => debug!(schedule = %schedule_name, error = %e, "schedule lookup failed"),
        }

        let schedule = namespace_schedule(&self.settings, &schedule_name, namespace);
        let schedule = match self.create(&self.schedules, &schedule, deadline).await {
            Ok(()) => Outcome::Applied,
            Err(e) if e.is_already_exists() => {
                info!(schedule = %schedule_name, "Velero schedule already exists");
                Outcome::AlreadyInDesiredState
            }
            Err(e) => Outcome::BackendError(e),
        };

        // A clash here means another backup took this name; it is not ours.
        let backup_name = self.backup_name(namespace, self.next_stamp(now));
        let backup = instant_backup(&self.settings, &backup_name, namespace);
        let backup = match self.create(&self.backups, &backup, deadline).await {
            Ok(()) => Outcome::Applied,
            Err(e) => Outcome::BackendError(e),
        };

        OrchestrationReport {
            intent: TransitionIntent::Activate,
            namespace: namespace.to_string(),
            schedule: Some(schedule),
            backup: Some(backup),
        }
    }

    /// Delete the schedule, absorbing not-found. Instant backups are left to
    /// expire through their own TTL.
    pub async fn deactivate(&self, namespace: &str, deadline: Deadline) -> OrchestrationReport {
        let schedule_name = self.schedule_name(namespace);
        info!(schedule = %schedule_name, "deleting Velero schedule");

        let result = bounded(deadline, self.client.delete(&self.schedules, &schedule_name)).await;

        let outcome = match result {
            Ok(()) => {
                info!(schedule = %schedule_name, "Velero schedule deleted");
                Outcome::Applied
            }
            Err(e) if e.is_not_found() => {
                info!(schedule = %schedule_name, "Velero schedule already absent");
                Outcome::AlreadyInDesiredState
            }
            Err(e) => Outcome::BackendError(e),
        };

        OrchestrationReport {
            intent: TransitionIntent::Deactivate,
            namespace: namespace.to_string(),
            schedule: Some(outcome),
            backup: None,
        }
    }

    async fn create<K: Serialize>(
        &self,
        scope: &ResourceScope,
        obj: &K,
        deadline: Deadline,
    ) -> Result<()> {
        let obj = to_dynamic(obj)?;
        let kind = &scope.resource.kind;
        let name = obj.name_any();
        info!(%kind, %name, "creating Velero resource");

        bounded(deadline, self.client.create(scope, &obj)).await?;
        info!(%kind, %name, "Velero resource created");
        Ok(())
    }
}

/// Run a client call, failing with `Error::Timeout` once `deadline` passes.
async fn bounded<T>(deadline: Deadline, call: impl Future<Output = Result<T>>) -> Result<T> {
    timeout_at(deadline.at, call)
        .await
        .unwrap_or(Err(Error::Timeout(deadline.budget)))
}
