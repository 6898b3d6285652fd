use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use kube::api::DynamicObject;
use kube::ResourceExt;

use super::{ResourceClient, ResourceScope};
use crate::error::{Error, Result};

/// One call made against an [`InMemoryResourceClient`], keyed by resource plural.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Get { plural: String, name: String },
    Create { plural: String, name: String },
    Delete { plural: String, name: String },
}

type Key = (String, String, String);

/// In-memory [`ResourceClient`] for tests.
///
/// Stores objects by (plural, namespace, name) with the same not-found and
/// already-exists semantics as the API server, and records every call.
#[derive(Default)]
pub struct InMemoryResourceClient {
    objects: Mutex<BTreeMap<Key, DynamicObject>>,
    calls: Mutex<Vec<Call>>,
    unavailable: bool,
    failing: bool,
    latency: Option<Duration>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryResourceClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// `connect` fails as if no cluster credentials were available.
    #[must_use]
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Every get/create/delete fails with a backend error.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Every get/create/delete sleeps for `latency` before answering.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    /// Names of the stored objects of the given plural, sorted.
    pub fn names(&self, plural: &str) -> Vec<String> {
        lock(&self.objects)
            .keys()
            .filter(|(p, _, _)| p == plural)
            .map(|(_, _, name)| name.clone())
            .collect()
    }

    pub fn contains(&self, plural: &str, namespace: &str, name: &str) -> bool {
        let slot: Key = (plural.into(), namespace.into(), name.into());
        lock(&self.objects).contains_key(&slot)
    }

    async fn enter(&self, call: Call) -> Result<()> {
        lock(&self.calls).push(call);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing {
            return Err(Error::Backend("backend unavailable".into()));
        }
        Ok(())
    }
}

fn key(scope: &ResourceScope, name: &str) -> Key {
    (
        scope.plural().to_string(),
        scope.namespace.clone(),
        name.to_string(),
    )
}

#[async_trait::async_trait]
impl ResourceClient for InMemoryResourceClient {
    async fn connect(&self) -> Result<()> {
        if self.unavailable {
            return Err(Error::cluster_config("unable to load in-cluster configuration"));
        }
        Ok(())
    }

    async fn get(&self, scope: &ResourceScope, name: &str) -> Result<DynamicObject> {
        self.enter(Call::Get {
            plural: scope.plural().into(),
            name: name.into(),
        })
        .await?;

        lock(&self.objects)
            .get(&key(scope, name))
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    async fn create(&self, scope: &ResourceScope, obj: &DynamicObject) -> Result<DynamicObject> {
        let name = obj.name_any();
        self.enter(Call::Create {
            plural: scope.plural().into(),
            name: name.clone(),
        })
        .await?;

        let mut objects = lock(&self.objects);
        let slot = key(scope, &name);
        if objects.contains_key(&slot) {
            return Err(Error::AlreadyExists(name));
        }
        objects.insert(slot, obj.clone());
        Ok(obj.clone())
    }

    async fn delete(&self, scope: &ResourceScope, name: &str) -> Result<()> {
        self.enter(Call::Delete {
            plural: scope.plural().into(),
            name: name.into(),
        })
        .await?;

        lock(&self.objects)
            .remove(&key(scope, name))
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::to_dynamic;
    use crate::config::BackupSettings;
    use crate::crd::schedule::{namespace_schedule, Schedule};

    #[tokio::test]
    async fn test_create_then_create_again_conflicts() {
        let client = InMemoryResourceClient::new();
        let scope = ResourceScope::of::<Schedule>("velero");
        let obj = to_dynamic(&namespace_schedule(
            &BackupSettings::default(),
            "team-a-backup",
            "team-a",
        ))
        .unwrap();

        client.create(&scope, &obj).await.unwrap();
        let err = client.create(&scope, &obj).await.unwrap_err();
        assert!(err.is_already_exists());
        assert!(client.contains("schedules", "velero", "team-a-backup"));
    }

    #[tokio::test]
    async fn test_get_and_delete_missing_are_not_found() {
        let client = InMemoryResourceClient::new();
        let scope = ResourceScope::of::<Schedule>("velero");

        assert!(client.get(&scope, "nope").await.unwrap_err().is_not_found());
        assert!(client.delete(&scope, "nope").await.unwrap_err().is_not_found());
        assert_eq!(client.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_failing_client_records_call_and_errors() {
        let client = InMemoryResourceClient::new().failing();
        let scope = ResourceScope::of::<Schedule>("velero");

        let err = client.delete(&scope, "team-a-backup").await.unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
        assert_eq!(
            client.calls(),
            vec![Call::Delete {
                plural: "schedules".into(),
                name: "team-a-backup".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_unavailable_client_fails_connect() {
        let client = InMemoryResourceClient::new().unavailable();
        assert!(matches!(
            client.connect().await,
            Err(Error::ClusterConfig(_))
        ));
    }
}
