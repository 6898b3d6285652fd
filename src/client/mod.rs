//! The get/create/delete capability the orchestrator drives Velero through.
//!
//! The orchestrator only ever sees [`ResourceClient`]; production wires in
//! [`KubeResourceClient`], tests use [`InMemoryResourceClient`].

mod kube_client;
mod memory;

use kube::api::{ApiResource, DynamicObject};
use kube::Resource;
use serde::Serialize;

use crate::error::Result;

pub use kube_client::KubeResourceClient;
pub use memory::{Call, InMemoryResourceClient};

/// A resource kind pinned to one namespace: {group, version, kind, plural, namespace}.
#[derive(Clone, Debug)]
pub struct ResourceScope {
    pub resource: ApiResource,
    pub namespace: String,
}

impl ResourceScope {
    pub fn of<K: Resource<DynamicType = ()>>(namespace: &str) -> Self {
        Self {
            resource: ApiResource::erase::<K>(&()),
            namespace: namespace.to_string(),
        }
    }

    pub fn plural(&self) -> &str {
        &self.resource.plural
    }
}

/// Named, namespaced resource access.
///
/// `get` and `delete` report a missing object as `Error::NotFound`, `create`
/// reports a name clash as `Error::AlreadyExists`. Everything else is a
/// backend error.
#[async_trait::async_trait]
pub trait ResourceClient: Send + Sync {
    /// Make sure the client can reach the cluster. Fails with
    /// `Error::ClusterConfig` when credentials cannot be obtained.
    async fn connect(&self) -> Result<()>;

    async fn get(&self, scope: &ResourceScope, name: &str) -> Result<DynamicObject>;

    async fn create(&self, scope: &ResourceScope, obj: &DynamicObject) -> Result<DynamicObject>;

    async fn delete(&self, scope: &ResourceScope, name: &str) -> Result<()>;
}

/// Erase a typed resource into the untyped form the client sends.
pub fn to_dynamic<K: Serialize>(obj: &K) -> Result<DynamicObject> {
    let value = serde_json::to_value(obj)?;
    Ok(serde_json::from_value(value)?)
}
