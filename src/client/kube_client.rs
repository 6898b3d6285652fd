use kube::api::{Api, DeleteParams, DynamicObject, PostParams};
use kube::{Client, ResourceExt};
use tokio::sync::OnceCell;
use tracing::debug;

use super::{ResourceClient, ResourceScope};
use crate::error::{Error, Result};

/// [`ResourceClient`] backed by the Kubernetes API.
///
/// The `kube::Client` is built on first use from the in-cluster service
/// account (or a local kubeconfig), so the server can start and answer
/// no-op admissions even when credentials are not yet mounted.
#[derive(Default)]
pub struct KubeResourceClient {
    client: OnceCell<Client>,
}

impl KubeResourceClient {
    pub fn new() -> Self {
        Self::default()
    }

    async fn client(&self) -> Result<Client> {
        self.client
            .get_or_try_init(|| async {
                Client::try_default()
                    .await
                    .map_err(|e| Error::cluster_config(e.to_string()))
            })
            .await
            .cloned()
    }

    async fn api(&self, scope: &ResourceScope) -> Result<Api<DynamicObject>> {
        let client = self.client().await?;
        Ok(Api::namespaced_with(
            client,
            &scope.namespace,
            &scope.resource,
        ))
    }
}

/// Split the API errors the orchestrator expects from real failures.
fn classify(err: kube::Error, name: &str) -> Error {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => Error::NotFound(name.to_string()),
        kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
            Error::AlreadyExists(name.to_string())
        }
        other => Error::Kube(other),
    }
}

#[async_trait::async_trait]
impl ResourceClient for KubeResourceClient {
    async fn connect(&self) -> Result<()> {
        self.client().await.map(|_| ())
    }

    async fn get(&self, scope: &ResourceScope, name: &str) -> Result<DynamicObject> {
        let api = self.api(scope).await?;
        api.get(name).await.map_err(|e| classify(e, name))
    }

    async fn create(&self, scope: &ResourceScope, obj: &DynamicObject) -> Result<DynamicObject> {
        let api = self.api(scope).await?;
        let name = obj.name_any();
        let created = api
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| classify(e, &name))?;
        debug!(kind = %scope.resource.kind, %name, "created");
        Ok(created)
    }

    async fn delete(&self, scope: &ResourceScope, name: &str) -> Result<()> {
        let api = self.api(scope).await?;
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|e| classify(e, name))?;
        debug!(kind = %scope.resource.kind, %name, "deleted");
        Ok(())
    }
}
