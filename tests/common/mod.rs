//! Shared fixtures: admission reviews for namespaces and a webhook wired to
//! an in-memory resource client.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};

use namespace_backup_webhook::client::InMemoryResourceClient;
use namespace_backup_webhook::config::BackupSettings;
use namespace_backup_webhook::orchestrator::BackupOrchestrator;

pub const UID: &str = "705ab4f5-6393-11e8-b7cc-42010a800002";

/// Labels that make a namespace a backup target.
pub fn target_labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("namespace.oam.dev/target".to_string(), "acme".to_string()),
        ("usage.oam.dev/runtime".to_string(), "target".to_string()),
    ])
}

pub fn namespace(name: &str, labels: &BTreeMap<String, String>) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": { "name": name, "labels": labels }
    })
}

/// Build an AdmissionReview for a Namespace operation.
pub fn admission_review(operation: &str, object: Option<Value>, old_object: Option<Value>) -> Value {
    json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": UID,
            "kind": { "group": "", "version": "v1", "kind": "Namespace" },
            "resource": { "group": "", "version": "v1", "resource": "namespaces" },
            "name": "team-a",
            "operation": operation,
            "userInfo": { "username": "system:admin" },
            "object": object,
            "oldObject": old_object
        }
    })
}

pub struct Harness {
    pub client: Arc<InMemoryResourceClient>,
    pub orchestrator: Arc<BackupOrchestrator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_client(InMemoryResourceClient::new())
    }

    pub fn with_client(client: InMemoryResourceClient) -> Self {
        let client = Arc::new(client);
        let orchestrator = Arc::new(BackupOrchestrator::new(
            client.clone(),
            BackupSettings::default(),
        ));
        Self {
            client,
            orchestrator,
        }
    }

    /// POST a JSON body to /validate and return (status, body).
    pub async fn validate(&self, body: &Value) -> (u16, Value) {
        self.post("/validate", body).await
    }

    /// Like [`Self::validate`], with the `timeout` the API server appends.
    pub async fn validate_with_timeout(&self, timeout: &str, body: &Value) -> (u16, Value) {
        self.post(&format!("/validate?timeout={timeout}"), body).await
    }

    async fn post(&self, path: &str, body: &Value) -> (u16, Value) {
        let resp = warp::test::request()
            .method("POST")
            .path(path)
            .header("content-type", "application/json")
            .body(serde_json::to_vec(body).unwrap())
            .reply(&namespace_backup_webhook::webhook::routes(
                self.orchestrator.clone(),
            ))
            .await;

        let status = resp.status().as_u16();
        let body = serde_json::from_slice(resp.body()).unwrap_or(Value::Null);
        (status, body)
    }
}
