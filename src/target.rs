//! Namespace snapshots and the backup-target predicate.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Namespace;
use kube::api::DynamicObject;
use kube::ResourceExt;

use crate::error::{Error, Result};

/// Label naming the KubeVela target a namespace was restored for.
pub const TARGET_LABEL: &str = "namespace.oam.dev/target";
/// Label marking the namespace's runtime role.
pub const RUNTIME_LABEL: &str = "usage.oam.dev/runtime";
/// Value of [`RUNTIME_LABEL`] that makes a namespace eligible for backups.
pub const RUNTIME_TARGET: &str = "target";

/// A namespace's name and labels as seen at one point of the admission call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NamespaceSnapshot {
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

/// Whether a namespace should be backed up, derived from a snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetState {
    pub is_target: bool,
    pub name: String,
}

impl NamespaceSnapshot {
    /// Decode an admission object as a core/v1 Namespace with a name.
    ///
    /// `role` prefixes the error message so callers can tell the new object
    /// (`""`) from the previous one (`"old "`).
    pub fn decode(object: Option<&DynamicObject>, role: &'static str) -> Result<Self> {
        let namespace = object
            .ok_or_else(|| invalid(role, "object is missing from the admission request"))
            .and_then(|obj| {
                serde_json::to_value(obj)
                    .and_then(serde_json::from_value::<Namespace>)
                    .map_err(|source| Error::Namespace { role, source })
            })?;

        let snapshot = Self::from(&namespace);
        if snapshot.name.is_empty() {
            return Err(invalid(role, "metadata.name is empty"));
        }
        Ok(snapshot)
    }

    pub fn target(&self) -> TargetState {
        evaluate(&self.name, &self.labels)
    }
}

impl From<&Namespace> for NamespaceSnapshot {
    fn from(ns: &Namespace) -> Self {
        Self {
            name: ns.metadata.name.clone().unwrap_or_default(),
            labels: ns.labels().clone(),
        }
    }
}

fn invalid(role: &'static str, reason: &str) -> Error {
    Error::Namespace {
        role,
        source: serde::de::Error::custom(reason),
    }
}

/// `true` iff the target label is set to a non-empty value and the runtime
/// label is exactly [`RUNTIME_TARGET`]. Values are compared verbatim.
pub fn is_target(labels: &BTreeMap<String, String>) -> bool {
    let target = labels.get(TARGET_LABEL).is_some_and(|v| !v.is_empty());
    let runtime = labels.get(RUNTIME_LABEL).is_some_and(|v| v == RUNTIME_TARGET);
    target && runtime
}

pub fn evaluate(name: &str, labels: &BTreeMap<String, String>) -> TargetState {
    TargetState {
        is_target: is_target(labels),
        name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_both_labels_make_a_target() {
        let l = labels(&[(TARGET_LABEL, "acme"), (RUNTIME_LABEL, "target")]);
        assert!(is_target(&l));
    }

    #[test]
    fn test_empty_labels_are_not_a_target() {
        assert!(!is_target(&BTreeMap::new()));
        assert!(!evaluate("ns", &BTreeMap::new()).is_target);
    }

    #[test]
    fn test_missing_either_label_is_not_a_target() {
        assert!(!is_target(&labels(&[(TARGET_LABEL, "acme")])));
        assert!(!is_target(&labels(&[(RUNTIME_LABEL, "target")])));
    }

    #[test]
    fn test_empty_target_value_is_not_a_target() {
        let l = labels(&[(TARGET_LABEL, ""), (RUNTIME_LABEL, "target")]);
        assert!(!is_target(&l));
    }

    #[test]
    fn test_whitespace_target_value_counts_as_set() {
        let l = labels(&[(TARGET_LABEL, "  "), (RUNTIME_LABEL, "target")]);
        assert!(is_target(&l));
    }

    #[test]
    fn test_runtime_value_is_exact_and_case_sensitive() {
        for runtime in ["Target", "target ", " target", "", "control-plane"] {
            let l = labels(&[(TARGET_LABEL, "acme"), (RUNTIME_LABEL, runtime)]);
            assert!(!is_target(&l), "runtime {runtime:?} must not match");
        }
    }

    #[test]
    fn test_evaluate_is_deterministic_and_carries_name() {
        let l = labels(&[(TARGET_LABEL, "acme"), (RUNTIME_LABEL, "target")]);
        let a = evaluate("team-a", &l);
        let b = evaluate("team-a", &l);
        assert_eq!(a, b);
        assert_eq!(a.name, "team-a");
    }

    #[test]
    fn test_decode_reads_name_and_labels() {
        let obj: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {
                "name": "team-a",
                "labels": {
                    "namespace.oam.dev/target": "acme",
                    "usage.oam.dev/runtime": "target"
                }
            }
        }))
        .unwrap();

        let snap = NamespaceSnapshot::decode(Some(&obj), "").unwrap();
        assert_eq!(snap.name, "team-a");
        assert!(snap.target().is_target);
    }

    #[test]
    fn test_decode_without_object_fails() {
        let err = NamespaceSnapshot::decode(None, "old ").unwrap_err();
        assert!(err.to_string().starts_with("could not parse old namespace"));
    }

    #[test]
    fn test_decode_rejects_namespace_without_name() {
        let obj: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": { "generateName": "team-" }
        }))
        .unwrap();

        let err = NamespaceSnapshot::decode(Some(&obj), "").unwrap_err();
        assert!(matches!(err, Error::Namespace { role: "", .. }));
        assert!(err.to_string().contains("metadata.name is empty"));
    }

    #[test]
    fn test_decode_rejects_malformed_namespace() {
        let obj: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": { "name": "team-a" },
            "spec": { "finalizers": "not-a-list" }
        }))
        .unwrap();

        let err = NamespaceSnapshot::decode(Some(&obj), "").unwrap_err();
        assert!(matches!(err, Error::Namespace { role: "", .. }));
    }
}
