//! XRD Definition Controller (spec.md §4.B).
//!
//! Turns a `CompositeResourceDefinition` into a `CustomResourceDefinition`,
//! applies it, waits for it to report `Established`, and owns the dynamic
//! per-kind controller registry that starts/stops a Composite Reconciler
//! (§4.F) for the kind the XRD declares.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use kube::core::DynamicObject;
use kube::ResourceExt;
use serde_json::{json, Value as Json};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crossplane_core::condition::{reasons, types, Condition, ConditionStatus};
use crossplane_core::xrd::{CompositeResourceDefinitionSpec, XrdVersion};

use crate::error::{KubeError, Result};
use crate::store::{GroupVersionKindOwned, ObjectStore};

const CRD_GROUP: &str = "apiextensions.k8s.io";
const CRD_VERSION: &str = "v1";
const CRD_KIND: &str = "CustomResourceDefinition";
/// Annotation that suppresses CRD teardown when an XRD is deleted, leaving
/// existing custom resources of that kind orphaned but intact.
pub const ANNOTATION_DELETE_ORPHANS: &str = "crossplane.io/delete-orphans";

fn crd_gvk() -> GroupVersionKindOwned {
    GroupVersionKindOwned::new(CRD_GROUP, CRD_VERSION, CRD_KIND)
}

/// The fields injected into every XR kind's schema (spec.md §4.B step 1),
/// mirroring `crossplane_core::xr::StandardXrSpec`/`StandardXrStatus`.
fn standard_spec_properties() -> Json {
    json!({
        "compositionRef": {"type": "object", "properties": {"name": {"type": "string"}}, "required": ["name"]},
        "compositionSelector": {
            "type": "object",
            "properties": {"matchLabels": {"type": "object", "additionalProperties": {"type": "string"}}},
        },
        "compositionRevisionRef": {"type": "object", "properties": {"name": {"type": "string"}}, "required": ["name"]},
        "compositionUpdatePolicy": {"type": "string", "enum": ["Automatic", "Manual"]},
        "resourceRefs": {"type": "array", "items": {"type": "object", "x-kubernetes-preserve-unknown-fields": true}},
        "writeConnectionSecretToRef": {
            "type": "object",
            "properties": {"name": {"type": "string"}, "namespace": {"type": "string"}},
            "required": ["name", "namespace"],
        },
        "environmentConfigRefs": {"type": "array", "items": {"type": "object", "x-kubernetes-preserve-unknown-fields": true}},
    })
}

fn standard_status_properties() -> Json {
    json!({
        "conditions": {
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "type": {"type": "string"},
                    "status": {"type": "string"},
                    "reason": {"type": "string"},
                    "message": {"type": "string"},
                    "lastTransitionTime": {"type": "string", "format": "date-time"},
                },
                "required": ["type", "status"],
            },
        },
        "connectionDetails": {"type": "object", "x-kubernetes-preserve-unknown-fields": true},
    })
}

/// Merges the standard XR properties into a user-authored version schema
/// and returns the `CustomResourceDefinition` version entry for it.
fn derive_crd_version(version: &XrdVersion) -> Json {
    let mut schema = version.schema.clone();
    merge_section_properties(&mut schema, "spec", standard_spec_properties());
    merge_section_properties(&mut schema, "status", standard_status_properties());

    json!({
        "name": version.name,
        "served": version.served,
        "storage": version.referenceable,
        "schema": {"openAPIV3Schema": schema},
        "subresources": {"status": {}},
    })
}

/// Merges `extra`'s fields into `schema.properties.<section>.properties`,
/// creating `properties`/`<section>` along the way if the user schema
/// didn't declare them.
fn merge_section_properties(schema: &mut Json, section: &str, extra: Json) {
    let Json::Object(extra_map) = extra else { return };
    let Some(root) = schema.as_object_mut() else { return };
    let top_properties = root.entry("properties").or_insert_with(|| Json::Object(Default::default()));
    let Some(top_properties) = top_properties.as_object_mut() else { return };
    let section_schema = top_properties
        .entry(section)
        .or_insert_with(|| json!({"type": "object", "properties": {}}));
    let Some(section_schema) = section_schema.as_object_mut() else { return };
    let section_properties = section_schema
        .entry("properties")
        .or_insert_with(|| Json::Object(Default::default()));
    let Some(section_properties) = section_properties.as_object_mut() else { return };
    for (k, v) in extra_map {
        section_properties.entry(k).or_insert(v);
    }
}

/// Builds the `CustomResourceDefinition` manifest a given XRD implies.
pub fn derive_crd(xrd: &CompositeResourceDefinitionSpec) -> Json {
    let versions: Vec<Json> = xrd.versions.iter().map(derive_crd_version).collect();
    json!({
        "apiVersion": "apiextensions.k8s.io/v1",
        "kind": "CustomResourceDefinition",
        "metadata": {"name": xrd.crd_name()},
        "spec": {
            "group": xrd.group,
            "names": {
                "kind": xrd.names.kind,
                "plural": xrd.names.plural,
                "singular": xrd.names.singular.clone().unwrap_or_else(|| xrd.names.kind.to_lowercase()),
                "listKind": xrd.names.list_kind.clone().unwrap_or_else(|| format!("{}List", xrd.names.kind)),
            },
            "scope": "Namespaced",
            "versions": versions,
        },
    })
}

/// Applies the derived CRD and polls until its `Established` condition is
/// `True`, per spec.md §4.B step 2.
pub async fn apply_and_wait_established(
    store: &ObjectStore,
    xrd: &CompositeResourceDefinitionSpec,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<()> {
    let manifest = derive_crd(xrd);
    let obj: DynamicObject = serde_json::from_value(manifest)?;
    store.apply(&crd_gvk(), None, &obj).await?;
    store.refresh_discovery().await?;

    let name = xrd.crd_name();
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(crd) = store.get(&crd_gvk(), None, &name).await? {
            if is_established(&crd) {
                return Ok(());
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(KubeError::Transient {
                kind: "CustomResourceDefinition".into(),
                name,
                message: "timed out waiting for Established condition".into(),
            });
        }
        tokio::time::sleep(poll_interval).await;
    }
}

fn is_established(crd: &DynamicObject) -> bool {
    crd.data
        .pointer("/status/conditions")
        .and_then(|c| c.as_array())
        .map(|conditions| {
            conditions.iter().any(|c| {
                c.get("type").and_then(|t| t.as_str()) == Some("Established")
                    && c.get("status").and_then(|s| s.as_str()) == Some("True")
            })
        })
        .unwrap_or(false)
}

/// Deletes the CRD derived from an XRD, unless the XRD is annotated to
/// leave it (and its instances) orphaned (spec.md §4.B step 4).
pub async fn teardown_crd(store: &ObjectStore, xrd_annotations: &BTreeMap<String, String>, xrd: &CompositeResourceDefinitionSpec) -> Result<()> {
    if xrd_annotations.get(ANNOTATION_DELETE_ORPHANS).map(String::as_str) == Some("true") {
        return Ok(());
    }
    store.delete(&crd_gvk(), None, &xrd.crd_name()).await
}

pub fn established_condition(established: bool) -> Condition {
    if established {
        Condition::new(types::ESTABLISHED, ConditionStatus::True, reasons::WATCHING_COMPOSITE_RESOURCE)
    } else {
        Condition::new(types::ESTABLISHED, ConditionStatus::False, reasons::TERMINATING_COMPOSITE_RESOURCE)
    }
}

/// A running per-kind Composite Reconciler task.
struct ManagedController {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
    /// Hash of the watched-kind signature (group/version/kind) this
    /// controller was started for; used to detect when an XRD's kind
    /// changed and the controller must be replaced (spec.md §4.B step 3).
    kind_signature: String,
}

/// Mutex-guarded registry ensuring at most one controller per XRD name runs
/// at a time (spec.md §5 "Dynamic controller registry").
#[derive(Clone, Default)]
pub struct ControllerRegistry {
    controllers: Arc<Mutex<HashMap<String, ManagedController>>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `spawn` under `xrd_name` if no controller is running for it,
    /// or if the watched-kind signature changed. A start failure never
    /// tears down a still-running prior controller.
    pub async fn ensure_running<F>(&self, xrd_name: &str, kind_signature: String, spawn: F)
    where
        F: FnOnce(CancellationToken) -> JoinHandle<()>,
    {
        let mut controllers = self.controllers.lock().await;
        if let Some(existing) = controllers.get(xrd_name) {
            if existing.kind_signature == kind_signature && !existing.handle.is_finished() {
                return;
            }
        }
        if let Some(old) = controllers.remove(xrd_name) {
            old.cancel.cancel();
        }
        let cancel = CancellationToken::new();
        let handle = spawn(cancel.clone());
        controllers.insert(xrd_name.to_string(), ManagedController { handle, cancel, kind_signature });
    }

    pub async fn stop(&self, xrd_name: &str) {
        if let Some(controller) = self.controllers.lock().await.remove(xrd_name) {
            controller.cancel.cancel();
        }
    }

    pub async fn is_running(&self, xrd_name: &str) -> bool {
        self.controllers
            .lock()
            .await
            .get(xrd_name)
            .map(|c| !c.handle.is_finished())
            .unwrap_or(false)
    }
}

pub fn kind_signature(xrd: &CompositeResourceDefinitionSpec) -> String {
    format!("{}/{}", xrd.group, xrd.names.kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossplane_core::xrd::XrdNames;

    fn xrd() -> CompositeResourceDefinitionSpec {
        CompositeResourceDefinitionSpec {
            group: "example.org".to_string(),
            names: XrdNames { kind: "XCluster".to_string(), plural: "xclusters".to_string(), singular: None, list_kind: None },
            versions: vec![XrdVersion {
                name: "v1".to_string(),
                served: true,
                referenceable: true,
                schema: json!({"type": "object", "properties": {"spec": {"type": "object", "properties": {"size": {"type": "integer"}}}}}),
            }],
            claim_names: None,
            default_composition_ref: None,
            enforced_composition_ref: None,
            default_composition_update_policy: None,
            conversion: Default::default(),
            connection_secret_keys: None,
        }
    }

    #[test]
    fn derive_crd_injects_standard_properties() {
        let manifest = derive_crd(&xrd());
        let props = manifest.pointer("/spec/versions/0/schema/openAPIV3Schema/properties/spec/properties").unwrap();
        assert!(props.get("size").is_some(), "user-authored field preserved");
        assert!(props.get("compositionRef").is_some(), "standard field injected");
        assert!(props.get("resourceRefs").is_some());
    }

    #[test]
    fn derive_crd_names_from_xrd() {
        let manifest = derive_crd(&xrd());
        assert_eq!(manifest["metadata"]["name"], "xclusters.example.org");
        assert_eq!(manifest["spec"]["names"]["listKind"], "XClusterList");
    }

    #[test]
    fn is_established_reads_condition_array() {
        let established: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "CustomResourceDefinition",
            "metadata": {"name": "xclusters.example.org"},
            "status": {"conditions": [{"type": "Established", "status": "True"}]},
        }))
        .unwrap();
        assert!(is_established(&established));

        let pending: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "CustomResourceDefinition",
            "metadata": {"name": "xclusters.example.org"},
            "status": {"conditions": []},
        }))
        .unwrap();
        assert!(!is_established(&pending));
    }
}
