//! Composite Resource (XR) — an instance of a kind declared by an XRD.
//!
//! The XR's kind is not known at compile time, so it is modeled as a thin
//! wrapper over `kube::core::DynamicObject` carrying the handful of
//! well-known spec/status fields every XR has (spec.md §3, §4.B step 1).

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectReference;
use kube::core::DynamicObject;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::condition::ConditionSet;
use crate::xrd::CompositionUpdatePolicy;

/// Annotation recording the template/function-assigned name a composed
/// resource is keyed by (spec.md §3 "Composed Resource").
pub const ANNOTATION_COMPOSITION_RESOURCE_NAME: &str = "crossplane.io/composition-resource-name";
/// Label scoping composed-resource names to their owning XR (spec.md §4.F
/// step 2 "stable name-prefix label").
pub const LABEL_NAME_PREFIX: &str = "crossplane.io/composite";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionSelector {
    #[serde(default)]
    pub match_labels: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalObjectReference {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretReference {
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EnvironmentConfigSelectorMode {
    Single,
    Multiple,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EnvironmentConfigRef {
    Named { name: String },
    Selector {
        mode: EnvironmentConfigSelectorMode,
        match_labels: std::collections::BTreeMap<String, String>,
        #[serde(default)]
        sort_by_field_path: Option<String>,
        #[serde(default)]
        min_match: Option<u32>,
        #[serde(default)]
        max_match: Option<u32>,
    },
}

/// The well-known fields the engine injects into every XR's `spec`/`status`
/// (spec.md §4.B step 1). Kept as a standalone struct so it can be merged
/// into a dynamic object's JSON, rather than requiring a concrete Rust type
/// per XR kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardXrSpec {
    #[serde(default)]
    pub composition_ref: Option<LocalObjectReference>,
    #[serde(default)]
    pub composition_selector: Option<CompositionSelector>,
    #[serde(default)]
    pub composition_revision_ref: Option<LocalObjectReference>,
    #[serde(default)]
    pub composition_update_policy: Option<CompositionUpdatePolicy>,
    #[serde(default)]
    pub resource_refs: Vec<ObjectReference>,
    #[serde(default)]
    pub write_connection_secret_to_ref: Option<SecretReference>,
    #[serde(default)]
    pub environment_config_refs: Vec<EnvironmentConfigRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardXrStatus {
    #[serde(default)]
    pub conditions: ConditionSet,
    #[serde(default)]
    pub connection_details: ConnectionDetailsStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDetailsStatus {
    #[serde(default)]
    pub last_published_time: Option<chrono::DateTime<chrono::Utc>>,
}

/// A Composite Resource instance, wrapping the dynamic object with typed
/// accessors for the standard fields.
#[derive(Debug, Clone)]
pub struct CompositeResource {
    pub object: DynamicObject,
}

impl CompositeResource {
    pub fn new(object: DynamicObject) -> Self {
        Self { object }
    }

    pub fn name(&self) -> String {
        self.object.name_any()
    }

    pub fn namespace(&self) -> Option<String> {
        self.object.namespace()
    }

    pub fn uid(&self) -> Option<String> {
        self.object.uid()
    }

    pub fn spec(&self) -> Option<&Json> {
        self.object.data.get("spec")
    }

    pub fn standard_spec(&self) -> StandardXrSpec {
        self.spec()
            .and_then(|s| serde_json::from_value(s.clone()).ok())
            .unwrap_or_default()
    }

    pub fn set_standard_spec(&mut self, spec: &StandardXrSpec) {
        let mut current = self
            .object
            .data
            .get("spec")
            .cloned()
            .unwrap_or_else(|| Json::Object(Default::default()));
        if let Ok(Json::Object(patch)) = serde_json::to_value(spec) {
            if let Json::Object(ref mut map) = current {
                for (k, v) in patch {
                    map.insert(k, v);
                }
            }
        }
        self.object.data["spec"] = current;
    }

    pub fn standard_status(&self) -> StandardXrStatus {
        self.object
            .data
            .get("status")
            .and_then(|s| serde_json::from_value(s.clone()).ok())
            .unwrap_or_default()
    }

    pub fn set_standard_status(&mut self, status: &StandardXrStatus) {
        if let Ok(value) = serde_json::to_value(status) {
            self.object.data["status"] = value;
        }
    }

    /// Deterministic connection-secret name used when the XR does not
    /// explicitly set `writeConnectionSecretToRef` (spec.md §4.F step 2):
    /// `<xr.uid>`.
    pub fn default_connection_secret_name(&self) -> Option<String> {
        self.uid()
    }

    /// The stable scoping label applied to every composed resource this XR
    /// owns (spec.md §4.F step 2): `<xr.name>`.
    pub fn name_prefix_label_value(&self) -> String {
        self.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::{ObjectMeta, TypeMeta};

    fn xr_with_spec(spec: Json) -> CompositeResource {
        let mut data = serde_json::Map::new();
        data.insert("spec".to_string(), spec);
        CompositeResource::new(DynamicObject {
            types: Some(TypeMeta {
                api_version: "example.org/v1".to_string(),
                kind: "XExample".to_string(),
            }),
            metadata: ObjectMeta {
                name: Some("my-xr".to_string()),
                uid: Some("abc-123".to_string()),
                ..Default::default()
            },
            data: Json::Object(data),
        })
    }

    #[test]
    fn standard_spec_round_trips_resource_refs() {
        let xr = xr_with_spec(serde_json::json!({
            "resourceRefs": [{"apiVersion": "v1", "kind": "ConfigMap", "name": "x"}]
        }));
        let spec = xr.standard_spec();
        assert_eq!(spec.resource_refs.len(), 1);
    }

    #[test]
    fn default_connection_secret_name_is_uid() {
        let xr = xr_with_spec(serde_json::json!({}));
        assert_eq!(xr.default_connection_secret_name(), Some("abc-123".to_string()));
    }

    #[test]
    fn set_standard_spec_preserves_user_fields() {
        let mut xr = xr_with_spec(serde_json::json!({"size": 3}));
        xr.set_standard_spec(&StandardXrSpec {
            composition_ref: Some(LocalObjectReference { name: "c1".to_string() }),
            ..Default::default()
        });
        let spec = xr.object.data.get("spec").unwrap();
        assert_eq!(spec.get("size").unwrap(), 3);
        assert_eq!(spec.get("compositionRef").unwrap().get("name").unwrap(), "c1");
    }
}
