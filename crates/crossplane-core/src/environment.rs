//! Environment — an in-memory key/value document assembled from a
//! Composition's `defaultData` and selected EnvironmentConfigs.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// `spec` of an EnvironmentConfig: an arbitrary data document.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apiextensions.crossplane.io",
    version = "v1alpha1",
    kind = "EnvironmentConfig",
    plural = "environmentconfigs",
    singular = "environmentconfig",
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConfigSpec {
    #[serde(default)]
    pub data: Json,
}

/// The merged environment document available to patches and functions
/// during a single reconcile. Read-only to functions; patchable by the
/// Resources-mode engine via `FromEnvironmentFieldPath`/`ToEnvironmentFieldPath`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environment(pub Json);

impl Environment {
    pub fn new() -> Self {
        Self(Json::Object(Default::default()))
    }

    /// Merge `defaultData` and then each selected EnvironmentConfig's `data`
    /// in declaration order, each overlay taking precedence over what came
    /// before.
    pub fn assemble(default_data: &Json, configs: impl IntoIterator<Item = Json>) -> Self {
        let mut merged = default_data.clone();
        if !merged.is_object() {
            merged = Json::Object(Default::default());
        }
        for data in configs {
            deep_merge(&mut merged, &data);
        }
        Self(merged)
    }

    pub fn get(&self, path: &str) -> Option<&Json> {
        crate::fieldpath_support::get_dotted(&self.0, path)
    }

    pub fn set(&mut self, path: &str, value: Json) {
        crate::fieldpath_support::set_dotted(&mut self.0, path, value);
    }
}

fn deep_merge(base: &mut Json, overlay: &Json) {
    match (base, overlay) {
        (Json::Object(base_map), Json::Object(overlay_map)) => {
            for (k, v) in overlay_map {
                match base_map.get_mut(k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        base_map.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assemble_merges_in_declaration_order() {
        let default_data = json!({"region": "us-east-1", "tier": "standard"});
        let env = Environment::assemble(
            &default_data,
            vec![json!({"tier": "premium"}), json!({"zone": "a"})],
        );
        assert_eq!(env.0.get("region").unwrap(), "us-east-1");
        assert_eq!(env.0.get("tier").unwrap(), "premium");
        assert_eq!(env.0.get("zone").unwrap(), "a");
    }

    #[test]
    fn later_configs_win_over_earlier_ones() {
        let env = Environment::assemble(&json!({}), vec![json!({"x": 1}), json!({"x": 2})]);
        assert_eq!(env.0.get("x").unwrap(), 2);
    }
}
