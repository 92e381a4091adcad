//! Usage — "resource U prevents deletion of resource T" (spec.md §4.G,
//! GLOSSARY "Usage").
//!
//! A Usage names the resource it protects (`of`) either directly or via a
//! label selector, and may optionally name the resource relying on it
//! (`by`) for documentation purposes only — the engine never walks `by`
//! transitively (spec.md §9 Open Question 2: one-hop semantics only).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::ConditionSet;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSelector {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub match_labels: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub namespace: Option<String>,
}

/// The resource a Usage protects, named either directly or by selector.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UsageTarget {
    #[serde(default)]
    pub resource_ref: Option<ResourceRef>,
    #[serde(default)]
    pub resource_selector: Option<ResourceSelector>,
}

/// `spec` of a Usage.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "protection.crossplane.io",
    version = "v1beta1",
    kind = "Usage",
    plural = "usages",
    singular = "usage",
    status = "UsageStatus",
    namespaced = true
)]
#[serde(rename_all = "camelCase")]
pub struct UsageSpec {
    pub of: UsageTarget,
    #[serde(default)]
    pub by: Option<ResourceRef>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UsageStatus {
    #[serde(default)]
    pub conditions: ConditionSet,
}

impl UsageSpec {
    /// The deterministic finalizer name stamped on every referent this
    /// Usage protects: one finalizer per (referent, Usage) pair
    /// (spec.md §4.G invariant).
    pub fn finalizer_name(usage_name: &str) -> String {
        format!("usage.crossplane.io/{usage_name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalizer_name_is_scoped_to_usage_name() {
        assert_eq!(UsageSpec::finalizer_name("my-usage"), "usage.crossplane.io/my-usage");
    }
}
