//! CompositeResourceDefinition (XRD) — declares a new XR kind.
//!
//! See spec.md §3 "CompositeResourceDefinition (XRD)" and §4.B.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::condition::ConditionSet;
use crate::error::{CoreError, Result};

/// Update policy for how an XR's selected CompositionRevision advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub enum CompositionUpdatePolicy {
    #[default]
    Automatic,
    Manual,
}

/// Strategy for converting between served versions of an XRD-defined kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub enum ConversionStrategy {
    #[default]
    None,
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct XrdNames {
    pub kind: String,
    pub plural: String,
    #[serde(default)]
    pub singular: Option<String>,
    #[serde(default)]
    pub list_kind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct XrdVersion {
    pub name: String,
    pub served: bool,
    pub referenceable: bool,
    /// The user-authored OpenAPI schema for `spec`/`status`; the engine
    /// injects the standard XR properties into a copy before it is used to
    /// derive a CRD (spec.md §4.B step 1).
    pub schema: Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClaimNames {
    pub kind: String,
    pub plural: String,
}

/// `spec` of a CompositeResourceDefinition.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apiextensions.crossplane.io",
    version = "v1",
    kind = "CompositeResourceDefinition",
    plural = "compositeresourcedefinitions",
    singular = "compositeresourcedefinition",
    status = "CompositeResourceDefinitionStatus",
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct CompositeResourceDefinitionSpec {
    pub group: String,
    pub names: XrdNames,
    pub versions: Vec<XrdVersion>,
    #[serde(default)]
    pub claim_names: Option<ClaimNames>,
    #[serde(default)]
    pub default_composition_ref: Option<CompositionReference>,
    #[serde(default)]
    pub enforced_composition_ref: Option<CompositionReference>,
    #[serde(default)]
    pub default_composition_update_policy: Option<CompositionUpdatePolicy>,
    #[serde(default)]
    pub conversion: ConversionStrategy,
    /// Allow-list of keys the engine may write into an XR's connection
    /// secret, per spec.md §4.F step 9 / §8 invariant 5.
    #[serde(default)]
    pub connection_secret_keys: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CompositionReference {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompositeResourceDefinitionStatus {
    #[serde(default)]
    pub conditions: ConditionSet,
}

impl CompositeResourceDefinitionSpec {
    /// The single referenceable version, or an error if zero or more than
    /// one version is marked referenceable (spec.md §3 invariant).
    pub fn referenceable_version(&self) -> Result<&XrdVersion> {
        let mut referenceable = self.versions.iter().filter(|v| v.referenceable);
        let version = referenceable.next().ok_or_else(|| CoreError::InvalidXrd {
            message: "no version marked referenceable".to_string(),
        })?;
        if referenceable.next().is_some() {
            return Err(CoreError::InvalidXrd {
                message: "more than one version marked referenceable".to_string(),
            });
        }
        Ok(version)
    }

    pub fn update_policy(&self) -> CompositionUpdatePolicy {
        self.default_composition_update_policy.unwrap_or_default()
    }

    /// The plural.group name used to key the dynamic controller registry
    /// (spec.md §4.B: "keyed by XRD name").
    pub fn crd_name(&self) -> String {
        format!("{}.{}", self.names.plural, self.group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(name: &str, referenceable: bool) -> XrdVersion {
        XrdVersion {
            name: name.to_string(),
            served: true,
            referenceable,
            schema: serde_json::json!({"type": "object"}),
        }
    }

    fn spec(versions: Vec<XrdVersion>) -> CompositeResourceDefinitionSpec {
        CompositeResourceDefinitionSpec {
            group: "example.org".to_string(),
            names: XrdNames {
                kind: "XExample".to_string(),
                plural: "xexamples".to_string(),
                singular: None,
                list_kind: None,
            },
            versions,
            claim_names: None,
            default_composition_ref: None,
            enforced_composition_ref: None,
            default_composition_update_policy: None,
            conversion: ConversionStrategy::None,
            connection_secret_keys: None,
        }
    }

    #[test]
    fn exactly_one_referenceable_version_is_required() {
        let s = spec(vec![version("v1", true), version("v2", false)]);
        assert_eq!(s.referenceable_version().unwrap().name, "v1");

        let none = spec(vec![version("v1", false)]);
        assert!(none.referenceable_version().is_err());

        let two = spec(vec![version("v1", true), version("v2", true)]);
        assert!(two.referenceable_version().is_err());
    }

    #[test]
    fn crd_name_is_plural_dot_group() {
        let s = spec(vec![version("v1", true)]);
        assert_eq!(s.crd_name(), "xexamples.example.org");
    }
}
