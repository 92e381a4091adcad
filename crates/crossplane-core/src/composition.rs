//! Composition — the recipe mapping an XR to composed resources.
//!
//! A Composition runs in one of two mutually exclusive modes: `Resources`
//! renders a fixed list of templates through the patch/transform DSL,
//! `Pipeline` hands rendering to a sequence of external functions.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::HashSet;

use crate::connection::ConnectionDetailExtractor;
use crate::error::{CoreError, Result};
use crate::patch_types::{Patch, PatchSetDefinition};
use crate::xrd::CompositionReference;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum CompositionMode {
    Resources,
    Pipeline,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompositeTypeRef {
    pub api_version: String,
    pub kind: String,
}

/// A readiness check attached to a ComposedTemplate (Resources mode only).
///
/// Each variant is evaluated against the observed composed resource by
/// `crossplane-patch::readiness`; a template with no checks at all is
/// considered ready as soon as it exists.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ReadinessCheck {
    None,
    NonEmpty { field_path: String },
    MatchString { field_path: String, match_string: String },
    MatchInteger { field_path: String, match_integer: i64 },
    MatchCondition { match_condition: MatchConditionReadiness },
    MatchTrue { field_path: String },
    MatchFalse { field_path: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchConditionReadiness {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDetailSpec {
    pub name: String,
    #[serde(flatten)]
    pub extractor: ConnectionDetailExtractor,
}

/// One template in a Resources-mode Composition.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComposedTemplate {
    /// Stable name used as the `compositionResourceName` annotation that
    /// correlates this template to the composed resource it renders.
    pub name: String,
    /// Raw base object, deserialized and patched at render time.
    pub base: Json,
    #[serde(default)]
    pub patches: Vec<Patch>,
    #[serde(default)]
    pub connection_details: Vec<ConnectionDetailSpec>,
    #[serde(default)]
    pub readiness_checks: Vec<ReadinessCheck>,
}

/// Runtime selector for a Pipeline step's function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum FunctionRuntime {
    InProcess,
    Persistent,
    OneShot,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeOptions {
    /// gRPC target for the `Persistent` runtime variant.
    #[serde(default)]
    pub target: Option<String>,
    /// OCI image reference for the `OneShot` runtime variant.
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub pull_policy: Option<String>,
    /// `Orphan` skips container cleanup after cancellation.
    #[serde(default)]
    pub cleanup_policy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FunctionReference {
    pub name: String,
    #[serde(default = "default_runtime")]
    pub runtime: FunctionRuntime,
    #[serde(default)]
    pub runtime_options: RuntimeOptions,
}

fn default_runtime() -> FunctionRuntime {
    FunctionRuntime::Persistent
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCredential {
    pub name: String,
    pub secret_ref: SecretRef,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    pub name: String,
    pub namespace: String,
}

/// One step of a Pipeline-mode Composition.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStep {
    pub step: String,
    pub function_ref: FunctionReference,
    #[serde(default)]
    pub input: Option<Json>,
    #[serde(default)]
    pub credentials: Vec<FunctionCredential>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSpec {
    #[serde(default)]
    pub default_data: Json,
}

/// `spec` of a Composition.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apiextensions.crossplane.io",
    version = "v1",
    kind = "Composition",
    plural = "compositions",
    singular = "composition",
    status = "CompositionStatus",
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct CompositionSpec {
    pub composite_type_ref: CompositeTypeRef,
    pub mode: CompositionMode,
    #[serde(default)]
    pub resources: Vec<ComposedTemplate>,
    #[serde(default)]
    pub pipeline: Vec<PipelineStep>,
    #[serde(default)]
    pub patch_sets: Vec<PatchSetDefinition>,
    #[serde(default)]
    pub environment: Option<EnvironmentSpec>,
    #[serde(default)]
    pub write_connection_secrets_to_namespace: Option<String>,
    #[serde(default)]
    pub revision_history_limit: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompositionStatus {
    #[serde(default)]
    pub conditions: crate::condition::ConditionSet,
}

impl CompositionSpec {
    /// Validate cross-field invariants: unique resource names in Resources
    /// mode, unique step and credential names in Pipeline mode, and that
    /// every `PatchSet` reference names a PatchSet that actually exists.
    pub fn validate(&self) -> Result<()> {
        match self.mode {
            CompositionMode::Resources => {
                if self.resources.is_empty() {
                    return Err(CoreError::InvalidComposition {
                        message: "Resources mode composition has no resources".to_string(),
                    });
                }
                let mut seen = HashSet::new();
                for r in &self.resources {
                    if !seen.insert(r.name.as_str()) {
                        return Err(CoreError::DuplicateResourceName { name: r.name.clone() });
                    }
                }
                let patch_set_names: HashSet<&str> =
                    self.patch_sets.iter().map(|p| p.name.as_str()).collect();
                for r in &self.resources {
                    for p in &r.patches {
                        if let Patch::PatchSet { patch_set_name } = p
                            && !patch_set_names.contains(patch_set_name.as_str())
                        {
                            return Err(CoreError::PatchSetNotFound {
                                name: patch_set_name.clone(),
                            });
                        }
                    }
                }
            }
            CompositionMode::Pipeline => {
                if self.pipeline.is_empty() {
                    return Ok(());
                }
                let mut steps = HashSet::new();
                for step in &self.pipeline {
                    if !steps.insert(step.step.as_str()) {
                        return Err(CoreError::DuplicateStepName { name: step.step.clone() });
                    }
                    let mut creds = HashSet::new();
                    for c in &step.credentials {
                        if !creds.insert(c.name.as_str()) {
                            return Err(CoreError::InvalidComposition {
                                message: format!(
                                    "duplicate credential name '{}' in step '{}'",
                                    c.name, step.step
                                ),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn default_composition_ref_target(&self) -> CompositionReference {
        CompositionReference { name: String::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_spec(mode: CompositionMode) -> CompositionSpec {
        CompositionSpec {
            composite_type_ref: CompositeTypeRef {
                api_version: "example.org/v1".to_string(),
                kind: "XExample".to_string(),
            },
            mode,
            resources: vec![],
            pipeline: vec![],
            patch_sets: vec![],
            environment: None,
            write_connection_secrets_to_namespace: None,
            revision_history_limit: None,
        }
    }

    #[test]
    fn duplicate_resource_names_are_rejected() {
        let mut spec = base_spec(CompositionMode::Resources);
        spec.resources = vec![
            ComposedTemplate {
                name: "a".to_string(),
                base: serde_json::json!({}),
                patches: vec![],
                connection_details: vec![],
                readiness_checks: vec![],
            },
            ComposedTemplate {
                name: "a".to_string(),
                base: serde_json::json!({}),
                patches: vec![],
                connection_details: vec![],
                readiness_checks: vec![],
            },
        ];
        assert!(matches!(
            spec.validate(),
            Err(CoreError::DuplicateResourceName { .. })
        ));
    }

    #[test]
    fn empty_pipeline_is_valid() {
        let spec = base_spec(CompositionMode::Pipeline);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn duplicate_step_names_are_rejected() {
        let mut spec = base_spec(CompositionMode::Pipeline);
        let step = |name: &str| PipelineStep {
            step: name.to_string(),
            function_ref: FunctionReference {
                name: "fn".to_string(),
                runtime: FunctionRuntime::Persistent,
                runtime_options: RuntimeOptions::default(),
            },
            input: None,
            credentials: vec![],
        };
        spec.pipeline = vec![step("s1"), step("s1")];
        assert!(matches!(
            spec.validate(),
            Err(CoreError::DuplicateStepName { .. })
        ));
    }
}
