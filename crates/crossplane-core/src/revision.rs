//! CompositionRevision — an immutable, content-addressed snapshot of a
//! Composition (spec.md §3 "CompositionRevision", §4.C).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::composition::{CompositeTypeRef, CompositionMode, CompositionSpec, ComposedTemplate, EnvironmentSpec, PipelineStep};
use crate::condition::ConditionSet;
use crate::hash::{short_hash, spec_hash};
use crate::patch_types::PatchSetDefinition;

pub const LABEL_COMPOSITION_NAME: &str = "crossplane.io/composition-name";
pub const LABEL_COMPOSITION_HASH: &str = "crossplane.io/composition-hash";

/// `spec` of a CompositionRevision — a full copy of the Composition spec
/// plus the monotonic `revision` counter. The `mode`/`resources`/`pipeline`/
/// etc. fields are copied verbatim, so a revision can be rendered without
/// re-reading the (mutable) Composition.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apiextensions.crossplane.io",
    version = "v1",
    kind = "CompositionRevision",
    plural = "compositionrevisions",
    singular = "compositionrevision",
    status = "CompositionRevisionStatus",
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct CompositionRevisionSpec {
    pub revision: i64,
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
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub enum RevisionValidity {
    #[default]
    Unknown,
    Valid,
    Invalid,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompositionRevisionStatus {
    #[serde(default)]
    pub conditions: ConditionSet,
    /// Set to `Invalid` when a referenced function lacks the `composition`
    /// capability (spec.md §4.E "Capability checking").
    #[serde(default)]
    pub validity: RevisionValidity,
}

impl CompositionRevisionSpec {
    pub fn from_composition(spec: &CompositionSpec, revision: i64) -> Self {
        Self {
            revision,
            composite_type_ref: spec.composite_type_ref.clone(),
            mode: spec.mode,
            resources: spec.resources.clone(),
            pipeline: spec.pipeline.clone(),
            patch_sets: spec.patch_sets.clone(),
            environment: spec.environment.clone(),
            write_connection_secrets_to_namespace: spec.write_connection_secrets_to_namespace.clone(),
        }
    }

    /// Canonicalised content hash over everything except `revision` itself,
    /// so the revision counter never perturbs the hash that decides whether
    /// a new revision is needed (spec.md §9 "Revision hashing").
    pub fn content_hash(&self) -> serde_json::Result<String> {
        let mut unversioned = self.clone();
        unversioned.revision = 0;
        spec_hash(&unversioned)
    }

    /// `<composition-name>-<hash[0:7]>`, per spec.md §3/§6.
    pub fn name(&self, composition_name: &str, hash: &str) -> String {
        format!("{}-{}", composition_name, short_hash(hash))
    }

    pub fn labels(&self, composition_name: &str, hash: &str) -> std::collections::BTreeMap<String, String> {
        let mut labels = std::collections::BTreeMap::new();
        labels.insert(LABEL_COMPOSITION_NAME.to_string(), composition_name.to_string());
        labels.insert(
            LABEL_COMPOSITION_HASH.to_string(),
            hash.chars().take(63).collect(),
        );
        labels
    }
}

/// Returned by the revision manager's reconcile step (spec.md §4.C).
#[derive(Debug, Clone)]
pub struct RevisionPlan {
    pub needs_new_revision: bool,
    pub next_revision: i64,
    pub hash: String,
    pub name: String,
}

/// Given a Composition's current spec and the highest existing revision (if
/// any), decide whether a new CompositionRevision is needed.
pub fn plan_revision(
    composition_name: &str,
    spec: &CompositionSpec,
    highest_existing: Option<(i64, &str)>,
) -> serde_json::Result<RevisionPlan> {
    let candidate = CompositionRevisionSpec::from_composition(spec, 0);
    let hash = candidate.content_hash()?;

    let (needs_new_revision, next_revision) = match highest_existing {
        Some((rev, existing_hash)) if existing_hash == hash => (false, rev),
        Some((rev, _)) => (true, rev + 1),
        None => (true, 1),
    };

    let name = candidate.name(composition_name, &hash);
    Ok(RevisionPlan {
        needs_new_revision,
        next_revision,
        hash,
        name,
    })
}

/// Compare two revision specs field-by-field for the purpose of deciding
/// whether an XR needs to re-render (spec.md §8 S4 "Realtime re-select").
///
/// Grounded in `sherpack-kube::diff`'s release-comparison helpers.
pub fn diff_specs(a: &CompositionRevisionSpec, b: &CompositionRevisionSpec) -> Vec<String> {
    let mut changes = Vec::new();
    if a.mode != b.mode {
        changes.push("mode".to_string());
    }
    if serde_json::to_value(&a.resources).ok() != serde_json::to_value(&b.resources).ok() {
        changes.push("resources".to_string());
    }
    if serde_json::to_value(&a.pipeline).ok() != serde_json::to_value(&b.pipeline).ok() {
        changes.push("pipeline".to_string());
    }
    if serde_json::to_value(&a.environment).ok() != serde_json::to_value(&b.environment).ok() {
        changes.push("environment".to_string());
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::CompositeTypeRef;

    fn spec() -> CompositionSpec {
        CompositionSpec {
            composite_type_ref: CompositeTypeRef {
                api_version: "example.org/v1".to_string(),
                kind: "XExample".to_string(),
            },
            mode: CompositionMode::Pipeline,
            resources: vec![],
            pipeline: vec![],
            patch_sets: vec![],
            environment: None,
            write_connection_secrets_to_namespace: None,
            revision_history_limit: None,
        }
    }

    #[test]
    fn equal_specs_hash_and_name_identically() {
        let s1 = spec();
        let s2 = spec();
        let r1 = CompositionRevisionSpec::from_composition(&s1, 1);
        let r2 = CompositionRevisionSpec::from_composition(&s2, 7);
        assert_eq!(r1.content_hash().unwrap(), r2.content_hash().unwrap());
        let h1 = r1.content_hash().unwrap();
        let h2 = r2.content_hash().unwrap();
        assert_eq!(r1.name("comp", &h1), r2.name("comp", &h2));
    }

    #[test]
    fn plan_revision_is_noop_when_hash_unchanged() {
        let s = spec();
        let candidate = CompositionRevisionSpec::from_composition(&s, 0);
        let hash = candidate.content_hash().unwrap();
        let plan = plan_revision("comp", &s, Some((3, &hash))).unwrap();
        assert!(!plan.needs_new_revision);
        assert_eq!(plan.next_revision, 3);
    }

    #[test]
    fn plan_revision_increments_on_change() {
        let mut s = spec();
        let candidate = CompositionRevisionSpec::from_composition(&s, 0);
        let old_hash = candidate.content_hash().unwrap();
        s.write_connection_secrets_to_namespace = Some("ns".to_string());
        let plan = plan_revision("comp", &s, Some((3, &old_hash))).unwrap();
        assert!(plan.needs_new_revision);
        assert_eq!(plan.next_revision, 4);
    }

    #[test]
    fn plan_revision_starts_at_one() {
        let s = spec();
        let plan = plan_revision("comp", &s, None).unwrap();
        assert!(plan.needs_new_revision);
        assert_eq!(plan.next_revision, 1);
    }
}
