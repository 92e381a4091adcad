//! Composition Revision Manager (spec.md §4.C).
//!
//! Watches a Composition, content-addresses its spec into a
//! [`CompositionRevisionSpec`], and creates a new `CompositionRevision`
//! whenever the hash changes. Revisions are otherwise immutable and are
//! pruned only once they are no longer referenced by any XR (spec.md §9
//! Open Question 1) — `revisionHistoryLimit` bounds how many *unreferenced*
//! revisions are kept, not the total count.

use std::collections::HashSet;

use kube::core::DynamicObject;
use kube::ResourceExt;
use serde_json::json;

use crossplane_core::composition::CompositionSpec;
use crossplane_core::revision::{self, CompositionRevisionSpec, RevisionPlan, LABEL_COMPOSITION_NAME};

use crate::error::{KubeError, Result};
use crate::store::{GroupVersionKindOwned, ObjectStore};

pub fn revision_gvk() -> GroupVersionKindOwned {
    GroupVersionKindOwned::new("apiextensions.crossplane.io", "v1", "CompositionRevision")
}

/// Every existing revision for a Composition, newest first.
async fn list_revisions(store: &ObjectStore, composition_name: &str) -> Result<Vec<(i64, DynamicObject)>> {
    let selector = format!("{LABEL_COMPOSITION_NAME}={composition_name}");
    let objects = store.list(&revision_gvk(), None, Some(&selector), None).await?;
    let mut revisions: Vec<(i64, DynamicObject)> = objects
        .into_iter()
        .filter_map(|obj| {
            let number = obj.data.pointer("/spec/revision")?.as_i64()?;
            Some((number, obj))
        })
        .collect();
    revisions.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(revisions)
}

fn decode_spec(obj: &DynamicObject) -> Result<CompositionRevisionSpec> {
    let spec = obj
        .data
        .get("spec")
        .ok_or_else(|| KubeError::Invalid { kind: "CompositionRevision".into(), name: obj.name_any(), message: "missing spec".into() })?;
    Ok(serde_json::from_value(spec.clone())?)
}

/// Ensures the Composition's current spec has a corresponding revision,
/// creating one if the content hash changed since the highest existing
/// revision. Returns the plan that was (or would have been) acted on.
pub async fn reconcile(store: &ObjectStore, composition_name: &str, spec: &CompositionSpec) -> Result<RevisionPlan> {
    let existing = list_revisions(store, composition_name).await?;
    let highest = match existing.first() {
        Some((number, obj)) => {
            let decoded = decode_spec(obj)?;
            Some((*number, decoded.content_hash()?))
        }
        None => None,
    };

    let plan = revision::plan_revision(composition_name, spec, highest.as_ref().map(|(n, h)| (*n, h.as_str())))?;

    if plan.needs_new_revision {
        let candidate = CompositionRevisionSpec::from_composition(spec, plan.next_revision);
        let labels = candidate.labels(composition_name, &plan.hash);
        let manifest = json!({
            "apiVersion": "apiextensions.crossplane.io/v1",
            "kind": "CompositionRevision",
            "metadata": {"name": plan.name, "labels": labels},
            "spec": candidate,
        });
        let obj: DynamicObject = serde_json::from_value(manifest)?;
        store.apply(&revision_gvk(), None, &obj).await?;
    }

    Ok(plan)
}

/// The highest-numbered revision's name and number, for an XR with
/// `compositionUpdatePolicy: Automatic` (spec.md §4.F step 3).
pub async fn highest_revision(store: &ObjectStore, composition_name: &str) -> Result<Option<(String, i64)>> {
    let existing = list_revisions(store, composition_name).await?;
    Ok(existing.into_iter().next().map(|(number, obj)| (obj.name_any(), number)))
}

/// Deletes superseded revisions beyond `limit`, skipping any name present in
/// `in_use` regardless of age (spec.md §9 Open Question 1: a revision is
/// only ever pruned once no XR references it).
pub async fn prune_superseded(
    store: &ObjectStore,
    composition_name: &str,
    limit: Option<u32>,
    in_use: &HashSet<String>,
) -> Result<usize> {
    let Some(limit) = limit else { return Ok(0) };
    let existing = list_revisions(store, composition_name).await?;

    let mut kept_unreferenced = 0u32;
    let mut deleted = 0usize;
    for (_, obj) in existing {
        let name = obj.name_any();
        if in_use.contains(&name) {
            continue;
        }
        if kept_unreferenced < limit {
            kept_unreferenced += 1;
            continue;
        }
        store.delete(&revision_gvk(), None, &name).await?;
        deleted += 1;
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossplane_core::composition::CompositeTypeRef;

    fn spec() -> CompositionSpec {
        CompositionSpec {
            composite_type_ref: CompositeTypeRef { api_version: "example.org/v1".to_string(), kind: "XExample".to_string() },
            mode: crossplane_core::composition::CompositionMode::Pipeline,
            resources: vec![],
            pipeline: vec![],
            patch_sets: vec![],
            environment: None,
            write_connection_secrets_to_namespace: None,
            revision_history_limit: None,
        }
    }

    #[test]
    fn revision_gvk_is_cluster_scoped_composition_revision() {
        let gvk = revision_gvk();
        assert_eq!(gvk.kind, "CompositionRevision");
        assert_eq!(gvk.api_version(), "apiextensions.crossplane.io/v1");
    }

    #[test]
    fn decode_spec_round_trips_from_rendered_manifest() {
        let candidate = CompositionRevisionSpec::from_composition(&spec(), 1);
        let manifest = json!({
            "apiVersion": "apiextensions.crossplane.io/v1",
            "kind": "CompositionRevision",
            "metadata": {"name": "comp-abc1234"},
            "spec": candidate,
        });
        let obj: DynamicObject = serde_json::from_value(manifest).unwrap();
        let decoded = decode_spec(&obj).unwrap();
        assert_eq!(decoded.revision, 1);
    }
}
