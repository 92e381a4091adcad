//! GC / Orphan Resolver (spec.md §4.H).
//!
//! Pure set-difference plus idempotent deletes: given the previous and
//! current desired sets of composed resources, whatever fell out of the
//! new set gets deleted. Deletion is fire-and-forget — we do not wait for
//! the deleted object's own finalizers; the next reconcile observes
//! progress via the watch stream.

use std::collections::HashSet;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectReference;
use tracing::{debug, warn};

use crossplane_core::composed::ComposedResource;

use crate::error::Result;
use crate::store::{GroupVersionKindOwned, ObjectStore};

pub type GcKey = (String, String, String, String);

/// `previous \ current`, keyed by `ComposedResource::gc_key` (spec.md §4.H).
pub fn orphaned(previous: &[ObjectReference], current: &[ObjectReference]) -> Vec<ObjectReference> {
    let keep: HashSet<GcKey> = current.iter().map(ComposedResource::gc_key).collect();
    previous
        .iter()
        .filter(|r| !keep.contains(&ComposedResource::gc_key(r)))
        .cloned()
        .collect()
}

/// Deletes every orphaned reference. A `NotFound` on any one of them is
/// success, not failure — the goal state (absent) already holds.
pub async fn sweep(store: &ObjectStore, previous: &[ObjectReference], current: &[ObjectReference]) -> Result<usize> {
    let orphans = orphaned(previous, current);
    for reference in &orphans {
        let Some(api_version) = reference.api_version.as_deref() else { continue };
        let Some(kind) = reference.kind.as_deref() else { continue };
        let Some(name) = reference.name.as_deref() else { continue };
        let gvk = GroupVersionKindOwned::from_api_version(api_version, kind);
        match store.delete(&gvk, reference.namespace.as_deref(), name).await {
            Ok(()) => debug!(kind, name, "garbage collected orphaned composed resource"),
            Err(e) => warn!(kind, name, error = %e, "failed to garbage collect orphaned composed resource"),
        }
    }
    Ok(orphans.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(name: &str) -> ObjectReference {
        ObjectReference {
            api_version: Some("v1".to_string()),
            kind: Some("ConfigMap".to_string()),
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn orphaned_is_the_set_difference() {
        let previous = vec![reference("a"), reference("b"), reference("c")];
        let current = vec![reference("a"), reference("c")];
        let orphans: Vec<_> = orphaned(&previous, &current).into_iter().map(|r| r.name.unwrap()).collect();
        assert_eq!(orphans, vec!["b".to_string()]);
    }

    #[test]
    fn shrinking_to_fewer_resources_leaves_the_rest_untouched() {
        let previous = vec![reference("a"), reference("b"), reference("c")];
        let current = vec![reference("a"), reference("b")];
        assert_eq!(orphaned(&previous, &current).len(), 1);
    }

    #[test]
    fn unchanged_desired_set_produces_no_orphans() {
        let set = vec![reference("a"), reference("b")];
        assert!(orphaned(&set, &set).is_empty());
    }
}
