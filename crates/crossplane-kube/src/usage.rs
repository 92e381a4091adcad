//! Usage Tracker (spec.md §4.G).
//!
//! A Usage protects its `of` referent from deletion by stamping a
//! deterministic finalizer on it; the finalizer is removed once the Usage
//! itself is deleted. Resolution is one-hop only — a Usage never walks its
//! `by` resource's own Usages (spec.md §9 Open Question 2).

use kube::core::DynamicObject;
use kube::ResourceExt;

use crossplane_core::usage::{ResourceSelector, UsageSpec, UsageTarget};

use crate::error::{KubeError, Result};
use crate::store::{GroupVersionKindOwned, ObjectStore};

fn label_selector_string(match_labels: &std::collections::BTreeMap<String, String>) -> String {
    match_labels.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",")
}

fn gvk_of(object: &DynamicObject) -> Result<GroupVersionKindOwned> {
    let types = object
        .types
        .as_ref()
        .ok_or_else(|| KubeError::Invalid { kind: "Unknown".into(), name: object.name_any(), message: "object has no apiVersion/kind".into() })?;
    Ok(GroupVersionKindOwned::from_api_version(&types.api_version, types.kind.clone()))
}

/// Every object a Usage's `of` target names, resolved either directly by
/// name or by listing a label selector. `default_namespace` is the Usage's
/// own namespace, used when the target doesn't name one explicitly.
pub async fn resolve_referents(store: &ObjectStore, default_namespace: Option<&str>, target: &UsageTarget) -> Result<Vec<DynamicObject>> {
    match (&target.resource_ref, &target.resource_selector) {
        (Some(r), _) => {
            let gvk = GroupVersionKindOwned::from_api_version(&r.api_version, r.kind.clone());
            let namespace = r.namespace.as_deref().or(default_namespace);
            Ok(store.get(&gvk, namespace, &r.name).await?.into_iter().collect())
        }
        (None, Some(s)) => resolve_selector(store, default_namespace, s).await,
        (None, None) => Err(KubeError::Invalid {
            kind: "Usage".into(),
            name: String::new(),
            message: "spec.of has neither resourceRef nor resourceSelector".into(),
        }),
    }
}

async fn resolve_selector(store: &ObjectStore, default_namespace: Option<&str>, selector: &ResourceSelector) -> Result<Vec<DynamicObject>> {
    let gvk = GroupVersionKindOwned::from_api_version(&selector.api_version, selector.kind.clone());
    let namespace = selector.namespace.as_deref().or(default_namespace);
    let labels = label_selector_string(&selector.match_labels);
    store.list(&gvk, namespace, (!labels.is_empty()).then_some(labels.as_str()), None).await
}

/// Stamps the Usage's finalizer onto every resolved referent that doesn't
/// already carry it. Returns how many referents were newly stamped.
pub async fn reconcile(store: &ObjectStore, usage_name: &str, usage_namespace: Option<&str>, spec: &UsageSpec) -> Result<usize> {
    let finalizer = UsageSpec::finalizer_name(usage_name);
    let referents = resolve_referents(store, usage_namespace, &spec.of).await?;
    let mut stamped = 0;
    for mut referent in referents {
        if referent.finalizers().iter().any(|f| f == &finalizer) {
            continue;
        }
        referent.finalizers_mut().push(finalizer.clone());
        let gvk = gvk_of(&referent)?;
        let namespace = referent.namespace();
        store.apply(&gvk, namespace.as_deref(), &referent).await?;
        stamped += 1;
    }
    Ok(stamped)
}

/// Removes the Usage's finalizer from every referent it still resolves to,
/// once the Usage itself is being deleted. A referent that has already been
/// deleted out from under us is not an error.
pub async fn release(store: &ObjectStore, usage_name: &str, usage_namespace: Option<&str>, spec: &UsageSpec) -> Result<usize> {
    let finalizer = UsageSpec::finalizer_name(usage_name);
    let referents = match resolve_referents(store, usage_namespace, &spec.of).await {
        Ok(referents) => referents,
        Err(e) if e.is_not_found() => return Ok(0),
        Err(e) => return Err(e),
    };
    let mut released = 0;
    for mut referent in referents {
        let before = referent.finalizers().len();
        referent.finalizers_mut().retain(|f| f != &finalizer);
        if referent.finalizers().len() == before {
            continue;
        }
        let gvk = gvk_of(&referent)?;
        let namespace = referent.namespace();
        store.apply(&gvk, namespace.as_deref(), &referent).await?;
        released += 1;
    }
    Ok(released)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_selector_string_joins_sorted_pairs() {
        let mut labels = std::collections::BTreeMap::new();
        labels.insert("b".to_string(), "2".to_string());
        labels.insert("a".to_string(), "1".to_string());
        assert_eq!(label_selector_string(&labels), "a=1,b=2");
    }
}
