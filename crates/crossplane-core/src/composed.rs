//! Composed Resource — any object whose controller reference is an XR.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{OwnerReference, ObjectReference};
use kube::core::DynamicObject;
use kube::ResourceExt;

use crate::xr::ANNOTATION_COMPOSITION_RESOURCE_NAME;

/// A composed resource together with the `compositionResourceName` it is
/// keyed by, so the reconciler can correlate desired/observed state by name
/// rather than by object identity.
#[derive(Debug, Clone)]
pub struct ComposedResource {
    pub name: String,
    pub object: DynamicObject,
}

impl ComposedResource {
    pub fn new(name: impl Into<String>, object: DynamicObject) -> Self {
        Self { name: name.into(), object }
    }

    /// Read the `compositionResourceName` annotation off an arbitrary
    /// dynamic object, if present.
    pub fn resource_name_of(object: &DynamicObject) -> Option<String> {
        object
            .annotations()
            .get(ANNOTATION_COMPOSITION_RESOURCE_NAME)
            .cloned()
    }

    /// Stamp the annotation that correlates this object back to its
    /// template/function-assigned name.
    pub fn set_resource_name(object: &mut DynamicObject, name: &str) {
        object
            .annotations_mut()
            .insert(ANNOTATION_COMPOSITION_RESOURCE_NAME.to_string(), name.to_string());
    }

    /// Build the controller owner reference pointing at the given XR,
    /// stamped onto a composed resource the first time it is rendered.
    pub fn controller_owner_reference(
        xr_api_version: &str,
        xr_kind: &str,
        xr_name: &str,
        xr_uid: &str,
    ) -> OwnerReference {
        OwnerReference {
            api_version: xr_api_version.to_string(),
            kind: xr_kind.to_string(),
            name: xr_name.to_string(),
            uid: xr_uid.to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    /// True if `object`'s controller owner reference matches the given XR
    /// UID — used to refuse adopting a resource already owned by a
    /// different XR.
    pub fn is_controlled_by(object: &DynamicObject, xr_uid: &str) -> bool {
        object
            .owner_references()
            .iter()
            .any(|o| o.controller == Some(true) && o.uid == xr_uid)
    }

    pub fn object_reference(&self) -> ObjectReference {
        ObjectReference {
            api_version: self.object.types.as_ref().map(|t| t.api_version.clone()),
            kind: self.object.types.as_ref().map(|t| t.kind.clone()),
            name: Some(self.object.name_any()),
            namespace: self.object.namespace(),
            uid: self.object.uid(),
            ..Default::default()
        }
    }

    /// Key used by the GC/orphan resolver to diff previous vs. current
    /// desired sets: `(apiVersion, kind, namespace, name)`.
    pub fn gc_key(reference: &ObjectReference) -> (String, String, String, String) {
        (
            reference.api_version.clone().unwrap_or_default(),
            reference.kind.clone().unwrap_or_default(),
            reference.namespace.clone().unwrap_or_default(),
            reference.name.clone().unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::{ObjectMeta, TypeMeta};
    use serde_json::json;

    fn obj() -> DynamicObject {
        DynamicObject {
            types: Some(TypeMeta {
                api_version: "v1".to_string(),
                kind: "ConfigMap".to_string(),
            }),
            metadata: ObjectMeta {
                name: Some("cm".to_string()),
                ..Default::default()
            },
            data: json!({}),
        }
    }

    #[test]
    fn resource_name_round_trips() {
        let mut o = obj();
        assert_eq!(ComposedResource::resource_name_of(&o), None);
        ComposedResource::set_resource_name(&mut o, "bucket");
        assert_eq!(ComposedResource::resource_name_of(&o), Some("bucket".to_string()));
    }

    #[test]
    fn is_controlled_by_checks_controller_flag_and_uid() {
        let mut o = obj();
        o.owner_references_mut().push(OwnerReference {
            api_version: "example.org/v1".to_string(),
            kind: "XExample".to_string(),
            name: "xr".to_string(),
            uid: "uid-1".to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        });
        assert!(ComposedResource::is_controlled_by(&o, "uid-1"));
        assert!(!ComposedResource::is_controlled_by(&o, "uid-2"));
    }
}
