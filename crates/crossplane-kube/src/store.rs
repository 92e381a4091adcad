//! Object Store Abstraction (spec.md §4.A).
//!
//! A uniform interface over the cluster's object store that works for both
//! typed and unstructured (schema-less) objects, since composed resource
//! kinds are not known at compile time. Backed by `kube`'s dynamic API
//! machinery the way the teacher's resource manager resolves GVKs through
//! `Discovery` rather than hand-rolled per-kind clients.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use kube::api::{Api, DynamicObject, ListParams, Patch, PatchParams};
use kube::core::GroupVersionKind;
use kube::discovery::{Discovery, Scope};
use kube::runtime::watcher;
use kube::Client;
use tokio::sync::RwLock;

use crate::error::{KubeError, Result};

pub const FIELD_MANAGER: &str = "crossplane-composition-engine";

/// A store-relative identity for an object: enough to look it up via
/// discovery and address it with the right scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub gvk: GroupVersionKindOwned,
    pub namespace: Option<String>,
    pub name: String,
}

/// `kube::core::GroupVersionKind` isn't `Hash`/`Eq`; this is the owned,
/// comparable shape used as a map key by the GC diff and field indexers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupVersionKindOwned {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKindOwned {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { group: group.into(), version: version.into(), kind: kind.into() }
    }

    pub fn from_api_version(api_version: &str, kind: impl Into<String>) -> Self {
        match api_version.split_once('/') {
            Some((group, version)) => Self::new(group, version, kind),
            None => Self::new("", api_version, kind),
        }
    }

    pub fn to_gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.group, &self.version, &self.kind)
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

/// Resolves GVKs against cluster discovery and dispatches unstructured
/// CRUD/watch calls against them. Discovery is refreshed on demand (e.g.
/// after the XRD controller installs a new CRD) rather than polled.
pub struct ObjectStore {
    client: Client,
    discovery: Arc<RwLock<Discovery>>,
}

impl ObjectStore {
    pub async fn connect(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone())
            .run()
            .await
            .map_err(|e| KubeError::transient("Discovery", "cluster", e.to_string()))?;
        Ok(Self { client, discovery: Arc::new(RwLock::new(discovery)) })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Re-runs API discovery. Call after applying a CRD so the new kind is
    /// immediately addressable.
    pub async fn refresh_discovery(&self) -> Result<()> {
        let discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .map_err(|e| KubeError::transient("Discovery", "cluster", e.to_string()))?;
        *self.discovery.write().await = discovery;
        Ok(())
    }

    async fn api_for(&self, gvk: &GroupVersionKindOwned, namespace: Option<&str>) -> Result<Api<DynamicObject>> {
        let discovery = self.discovery.read().await;
        let (ar, caps) = discovery.resolve_gvk(&gvk.to_gvk()).ok_or_else(|| KubeError::Invalid {
            kind: gvk.kind.clone(),
            name: "*".to_string(),
            message: format!("no API registered for {}/{}", gvk.api_version(), gvk.kind),
        })?;
        Ok(match (caps.scope, namespace) {
            (Scope::Cluster, _) => Api::all_with(self.client.clone(), &ar),
            (Scope::Namespaced, Some(ns)) => Api::namespaced_with(self.client.clone(), ns, &ar),
            (Scope::Namespaced, None) => Api::all_with(self.client.clone(), &ar),
        })
    }

    pub async fn get(&self, gvk: &GroupVersionKindOwned, namespace: Option<&str>, name: &str) -> Result<Option<DynamicObject>> {
        let api = self.api_for(gvk, namespace).await?;
        match api.get_opt(name).await {
            Ok(obj) => Ok(obj),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list(
        &self,
        gvk: &GroupVersionKindOwned,
        namespace: Option<&str>,
        label_selector: Option<&str>,
        field_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>> {
        let api = self.api_for(gvk, namespace).await?;
        let mut lp = ListParams::default();
        if let Some(l) = label_selector {
            lp = lp.labels(l);
        }
        if let Some(f) = field_selector {
            lp = lp.fields(f);
        }
        let list = api.list(&lp).await?;
        Ok(list.items)
    }

    /// Create-or-update via Server-Side Apply, taking full field ownership
    /// under [`FIELD_MANAGER`]. This is the only write path composed
    /// resources and CRDs go through; plain `create`/`update` would race
    /// with other writers instead of merging.
    pub async fn apply(&self, gvk: &GroupVersionKindOwned, namespace: Option<&str>, obj: &DynamicObject) -> Result<DynamicObject> {
        let name = obj
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| KubeError::Invalid { kind: gvk.kind.clone(), name: "".into(), message: "object has no name".into() })?;
        let api = self.api_for(gvk, namespace).await?;
        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(name, &params, &Patch::Apply(obj)).await.map_err(Into::into)
    }

    /// Idempotent delete: a 404 is treated as success.
    pub async fn delete(&self, gvk: &GroupVersionKindOwned, namespace: Option<&str>, name: &str) -> Result<()> {
        let api = self.api_for(gvk, namespace).await?;
        match api.delete(name, &Default::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// A causally-ordered stream of create/update/delete events for one
    /// kind. Backed by `kube::runtime::watcher`, which itself handles
    /// resync and relist-on-gap.
    pub async fn watch(
        &self,
        gvk: &GroupVersionKindOwned,
        namespace: Option<&str>,
    ) -> Result<impl Stream<Item = Result<watcher::Event<DynamicObject>>>> {
        let api = self.api_for(gvk, namespace).await?;
        let stream = watcher::watcher(api, watcher::Config::default());
        Ok(stream.map(|item| item.map_err(|e| KubeError::transient("Watch", gvk.kind.clone(), e.to_string()))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gvk_round_trips_api_version() {
        let gvk = GroupVersionKindOwned::from_api_version("apiextensions.crossplane.io/v1", "Composition");
        assert_eq!(gvk.api_version(), "apiextensions.crossplane.io/v1");
        assert_eq!(gvk.group, "apiextensions.crossplane.io");

        let core = GroupVersionKindOwned::from_api_version("v1", "ConfigMap");
        assert_eq!(core.group, "");
        assert_eq!(core.api_version(), "v1");
    }
}
