//! Hosts the Composition Revision Manager watch loop (spec.md §4.C): every
//! Composition change is content-addressed into a revision, and every pass
//! also prunes revisions that are both superseded and unreferenced by any
//! live XR (spec.md §9 Open Question 1).

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::watcher;
use kube::{Api, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crossplane_core::composition::Composition;
use crossplane_kube::store::{GroupVersionKindOwned, ObjectStore};
use crossplane_kube::revision;

use crate::config::Config;

/// Watches every `Composition` until `shutdown` is cancelled, reconciling
/// its revision and pruning superseded ones on every change.
pub async fn run(store: Arc<ObjectStore>, config: Arc<Config>, shutdown: CancellationToken) {
    let api: Api<Composition> = Api::all(store.client().clone());
    let mut events = Box::pin(watcher::watcher(api, watcher::Config::default()));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("composition controller shutting down");
                return;
            }
            next = events.next() => {
                let Some(event) = next else { return };
                match event {
                    Ok(watcher::Event::Apply(composition)) | Ok(watcher::Event::InitApply(composition)) => {
                        handle_upsert(&store, &config, composition).await;
                    }
                    Ok(watcher::Event::Delete(_) | watcher::Event::Init | watcher::Event::InitDone) => {}
                    Err(e) => warn!(error = %e, "composition watch error"),
                }
            }
        }
    }
}

async fn handle_upsert(store: &ObjectStore, config: &Config, composition: Composition) {
    let name = composition.name_any();

    let plan = match revision::reconcile(store, &name, &composition.spec).await {
        Ok(plan) => plan,
        Err(e) => {
            error!(composition = %name, error = %e, "failed to reconcile composition revision");
            return;
        }
    };
    if plan.needs_new_revision {
        info!(composition = %name, revision = %plan.name, "created composition revision");
    }

    let in_use = match referenced_revisions(store, &composition.spec.composite_type_ref).await {
        Ok(set) => set,
        Err(e) => {
            error!(composition = %name, error = %e, "failed to list XRs for revision pruning");
            return;
        }
    };

    match revision::prune_superseded(store, &name, composition.spec.revision_history_limit, &in_use).await {
        Ok(0) => {}
        Ok(pruned) => info!(composition = %name, pruned, "pruned superseded composition revisions"),
        Err(e) => error!(composition = %name, error = %e, "failed to prune composition revisions"),
    }
}

/// Every distinct `compositionRevisionRef.name` among XRs of the
/// Composition's declared composite type, currently in flight.
async fn referenced_revisions(
    store: &ObjectStore,
    composite_type_ref: &crossplane_core::composition::CompositeTypeRef,
) -> crossplane_kube::Result<HashSet<String>> {
    let gvk = GroupVersionKindOwned::from_api_version(&composite_type_ref.api_version, composite_type_ref.kind.clone());
    let xrs = store.list(&gvk, None, None, None).await?;
    Ok(xrs
        .into_iter()
        .filter_map(|xr| xr.data.pointer("/spec/compositionRevisionRef/name")?.as_str().map(str::to_string))
        .collect())
}
