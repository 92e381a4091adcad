//! Hosts the Usage Tracker watch loop (spec.md §4.G): stamps a deterministic
//! finalizer on whatever a `Usage` protects, and removes it again once the
//! `Usage` itself goes away.

use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::watcher;
use kube::{Api, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crossplane_core::usage::Usage;
use crossplane_kube::store::ObjectStore;
use crossplane_kube::usage;

/// Watches every `Usage` until `shutdown` is cancelled: stamps its
/// finalizer onto freshly-resolved referents, and releases it once the
/// `Usage` is deleted.
pub async fn run(store: Arc<ObjectStore>, shutdown: CancellationToken) {
    let api: Api<Usage> = Api::all(store.client().clone());
    let mut events = Box::pin(watcher::watcher(api, watcher::Config::default()));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("usage controller shutting down");
                return;
            }
            next = events.next() => {
                let Some(event) = next else { return };
                match event {
                    Ok(watcher::Event::Apply(u)) | Ok(watcher::Event::InitApply(u)) => handle_upsert(&store, u).await,
                    Ok(watcher::Event::Delete(u)) => handle_delete(&store, u).await,
                    Ok(watcher::Event::Init | watcher::Event::InitDone) => {}
                    Err(e) => warn!(error = %e, "usage watch error"),
                }
            }
        }
    }
}

async fn handle_upsert(store: &ObjectStore, u: Usage) {
    let name = u.name_any();
    let namespace = u.namespace();
    match usage::reconcile(store, &name, namespace.as_deref(), &u.spec).await {
        Ok(0) => {}
        Ok(stamped) => info!(usage = %name, stamped, "stamped usage finalizer on referent(s)"),
        Err(e) => warn!(usage = %name, error = %e, "failed to reconcile usage"),
    }
}

async fn handle_delete(store: &ObjectStore, u: Usage) {
    let name = u.name_any();
    let namespace = u.namespace();
    match usage::release(store, &name, namespace.as_deref(), &u.spec).await {
        Ok(0) => {}
        Ok(released) => info!(usage = %name, released, "released usage finalizer from referent(s)"),
        Err(e) => warn!(usage = %name, error = %e, "failed to release usage finalizers on deletion"),
    }
}
