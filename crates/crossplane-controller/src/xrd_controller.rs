//! Hosts the XRD Definition Controller watch loop (spec.md §4.B) and, for
//! every `Established` XRD, the per-kind Composite Reconciler worker pool
//! (spec.md §4.F, §5) registered under [`ControllerRegistry`].

use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::watcher;
use kube::{Api, ResourceExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crossplane_core::xrd::CompositeResourceDefinition;
use crossplane_functions::metrics::MetricsRegistry;
use crossplane_functions::runner::cancel_after;
use crossplane_functions::RuntimeHandler;
use crossplane_kube::store::{GroupVersionKindOwned, ObjectStore};
use crossplane_kube::xrd::{self, ControllerRegistry};
use crossplane_kube::CompositeReconciler;

use crate::config::Config;
use crate::queue::{schedule_requeue, DedupQueue, ObjectId};

/// Watches every `CompositeResourceDefinition` in the cluster until
/// `shutdown` is cancelled, applying each one's derived CRD and starting or
/// restarting its composite worker pool as needed.
pub async fn run(
    store: Arc<ObjectStore>,
    runtime: Option<Arc<dyn RuntimeHandler>>,
    metrics: Arc<MetricsRegistry>,
    registry: ControllerRegistry,
    config: Arc<Config>,
    shutdown: CancellationToken,
) {
    let api: Api<CompositeResourceDefinition> = Api::all(store.client().clone());
    let mut events = Box::pin(watcher::watcher(api, watcher::Config::default()));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("xrd controller shutting down");
                return;
            }
            next = events.next() => {
                let Some(event) = next else { return };
                match event {
                    Ok(watcher::Event::Apply(xrd)) | Ok(watcher::Event::InitApply(xrd)) => {
                        handle_upsert(&store, &runtime, &metrics, &registry, &config, xrd).await;
                    }
                    Ok(watcher::Event::Delete(xrd)) => handle_delete(&store, &registry, xrd).await,
                    Ok(watcher::Event::Init | watcher::Event::InitDone) => {}
                    Err(e) => warn!(error = %e, "xrd watch error"),
                }
            }
        }
    }
}

async fn handle_upsert(
    store: &Arc<ObjectStore>,
    runtime: &Option<Arc<dyn RuntimeHandler>>,
    metrics: &Arc<MetricsRegistry>,
    registry: &ControllerRegistry,
    config: &Arc<Config>,
    xrd: CompositeResourceDefinition,
) {
    let name = xrd.name_any();
    let spec = xrd.spec.clone();

    if let Err(e) = xrd::apply_and_wait_established(store, &spec, config.crd_establish_poll_interval, config.crd_establish_timeout).await {
        error!(xrd = %name, error = %e, "failed to establish CRD for XRD");
        return;
    }
    info!(xrd = %name, kind = %spec.names.kind, "CRD established");

    let xr_gvk = match spec.referenceable_version() {
        Ok(version) => GroupVersionKindOwned::new(spec.group.clone(), version.name.clone(), spec.names.kind.clone()),
        Err(e) => {
            error!(xrd = %name, error = %e, "XRD has no single referenceable version");
            return;
        }
    };

    let signature = xrd::kind_signature(&spec);
    let store = Arc::clone(store);
    let runtime = runtime.clone();
    let metrics = Arc::clone(metrics);
    let config = Arc::clone(config);
    let spec = Arc::new(spec);

    registry
        .ensure_running(&name, signature, move |cancel| {
            spawn_composite_workers(store, runtime, metrics, spec, xr_gvk, config, cancel)
        })
        .await;
}

async fn handle_delete(store: &Arc<ObjectStore>, registry: &ControllerRegistry, xrd: CompositeResourceDefinition) {
    let name = xrd.name_any();
    registry.stop(&name).await;
    if let Err(e) = xrd::teardown_crd(store, xrd.annotations(), &xrd.spec).await {
        error!(xrd = %name, error = %e, "failed to tear down CRD for deleted XRD");
    }
}

/// Spawns the watch-feeder plus the fixed worker pool for one XR kind,
/// returning a single [`JoinHandle`] that completes once `cancel` fires and
/// every inner task has wound down (spec.md §5: "a fixed pool per
/// reconciler... consuming from a deduplicating queue keyed by object
/// identity").
fn spawn_composite_workers(
    store: Arc<ObjectStore>,
    runtime: Option<Arc<dyn RuntimeHandler>>,
    metrics: Arc<MetricsRegistry>,
    xrd_spec: Arc<crossplane_core::xrd::CompositeResourceDefinitionSpec>,
    xr_gvk: GroupVersionKindOwned,
    config: Arc<Config>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let queue: Arc<DedupQueue<ObjectId>> = Arc::new(DedupQueue::new());

        let feeder = tokio::spawn(feed_queue(store.clone(), xr_gvk.clone(), queue.clone(), cancel.clone()));

        let mut workers = Vec::with_capacity(config.workers);
        for _ in 0..config.workers {
            workers.push(tokio::spawn(worker_loop(
                store.clone(),
                runtime.clone(),
                metrics.clone(),
                xrd_spec.clone(),
                queue.clone(),
                config.reconcile_deadline,
                cancel.clone(),
            )));
        }

        let _ = feeder.await;
        for worker in workers {
            let _ = worker.await;
        }
    })
}

/// Translates watch events for one XR kind into [`ObjectId`] pushes.
async fn feed_queue(store: Arc<ObjectStore>, gvk: GroupVersionKindOwned, queue: Arc<DedupQueue<ObjectId>>, cancel: CancellationToken) {
    let mut events = match store.watch(&gvk, None).await {
        Ok(stream) => Box::pin(stream),
        Err(e) => {
            error!(kind = %gvk.kind, error = %e, "failed to start composite watch");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            next = events.next() => {
                let Some(event) = next else { return };
                match event {
                    Ok(watcher::Event::Apply(obj)) | Ok(watcher::Event::InitApply(obj)) => {
                        queue.push(ObjectId::new(obj.metadata.namespace.clone(), obj.name_any()));
                    }
                    Ok(watcher::Event::Delete(_)) | Ok(watcher::Event::Init | watcher::Event::InitDone) => {}
                    Err(e) => warn!(kind = %gvk.kind, error = %e, "composite watch error"),
                }
            }
        }
    }
}

async fn worker_loop(
    store: Arc<ObjectStore>,
    runtime: Option<Arc<dyn RuntimeHandler>>,
    metrics: Arc<MetricsRegistry>,
    xrd_spec: Arc<crossplane_core::xrd::CompositeResourceDefinitionSpec>,
    queue: Arc<DedupQueue<ObjectId>>,
    reconcile_deadline: std::time::Duration,
    cancel: CancellationToken,
) {
    loop {
        let id = tokio::select! {
            _ = cancel.cancelled() => return,
            id = queue.pop() => id,
        };

        let deadline_token = cancel_after(reconcile_deadline);
        let reconciler = CompositeReconciler::new(&store, &xrd_spec).with_metrics(&metrics).with_cancellation(deadline_token);
        let reconciler = match &runtime {
            Some(rt) => reconciler.with_runtime(rt.as_ref()),
            None => reconciler,
        };

        match tokio::time::timeout(reconcile_deadline, reconciler.reconcile(&id.name, id.namespace())).await {
            Ok(Ok(outcome)) => info!(
                object = %id,
                composition = %outcome.composition_name,
                revision = %outcome.revision_name,
                ready = outcome.ready,
                garbage_collected = outcome.garbage_collected,
                render_errors = outcome.render_errors,
                "composite reconciled"
            ),
            Ok(Err(e)) => {
                warn!(object = %id, error = %e, "composite reconcile failed");
                schedule_requeue(&queue, id, e.requeue());
            }
            Err(_) => {
                warn!(object = %id, deadline = ?reconcile_deadline, "composite reconcile exceeded deadline");
                schedule_requeue(&queue, id, crossplane_kube::Requeue::Immediate);
            }
        }
    }
}
