//! Composition engine host process.
//!
//! Wires the Object Store Abstraction (`crossplane-kube::store`), the XRD
//! Definition Controller, the Composition Revision Manager, the Usage
//! Tracker and the dynamic per-kind Composite Reconciler pools into one long
//! running binary (spec.md §2, §5). There is no leader election, webhook
//! server or CLI subcommand tree here — those are explicitly out of scope
//! (spec.md §1) — just the watch loops this spec actually describes.

mod composition_controller;
mod config;
mod error;
mod exit_codes;
mod metrics;
mod queue;
mod usage_controller;
mod xrd_controller;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crossplane_functions::runtime::{CompositeRuntime, OneShotDefaults, OneShotRuntime, PersistentRuntime};
use crossplane_functions::RuntimeHandler;
use crossplane_kube::store::ObjectStore;
use crossplane_kube::ControllerRegistry;

use crate::config::Config;
use crate::error::{ControllerError, Result};
use crate::exit_codes::SUCCESS;
use crate::metrics::ProcessMetrics;

fn main() -> ExitCode {
    miette::set_panic_hook();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let config = Config::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the async runtime");
            return ExitCode::from(exit_codes::ERROR as u8);
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => {
            info!("composition engine shut down cleanly");
            ExitCode::from(SUCCESS as u8)
        }
        Err(e) => {
            error!(error = %e, "composition engine exited with a fatal startup error");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(config: Config) -> Result<()> {
    let client = build_client(&config).await?;
    let store = Arc::new(ObjectStore::connect(client).await.map_err(ControllerError::Discovery)?);

    let metrics = ProcessMetrics::init();
    let function_runtime = build_function_runtime(&config);
    let registry = ControllerRegistry::new();
    let shutdown = CancellationToken::new();

    info!(workers = config.workers, reconcile_deadline = ?config.reconcile_deadline, "composition engine starting");

    let config = Arc::new(config);
    let composition_task = tokio::spawn(composition_controller::run(store.clone(), config.clone(), shutdown.clone()));
    let usage_task = tokio::spawn(usage_controller::run(store.clone(), shutdown.clone()));
    let xrd_task = tokio::spawn(xrd_controller::run(
        store.clone(),
        function_runtime,
        metrics.functions.clone(),
        registry,
        config.clone(),
        shutdown.clone(),
    ));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
        result = composition_task => log_task_exit("composition controller", result),
        result = usage_task => log_task_exit("usage controller", result),
        result = xrd_task => log_task_exit("xrd controller", result),
    }

    shutdown.cancel();
    metrics.log_snapshot();
    Ok(())
}

fn log_task_exit(name: &str, result: std::result::Result<(), tokio::task::JoinError>) {
    match result {
        Ok(()) => info!(task = name, "controller task exited"),
        Err(e) => error!(task = name, error = %e, "controller task panicked"),
    }
}

/// Builds the cluster client: an explicit kubeconfig path if given, falling
/// back to `kube`'s usual in-cluster/kubeconfig auto-detection otherwise.
async fn build_client(config: &Config) -> Result<Client> {
    match &config.kubeconfig {
        Some(path) => {
            let kubeconfig = kube::config::Kubeconfig::read_from(path)
                .map_err(|e| ControllerError::Kubeconfig { path: path.display().to_string(), message: e.to_string() })?;
            let options = kube::config::KubeConfigOptions::default();
            let client_config = kube::Config::from_custom_kubeconfig(kubeconfig, &options)
                .await
                .map_err(|e| ControllerError::Kubeconfig { path: path.display().to_string(), message: e.to_string() })?;
            Client::try_from(client_config).map_err(|e| ControllerError::Client { message: e.to_string() })
        }
        None => Client::try_default().await.map_err(|e| ControllerError::Client { message: e.to_string() }),
    }
}

/// Assembles the function pipeline's [`CompositeRuntime`] (spec.md §4.E /
/// §9): a persistent gRPC variant whenever a default target is configured,
/// and a one-shot process variant with process-wide launch defaults. No
/// in-process functions ship with this binary, so that variant is left
/// unconfigured; a function declaring `runtime: InProcess` with nothing
/// registered surfaces as a startup misconfiguration at reconcile time
/// rather than a silent no-op.
fn build_function_runtime(config: &Config) -> Option<Arc<dyn RuntimeHandler>> {
    let mut composite = CompositeRuntime::new();
    if let Some(target) = &config.function_runner_target {
        composite = composite.with_persistent(PersistentRuntime::new().with_default_target(target.clone()));
    } else {
        composite = composite.with_persistent(PersistentRuntime::new());
    }
    composite = composite.with_one_shot(OneShotRuntime::new(OneShotDefaults::default()));
    Some(Arc::new(composite))
}
