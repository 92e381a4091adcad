//! Host process configuration (spec.md §6: "process configuration is via
//! command-line flags on the host controller").

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

fn default_sync_period() -> Duration {
    Duration::from_secs(600)
}

fn default_reconcile_deadline() -> Duration {
    Duration::from_secs(60)
}

#[derive(Parser, Debug, Clone)]
#[command(name = "crossplane-composition-engine")]
#[command(author = "Crossplane Contributors")]
#[command(version)]
#[command(about = "Composition engine: XRD/revision/usage controllers and per-kind composite reconcilers", long_about = None)]
pub struct Config {
    /// Path to a kubeconfig file. Falls back to in-cluster config, then the
    /// default kubeconfig location, when unset.
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Namespace leader election would run in. Leader election itself is
    /// out of scope for this engine (spec.md §1); this flag is accepted so
    /// a deployment manifest can be shared with a future leader-elected
    /// build without a flag rename.
    #[arg(long, env = "LEADER_ELECTION_NAMESPACE", default_value = "crossplane-system")]
    pub leader_election_namespace: String,

    /// How often each reconciler resyncs its full set of objects, on top of
    /// watch-driven triggers.
    #[arg(long, env = "SYNC_PERIOD", default_value = "10m", value_parser = humantime_serde::re::humantime::parse_duration)]
    pub sync_period: Duration,

    /// Per-reconcile deadline propagated via the cancellation token
    /// (spec.md §5 "default 1 min").
    #[arg(long, env = "RECONCILE_DEADLINE", default_value = "1m", value_parser = humantime_serde::re::humantime::parse_duration)]
    pub reconcile_deadline: Duration,

    /// Worker pool size per reconciler (spec.md §5 "default 1-10").
    #[arg(long, env = "WORKERS", default_value_t = 4)]
    pub workers: usize,

    /// Default gRPC target for Persistent-runtime composition functions
    /// that don't declare their own `runtimeOptions.target`.
    #[arg(long, env = "FUNCTION_RUNNER_TARGET")]
    pub function_runner_target: Option<String>,

    /// Poll interval while waiting for a freshly-applied CRD to report
    /// `Established` (spec.md §4.B step 2).
    #[arg(long, default_value = "1s", value_parser = humantime_serde::re::humantime::parse_duration)]
    pub crd_establish_poll_interval: Duration,

    /// Timeout waiting for a freshly-applied CRD to report `Established`.
    #[arg(long, default_value = "60s", value_parser = humantime_serde::re::humantime::parse_duration)]
    pub crd_establish_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            leader_election_namespace: "crossplane-system".to_string(),
            sync_period: default_sync_period(),
            reconcile_deadline: default_reconcile_deadline(),
            workers: 4,
            function_runner_target: None,
            crd_establish_poll_interval: Duration::from_secs(1),
            crd_establish_timeout: Duration::from_secs(60),
        }
    }
}
