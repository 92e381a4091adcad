//! The one piece of process-wide state this binary owns (spec.md §9
//! "Global state": "the only process-wide state is the metrics registry,
//! initialised at startup and torn down at shutdown"). Everything else —
//! object store, loggers, reconciler config — is passed explicitly into
//! every component rather than reached for as a global.

use std::sync::Arc;
use std::time::Duration;

use crossplane_functions::metrics::MetricsRegistry;
use tracing::info;

/// Owns the function pipeline's [`MetricsRegistry`] for the process
/// lifetime. Dropping this value is the "teardown" spec.md §9 asks for;
/// there is no background task to stop.
pub struct ProcessMetrics {
    pub functions: Arc<MetricsRegistry>,
}

impl ProcessMetrics {
    pub fn init() -> Self {
        Self { functions: Arc::new(MetricsRegistry::new()) }
    }

    /// Logs a one-line summary of accumulated call counts, used on a timer
    /// and at shutdown rather than exposed over a scrape endpoint (an
    /// exporter is explicitly out of scope per spec.md §1).
    pub fn log_snapshot(&self) {
        let snapshot = self.functions.snapshot();
        let total_requests: u64 = snapshot.iter().map(|(_, requests, _, _)| requests).sum();
        let total_responses: u64 = snapshot.iter().map(|(_, _, responses, _)| responses).sum();
        let total_duration: Duration = snapshot.iter().map(|(_, _, _, duration)| *duration).sum();
        info!(
            functions.tracked = snapshot.len(),
            functions.requests = total_requests,
            functions.responses = total_responses,
            functions.total_duration_ms = total_duration.as_millis() as u64,
            "function pipeline metrics snapshot"
        );
    }
}
