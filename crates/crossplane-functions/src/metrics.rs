//! In-process counters for function pipeline execution (spec.md §4.E).
//!
//! The registry itself is owned by the controller binary for the life of
//! the process (see `crossplane-controller`); this module only defines the
//! recording surface the runner calls into after each step.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::state::{FunctionResult, Severity, Target};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallKey {
    pub function_name: String,
    pub package: String,
    pub target: &'static str,
    pub grpc_code: &'static str,
}

#[derive(Debug, Clone, Default)]
struct CallStats {
    requests: u64,
    responses: u64,
    total_duration: Duration,
    max_severity: Option<Severity>,
}

/// Tracks, per function call key, how many requests/responses were seen,
/// the cumulative call duration, and the highest-severity result returned.
#[derive(Default)]
pub struct MetricsRegistry {
    calls: Mutex<HashMap<CallKey, CallStats>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, function_name: &str, package: &str) {
        let key = CallKey {
            function_name: function_name.to_string(),
            package: package.to_string(),
            target: "unspecified",
            grpc_code: "pending",
        };
        let mut calls = self.calls.lock().expect("metrics mutex poisoned");
        calls.entry(key).or_default().requests += 1;
    }

    pub fn record_response(
        &self,
        function_name: &str,
        package: &str,
        grpc_code: &'static str,
        duration: Duration,
        results: &[FunctionResult],
    ) {
        let worst = results.iter().max_by_key(|r| severity_rank(&r.severity));
        let max_severity = worst.map(|r| r.severity);
        let target = worst.map(|r| target_label(r.target)).unwrap_or("unspecified");

        let key = CallKey {
            function_name: function_name.to_string(),
            package: package.to_string(),
            target,
            grpc_code,
        };
        let mut calls = self.calls.lock().expect("metrics mutex poisoned");
        let stats = calls.entry(key).or_default();
        stats.responses += 1;
        stats.total_duration += duration;
        stats.max_severity = match (stats.max_severity, max_severity) {
            (Some(existing), Some(new)) => Some(if severity_rank(&new) > severity_rank(&existing) { new } else { existing }),
            (existing, None) => existing,
            (None, Some(new)) => Some(new),
        };
    }

    pub fn snapshot(&self) -> Vec<(CallKey, u64, u64, Duration)> {
        self.calls
            .lock()
            .expect("metrics mutex poisoned")
            .iter()
            .map(|(key, stats)| (key.clone(), stats.requests, stats.responses, stats.total_duration))
            .collect()
    }
}

fn severity_rank(s: &Severity) -> u8 {
    match s {
        Severity::Unspecified => 0,
        Severity::Normal => 1,
        Severity::Warning => 2,
        Severity::Fatal => 3,
    }
}

fn target_label(target: Target) -> &'static str {
    match target {
        Target::Unspecified => "unspecified",
        Target::Composite => "composite",
        Target::CompositeAndClaim => "composite-and-claim",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_requests_and_responses_independently() {
        let registry = MetricsRegistry::new();
        registry.record_request("function-auto-ready", "xpkg.upbound.io/crossplane/function-auto-ready");
        registry.record_response(
            "function-auto-ready",
            "xpkg.upbound.io/crossplane/function-auto-ready",
            "OK",
            Duration::from_millis(5),
            &[],
        );
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2, "request and response land under different target labels until a result arrives");
    }

    #[test]
    fn tracks_max_severity_across_calls() {
        let registry = MetricsRegistry::new();
        let warn = FunctionResult { severity: Severity::Warning, message: "m".into(), target: Target::Composite };
        let fatal = FunctionResult { severity: Severity::Fatal, message: "m".into(), target: Target::Composite };
        registry.record_response("f", "pkg", "OK", Duration::from_millis(1), std::slice::from_ref(&warn));
        registry.record_response("f", "pkg", "OK", Duration::from_millis(1), std::slice::from_ref(&fatal));
        let snapshot = registry.snapshot();
        let (_, _, responses, _) = snapshot.iter().find(|(k, ..)| k.target == "composite").unwrap();
        assert_eq!(*responses, 2);
    }
}
