//! Status conditions, shared by XRDs, Compositions, CompositionRevisions and XRs.
//!
//! Mirrors the Kubernetes API convention of a `conditions` array of
//! `{type, status, reason, message, lastTransitionTime}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tri-state condition status, per the Kubernetes API conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// A single status condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn new(condition_type: impl Into<String>, status: ConditionStatus, reason: impl Into<String>) -> Self {
        Self {
            condition_type: condition_type.into(),
            status,
            reason: reason.into(),
            message: String::new(),
            last_transition_time: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Well-known condition type names used throughout the engine.
pub mod types {
    pub const ESTABLISHED: &str = "Established";
    pub const TERMINATING: &str = "Terminating";
    pub const SYNCED: &str = "Synced";
    pub const READY: &str = "Ready";
}

/// Well-known condition reasons.
pub mod reasons {
    pub const WATCHING_COMPOSITE_RESOURCE: &str = "WatchingCompositeResource";
    pub const TERMINATING_COMPOSITE_RESOURCE: &str = "TerminatingCompositeResource";
    pub const REASON_SUCCESS: &str = "ReconcileSuccess";
    pub const REASON_ERROR: &str = "ReconcileError";
    pub const MISSING_REVISION: &str = "MissingRevision";
    pub const MISSING_CONNECTION_SECRET: &str = "MissingConnectionSecret";
    pub const COMPOSITE_RESOURCE_NOT_READY: &str = "CompositeResourceNotReady";
}

/// A mutable set of conditions keyed by type, preserving Kubernetes'
/// "set-if-changed, keep order of first insertion" update semantics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionSet(pub Vec<Condition>);

impl ConditionSet {
    pub fn set(&mut self, new: Condition) {
        if let Some(existing) = self
            .0
            .iter_mut()
            .find(|c| c.condition_type == new.condition_type)
        {
            if existing.status != new.status || existing.reason != new.reason || existing.message != new.message {
                let mut updated = new;
                // Kubernetes convention: lastTransitionTime only advances when status changes.
                if existing.status == updated.status {
                    updated.last_transition_time = existing.last_transition_time;
                }
                *existing = updated;
            }
        } else {
            self.0.push(new);
        }
    }

    pub fn get(&self, condition_type: &str) -> Option<&Condition> {
        self.0.iter().find(|c| c.condition_type == condition_type)
    }

    pub fn is_true(&self, condition_type: &str) -> bool {
        self.get(condition_type).is_some_and(Condition::is_true)
    }
}
