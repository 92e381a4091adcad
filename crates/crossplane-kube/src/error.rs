//! Error vocabulary for the cluster-facing reconcilers (spec.md §7).
//!
//! Every reconciler maps whatever the object store or an external call
//! throws down to one of these kinds. The kind, not the underlying error,
//! is what drives requeue policy: see [`KubeError::requeue`].

use thiserror::Error;

pub type Result<T> = std::result::Result<T, KubeError>;

#[derive(Debug, Error)]
pub enum KubeError {
    /// The object store reports the object doesn't exist. Read paths
    /// propagate this; delete paths swallow it.
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    /// Optimistic concurrency failure; the caller should retry immediately
    /// after re-reading the object.
    #[error("conflict updating {kind} '{name}': {message}")]
    Conflict { kind: String, name: String, message: String },

    /// Schema or referential problem that will not resolve without the
    /// object changing (e.g. a dangling PatchSet reference).
    #[error("invalid {kind} '{name}': {message}")]
    Invalid { kind: String, name: String, message: String },

    /// Network/timeout class failure. Requeue with exponential backoff.
    #[error("transient error on {kind} '{name}': {message}")]
    Transient { kind: String, name: String, message: String },

    /// Unrecoverable: stop requeueing until the input itself changes.
    #[error("fatal error on {kind} '{name}': {message}")]
    Fatal { kind: String, name: String, message: String },

    /// Attempted to adopt a resource already owned by a different
    /// controller. Never auto-resolves.
    #[error("{kind} '{name}' is controlled by {owner}, refusing to adopt")]
    NotControllable { kind: String, name: String, owner: String },

    #[error("kubernetes api error: {0}")]
    Api(#[from] kube::Error),

    #[error("function pipeline error: {0}")]
    Function(#[from] crossplane_functions::FunctionError),

    #[error("patch evaluation error: {0}")]
    Patch(#[from] crossplane_patch::PatchError),

    #[error("composition model error: {0}")]
    Core(#[from] crossplane_core::CoreError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// How soon the caller should retry after this error (spec.md §7 policy
/// table). `None` means do not requeue until the object changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    Immediate,
    Backoff { floor_secs: u64, cap_secs: u64 },
    None,
}

impl KubeError {
    pub fn requeue(&self) -> Requeue {
        match self {
            KubeError::NotFound { .. } => Requeue::None,
            KubeError::Conflict { .. } => Requeue::Immediate,
            KubeError::Invalid { .. } => Requeue::None,
            KubeError::Transient { .. } => Requeue::Backoff { floor_secs: 30, cap_secs: 60 },
            KubeError::Fatal { .. } => Requeue::None,
            KubeError::NotControllable { .. } => Requeue::None,
            KubeError::Api(e) => classify_api_error(e),
            KubeError::Function(_) => Requeue::Backoff { floor_secs: 30, cap_secs: 60 },
            KubeError::Patch(_) => Requeue::None,
            KubeError::Core(_) => Requeue::None,
            KubeError::Json(_) | KubeError::Yaml(_) => Requeue::None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::NotFound { .. })
            || matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, KubeError::Conflict { .. })
            || matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 409)
    }

    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        KubeError::NotFound { kind: kind.into(), name: name.into() }
    }

    pub fn transient(kind: impl Into<String>, name: impl Into<String>, message: impl Into<String>) -> Self {
        KubeError::Transient { kind: kind.into(), name: name.into(), message: message.into() }
    }
}

fn classify_api_error(e: &kube::Error) -> Requeue {
    match e {
        kube::Error::Api(resp) if resp.code == 404 => Requeue::None,
        kube::Error::Api(resp) if resp.code == 409 => Requeue::Immediate,
        kube::Error::Api(resp) if resp.code >= 500 => Requeue::Backoff { floor_secs: 30, cap_secs: 60 },
        _ => Requeue::Backoff { floor_secs: 30, cap_secs: 60 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_requeues_immediately() {
        let err = KubeError::Conflict { kind: "XR".into(), name: "a".into(), message: "m".into() };
        assert_eq!(err.requeue(), Requeue::Immediate);
        assert!(err.is_conflict());
    }

    #[test]
    fn not_found_never_requeues() {
        let err = KubeError::not_found("XR", "a");
        assert_eq!(err.requeue(), Requeue::None);
        assert!(err.is_not_found());
    }
}
