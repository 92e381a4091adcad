//! Top-level error type for the controller binary.
//!
//! Everything below the host process (object store, reconcilers, function
//! pipeline) reports through its own crate's error enum; this type exists
//! only to give startup failures a `miette::Diagnostic` rendering and an
//! exit code, mirroring the teacher's CLI error convention.

use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

#[derive(Error, Debug, Diagnostic)]
pub enum ControllerError {
    #[error("failed to build a Kubernetes client: {message}")]
    #[diagnostic(code(crossplane::controller::client))]
    Client { message: String },

    #[error("cluster discovery failed: {0}")]
    #[diagnostic(code(crossplane::controller::discovery))]
    Discovery(#[from] crossplane_kube::KubeError),

    #[error("invalid kubeconfig at {path}: {message}")]
    #[diagnostic(code(crossplane::controller::kubeconfig))]
    Kubeconfig { path: String, message: String },
}

impl ControllerError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ControllerError::Client { .. } => exit_codes::CLIENT_ERROR,
            ControllerError::Discovery(_) => exit_codes::DISCOVERY_ERROR,
            ControllerError::Kubeconfig { .. } => exit_codes::CLIENT_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, ControllerError>;
