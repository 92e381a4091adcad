//! Pluggable function execution backends (spec.md §4.E "Runtime variants").
//!
//! A composition function is addressed by name from the pipeline step, but
//! how its `RunFunction` call actually gets executed is a runtime concern:
//! some functions live in-process as native Rust closures registered at
//! startup, some run as long-lived sidecars reached over gRPC, and some are
//! spawned fresh per call. [`RuntimeHandler`] is the seam between the
//! pipeline loop and those three variants, mirroring the way the teacher
//! dispatches storage operations across backends through a single
//! `StorageDriver` trait object rather than branching on a backend enum at
//! every call site.

mod in_process;
mod oneshot;
mod persistent;

pub use in_process::{InProcessFn, InProcessRuntime};
pub use oneshot::{CleanupPolicy, OneShotConfig, OneShotDefaults, OneShotRuntime};
pub use persistent::PersistentRuntime;

use async_trait::async_trait;
use crossplane_core::composition::{FunctionReference, FunctionRuntime};

use crate::error::Result;
use crate::proto::generated::{RunFunctionRequest, RunFunctionResponse};

/// Executes a single `RunFunction` call for a composition function.
///
/// The pipeline step's [`FunctionReference`] is passed alongside the
/// request (not just its name) because the runtime-specific options that
/// decide *how* to reach the function — gRPC target, OCI image, cleanup
/// policy — are carried on the function object itself (spec.md §4.E step
/// 2), not registered out of band on the runtime.
#[async_trait]
pub trait RuntimeHandler: Send + Sync {
    async fn run_function(&self, function: &FunctionReference, request: RunFunctionRequest) -> Result<RunFunctionResponse>;
}

/// Dispatches to whichever variant matches the function's declared
/// `runtime` annotation (spec.md §9 "Model the runtime choice as a tagged
/// variant... selected per function via its declared runtime annotation").
/// A controller only needs to configure the variants its deployment
/// actually uses; dispatching to an unconfigured variant is a startup
/// misconfiguration, not a fallback opportunity.
pub struct CompositeRuntime {
    in_process: Option<InProcessRuntime>,
    persistent: Option<PersistentRuntime>,
    one_shot: Option<OneShotRuntime>,
}

impl CompositeRuntime {
    pub fn new() -> Self {
        Self { in_process: None, persistent: None, one_shot: None }
    }

    pub fn with_in_process(mut self, runtime: InProcessRuntime) -> Self {
        self.in_process = Some(runtime);
        self
    }

    pub fn with_persistent(mut self, runtime: PersistentRuntime) -> Self {
        self.persistent = Some(runtime);
        self
    }

    pub fn with_one_shot(mut self, runtime: OneShotRuntime) -> Self {
        self.one_shot = Some(runtime);
        self
    }
}

impl Default for CompositeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuntimeHandler for CompositeRuntime {
    async fn run_function(&self, function: &FunctionReference, request: RunFunctionRequest) -> Result<RunFunctionResponse> {
        match function.runtime {
            FunctionRuntime::InProcess => match &self.in_process {
                Some(rt) => rt.run_function(function, request).await,
                None => Err(crate::error::FunctionError::UnknownInProcessFunction { name: function.name.clone() }),
            },
            FunctionRuntime::Persistent => match &self.persistent {
                Some(rt) => rt.run_function(function, request).await,
                None => Err(crate::error::FunctionError::MissingTarget { name: function.name.clone() }),
            },
            FunctionRuntime::OneShot => match &self.one_shot {
                Some(rt) => rt.run_function(function, request).await,
                None => Err(crate::error::FunctionError::MissingImage { name: function.name.clone() }),
            },
        }
    }
}
