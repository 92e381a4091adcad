//! Function Pipeline Runner (spec.md §4.E).
//!
//! Executes the ordered list of composition functions for a Pipeline-mode
//! Composition via a pluggable RPC contract. This crate owns the wire
//! contract (generated from `proto/apiextensions/fn/v1/run_function.proto`),
//! the three runtime variants functions can be invoked through, and the
//! iteration loop that drives a pipeline to a fixed point.
//!
//! No object-store interaction lives here: `crossplane-kube::composite`
//! gathers observed state and hands it to [`runner::PipelineRunner::run`],
//! then applies whatever desired state comes back.

pub mod error;
pub mod metrics;
pub mod proto;
pub mod runner;
pub mod runtime;
pub mod state;

pub use error::{FunctionError, Result};
pub use runner::{PipelineRunner, RenderResult, RequirementFetcher};
pub use runtime::RuntimeHandler;
pub use state::{
    DesiredResource, DesiredState, FunctionResult, ObservedResource, ObservedState, Requirements,
    ResourceMatch, ResourceSelector, Severity, Target,
};
