//! Drives a Pipeline-mode Composition's ordered function steps to a fixed
//! point (spec.md §4.E).
//!
//! Each step's response can carry [`Requirements`] asking for observed
//! resources the caller hasn't supplied yet (extra resources a function
//! needs to render its output, e.g. a referenced `ProviderConfig`). When
//! that happens the whole pipeline restarts from its first step with the
//! newly fetched resources folded into observed state, up to a fixed
//! iteration cap. A function step returning a `FATAL` result aborts the
//! pipeline immediately.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use crossplane_core::composition::PipelineStep;
use tokio_util::sync::CancellationToken;

use crate::error::{FunctionError, Result};
use crate::metrics::MetricsRegistry;
use crate::proto::{self, generated};
use crate::runtime::RuntimeHandler;
use crate::state::{self, DesiredState, FunctionResult, ObservedResource, ObservedState, Requirements};

pub const DEFAULT_ITERATION_CAP: u32 = 5;

/// Supplies the extra observed resources a step's [`Requirements`] asked
/// for. Implemented by the composite reconciler, which is the only layer
/// with object-store access; this crate never reaches into the cluster
/// itself.
#[async_trait]
pub trait RequirementFetcher: Send + Sync {
    async fn fetch(&self, requirements: &Requirements) -> Result<indexmap::IndexMap<String, ObservedResource>>;
}

/// A fetcher that never has anything to contribute, for pipelines that are
/// known not to use `Requirements` (or for tests).
pub struct NoRequirements;

#[async_trait]
impl RequirementFetcher for NoRequirements {
    async fn fetch(&self, _requirements: &Requirements) -> Result<indexmap::IndexMap<String, ObservedResource>> {
        Ok(indexmap::IndexMap::new())
    }
}

#[derive(Debug, Clone)]
pub struct StepResult {
    pub step: String,
    pub results: Vec<FunctionResult>,
}

#[derive(Debug, Clone)]
pub struct RenderResult {
    pub desired: DesiredState,
    pub context: serde_json::Value,
    pub step_results: Vec<StepResult>,
    pub iterations: u32,
}

pub struct PipelineRunner<'a> {
    runtime: &'a dyn RuntimeHandler,
    fetcher: &'a dyn RequirementFetcher,
    metrics: Option<&'a MetricsRegistry>,
    iteration_cap: u32,
    cancellation: CancellationToken,
}

impl<'a> PipelineRunner<'a> {
    pub fn new(runtime: &'a dyn RuntimeHandler, fetcher: &'a dyn RequirementFetcher) -> Self {
        Self {
            runtime,
            fetcher,
            metrics: None,
            iteration_cap: DEFAULT_ITERATION_CAP,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: &'a MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_iteration_cap(mut self, cap: u32) -> Self {
        self.iteration_cap = cap;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Runs every pipeline step in order, restarting from the top whenever a
    /// step asks for resources that weren't in the observed set, until
    /// either a fixed point is reached or the iteration cap is hit.
    pub async fn run(
        &self,
        steps: &[PipelineStep],
        mut observed: ObservedState,
    ) -> Result<RenderResult> {
        let mut iteration = 0u32;
        loop {
            if self.cancellation.is_cancelled() {
                return Err(FunctionError::DeadlineExceeded);
            }
            iteration += 1;
            if iteration > self.iteration_cap {
                return Err(FunctionError::IterationCapExceeded { cap: self.iteration_cap });
            }

            let outcome = self.run_once(steps, &observed).await?;

            if outcome.requirements.is_empty() {
                return Ok(RenderResult {
                    desired: outcome.desired,
                    context: outcome.context,
                    step_results: outcome.step_results,
                    iterations: iteration,
                });
            }

            let fetched = self.fetcher.fetch(&outcome.requirements).await?;
            for (name, resource) in fetched {
                observed.resources.insert(name, resource);
            }
        }
    }

    async fn run_once(&self, steps: &[PipelineStep], observed: &ObservedState) -> Result<Iteration> {
        let mut desired = DesiredState::default();
        let mut context = serde_json::Value::Object(serde_json::Map::new());
        let mut step_results = Vec::with_capacity(steps.len());
        let mut requirements = Requirements::default();

        for step in steps {
            if self.cancellation.is_cancelled() {
                return Err(FunctionError::DeadlineExceeded);
            }

            let request = generated::RunFunctionRequest {
                meta: Some(generated::RequestMeta { tag: step.step.clone() }),
                observed: Some(observed.to_proto()),
                desired: Some(desired.to_proto()),
                input: step.input.as_ref().map(proto::json_to_struct).transpose()?,
                context: Some(proto::json_to_struct(&context)?),
                credentials: Default::default(),
            };

            let name = &step.function_ref.name;
            let package = step.function_ref.runtime_options.image.as_deref().unwrap_or(name);
            let start = Instant::now();
            let response = self.runtime.run_function(&step.function_ref, request).await;
            let elapsed = start.elapsed();

            let response = response?;
            let decoded = state::decode_response(response)?;

            if let Some(metrics) = self.metrics {
                metrics.record_response(name, package, "OK", elapsed, &decoded.results);
            }

            if let Some(fatal) = decoded.results.iter().find(|r| r.is_fatal()) {
                return Err(FunctionError::Fatal { name: name.clone(), message: fatal.message.clone() });
            }

            desired = decoded.desired;
            context = decoded.context;
            for (name, selector) in decoded.requirements.resources {
                requirements.resources.insert(name, selector);
            }
            step_results.push(StepResult { step: step.step.clone(), results: decoded.results });
        }

        Ok(Iteration { desired, context, step_results, requirements })
    }
}

struct Iteration {
    desired: DesiredState,
    context: serde_json::Value,
    step_results: Vec<StepResult>,
    requirements: Requirements,
}

/// Helper for callers that want a hard wall-clock deadline on top of the
/// iteration cap (the composite reconciler applies both: spec.md §4.F).
pub fn cancel_after(duration: Duration) -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        child.cancel();
    });
    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{InProcessFn, InProcessRuntime};
    use async_trait::async_trait;
    use crossplane_core::composition::{FunctionReference, FunctionRuntime, RuntimeOptions};
    use std::sync::Arc;

    struct PassThrough;

    #[async_trait]
    impl InProcessFn for PassThrough {
        async fn call(&self, request: generated::RunFunctionRequest) -> Result<generated::RunFunctionResponse> {
            Ok(generated::RunFunctionResponse {
                meta: Some(generated::ResponseMeta { tag: request.meta.unwrap_or_default().tag, ttl: None }),
                desired: request.desired,
                results: vec![],
                context: request.context,
                requirements: None,
            })
        }
    }

    fn step(name: &str) -> PipelineStep {
        PipelineStep {
            step: name.to_string(),
            function_ref: FunctionReference {
                name: name.to_string(),
                runtime: FunctionRuntime::InProcess,
                runtime_options: RuntimeOptions::default(),
            },
            input: None,
            credentials: vec![],
        }
    }

    #[tokio::test]
    async fn runs_a_single_step_pipeline_to_completion() {
        let mut runtime = InProcessRuntime::new();
        runtime.register("echo", Arc::new(PassThrough));
        let runner = PipelineRunner::new(&runtime, &NoRequirements);

        let result = runner.run(&[step("echo")], ObservedState::default()).await.unwrap();
        assert_eq!(result.iterations, 1);
        assert_eq!(result.step_results.len(), 1);
    }

    #[tokio::test]
    async fn unknown_function_surfaces_as_error() {
        let runtime = InProcessRuntime::new();
        let runner = PipelineRunner::new(&runtime, &NoRequirements);
        let err = runner.run(&[step("missing")], ObservedState::default()).await.unwrap_err();
        assert!(matches!(err, FunctionError::UnknownInProcessFunction { .. }));
    }
}
