//! In-process runtime variant: native Rust functions registered by name,
//! invoked with no RPC round trip at all. Useful for built-in functions that
//! ship with the controller binary (e.g. a patch-and-transform compatibility
//! shim) where the sidecar protocol would be pure overhead.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use crossplane_core::composition::FunctionReference;

use super::RuntimeHandler;
use crate::error::{FunctionError, Result};
use crate::proto::generated::{RunFunctionRequest, RunFunctionResponse};

/// A registered in-process function body. Takes the decoded request and
/// returns the decoded response, same contract an external function honors.
#[async_trait]
pub trait InProcessFn: Send + Sync {
    async fn call(&self, request: RunFunctionRequest) -> Result<RunFunctionResponse>;
}

#[derive(Clone, Default)]
pub struct InProcessRuntime {
    functions: HashMap<String, Arc<dyn InProcessFn>>,
}

impl InProcessRuntime {
    pub fn new() -> Self {
        Self { functions: HashMap::new() }
    }

    pub fn register(&mut self, name: impl Into<String>, f: Arc<dyn InProcessFn>) {
        self.functions.insert(name.into(), f);
    }

    pub fn handles(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

#[async_trait]
impl RuntimeHandler for InProcessRuntime {
    async fn run_function(&self, function: &FunctionReference, request: RunFunctionRequest) -> Result<RunFunctionResponse> {
        let f = self
            .functions
            .get(function.name.as_str())
            .ok_or_else(|| FunctionError::UnknownInProcessFunction { name: function.name.clone() })?;
        f.call(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::generated::{RequestMeta, ResponseMeta};

    struct Echo;

    #[async_trait]
    impl InProcessFn for Echo {
        async fn call(&self, request: RunFunctionRequest) -> Result<RunFunctionResponse> {
            Ok(RunFunctionResponse {
                meta: Some(ResponseMeta { tag: request.meta.unwrap_or_default().tag, ttl: None }),
                desired: request.desired,
                results: vec![],
                context: request.context,
                requirements: None,
            })
        }
    }

    fn function_ref(name: &str) -> FunctionReference {
        FunctionReference {
            name: name.to_string(),
            runtime: crossplane_core::composition::FunctionRuntime::InProcess,
            runtime_options: Default::default(),
        }
    }

    #[tokio::test]
    async fn dispatches_to_registered_function() {
        let mut runtime = InProcessRuntime::new();
        runtime.register("echo", Arc::new(Echo));
        assert!(runtime.handles("echo"));
        assert!(!runtime.handles("missing"));

        let request = RunFunctionRequest {
            meta: Some(RequestMeta { tag: "t1".to_string() }),
            observed: None,
            desired: None,
            input: None,
            context: None,
            credentials: Default::default(),
        };
        let response = runtime.run_function(&function_ref("echo"), request).await.unwrap();
        assert_eq!(response.meta.unwrap().tag, "t1");
    }

    #[tokio::test]
    async fn unknown_function_errors() {
        let runtime = InProcessRuntime::new();
        let request = RunFunctionRequest {
            meta: None,
            observed: None,
            desired: None,
            input: None,
            context: None,
            credentials: Default::default(),
        };
        assert!(runtime.run_function(&function_ref("nope"), request).await.is_err());
    }
}
