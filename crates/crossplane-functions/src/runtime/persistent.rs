//! Persistent runtime variant: functions run as long-lived sidecars reached
//! over gRPC at a fixed address, one connection per distinct target shared
//! across calls (the common deployment shape for a function that pairs a
//! controller-adjacent `Deployment` with a `Service`).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use crossplane_core::composition::FunctionReference;
use tokio::sync::RwLock;
use tonic::transport::Channel;

use super::RuntimeHandler;
use crate::error::{FunctionError, Result};
use crate::proto::generated::function_runner_service_client::FunctionRunnerServiceClient;
use crate::proto::generated::{RunFunctionRequest, RunFunctionResponse};

/// Dials whatever gRPC target a function's `runtimeOptions.target` names,
/// pooling one connection per distinct address rather than per function
/// name (several functions commonly share one sidecar `Service`).
#[derive(Clone, Default)]
pub struct PersistentRuntime {
    /// Used when a function declares no `runtimeOptions.target` of its own.
    default_target: Option<String>,
    channels: Arc<RwLock<HashMap<String, Channel>>>,
}

impl PersistentRuntime {
    pub fn new() -> Self {
        Self { default_target: None, channels: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub fn with_default_target(mut self, target: impl Into<String>) -> Self {
        self.default_target = Some(target.into());
        self
    }

    fn target_for<'a>(&'a self, function: &'a FunctionReference) -> Result<&'a str> {
        function
            .runtime_options
            .target
            .as_deref()
            .or(self.default_target.as_deref())
            .ok_or_else(|| FunctionError::MissingTarget { name: function.name.clone() })
    }

    async fn channel_for(&self, name: &str, target: &str) -> Result<Channel> {
        if let Some(channel) = self.channels.read().await.get(target) {
            return Ok(channel.clone());
        }
        let endpoint = Channel::from_shared(target.to_string())
            .map_err(|source| FunctionError::Transport { name: name.to_string(), source })?;
        let channel = endpoint
            .connect()
            .await
            .map_err(|source| FunctionError::Transport { name: name.to_string(), source })?;
        self.channels.write().await.insert(target.to_string(), channel.clone());
        Ok(channel)
    }
}

#[async_trait]
impl RuntimeHandler for PersistentRuntime {
    async fn run_function(&self, function: &FunctionReference, request: RunFunctionRequest) -> Result<RunFunctionResponse> {
        let name = function.name.as_str();
        let target = self.target_for(function)?;
        let channel = self.channel_for(name, target).await?;
        let mut client = FunctionRunnerServiceClient::new(channel);
        let response = client
            .run_function(request)
            .await
            .map_err(|source| FunctionError::Rpc { name: name.to_string(), source })?;
        Ok(response.into_inner())
    }
}
