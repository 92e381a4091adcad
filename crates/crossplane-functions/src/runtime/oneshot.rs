//! One-shot runtime variant: a function process is spawned fresh for the
//! call and torn down afterwards, trading connection reuse for strict
//! isolation between invocations. Full container/OCI lifecycle management
//! is out of scope; this models the process-spawn shape a container runtime
//! would sit behind.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use crossplane_core::composition::FunctionReference;
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tokio::process::Command;
use tokio::time::{sleep, Instant};
use tonic::transport::{Endpoint, Uri};
use tower::service_fn;

use super::RuntimeHandler;
use crate::error::{FunctionError, Result};
use crate::proto::generated::function_runner_service_client::FunctionRunnerServiceClient;
use crate::proto::generated::{RunFunctionRequest, RunFunctionResponse};

/// Whether a one-shot process is killed once its call completes, or left
/// running for the surrounding container runtime to reap (spec.md §5
/// "orphaned docker-runtime containers are cleaned up unless the function
/// annotates `runtime-docker-cleanup: Orphan`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleanupPolicy {
    #[default]
    Kill,
    Orphan,
}

impl CleanupPolicy {
    fn from_option(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("orphan") => CleanupPolicy::Orphan,
            _ => CleanupPolicy::Kill,
        }
    }
}

/// Fully resolved launch configuration for one invocation, built at call
/// time from the function's declared `runtimeOptions` plus the runtime's
/// process-wide defaults for the parts a Composition has no business
/// declaring (argv, socket directory, startup timeout).
#[derive(Debug, Clone)]
pub struct OneShotConfig {
    /// Executable invoked to start the function process (in a real
    /// deployment this would be an OCI image reference resolved to a
    /// runnable binary by the surrounding container runtime).
    pub image: String,
    pub args: Vec<String>,
    /// Unix domain socket the function is expected to listen on once ready.
    pub socket_path: PathBuf,
    pub startup_timeout: Duration,
    pub cleanup: CleanupPolicy,
}

/// Process-wide defaults for parts of one-shot launch that a Composition
/// does not declare per function.
#[derive(Debug, Clone)]
pub struct OneShotDefaults {
    pub args: Vec<String>,
    pub socket_dir: PathBuf,
    pub startup_timeout: Duration,
}

impl Default for OneShotDefaults {
    fn default() -> Self {
        Self { args: Vec::new(), socket_dir: PathBuf::from("/tmp/crossplane-fn"), startup_timeout: Duration::from_secs(10) }
    }
}

#[derive(Clone, Default)]
pub struct OneShotRuntime {
    defaults: OneShotDefaults,
}

impl OneShotRuntime {
    pub fn new(defaults: OneShotDefaults) -> Self {
        Self { defaults }
    }

    fn resolve(&self, function: &FunctionReference) -> Result<OneShotConfig> {
        let image = function
            .runtime_options
            .image
            .clone()
            .ok_or_else(|| FunctionError::MissingImage { name: function.name.clone() })?;
        Ok(OneShotConfig {
            image,
            args: self.defaults.args.clone(),
            socket_path: self.defaults.socket_dir.join(format!("{}.sock", function.name)),
            startup_timeout: self.defaults.startup_timeout,
            cleanup: CleanupPolicy::from_option(function.runtime_options.cleanup_policy.as_deref()),
        })
    }

    async fn wait_for_socket(&self, name: &str, config: &OneShotConfig) -> Result<()> {
        let deadline = Instant::now() + config.startup_timeout;
        loop {
            if config.socket_path.exists() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(FunctionError::SocketTimeout {
                    name: name.to_string(),
                    timeout: config.startup_timeout,
                });
            }
            sleep(Duration::from_millis(20)).await;
        }
    }
}

#[async_trait]
impl RuntimeHandler for OneShotRuntime {
    async fn run_function(&self, function: &FunctionReference, request: RunFunctionRequest) -> Result<RunFunctionResponse> {
        let name = function.name.as_str();
        let config = self.resolve(function)?;
        let config = &config;

        let mut child = Command::new(&config.image)
            .args(&config.args)
            .kill_on_drop(config.cleanup == CleanupPolicy::Kill)
            .spawn()
            .map_err(|source| FunctionError::Spawn { name: name.to_string(), source })?;

        self.wait_for_socket(name, config).await?;

        let socket_path = config.socket_path.clone();
        let endpoint = Endpoint::try_from("http://[::]:0")
            .map_err(|source| FunctionError::Transport { name: name.to_string(), source })?;
        let channel = endpoint
            .connect_with_connector(service_fn(move |_: Uri| {
                let socket_path = socket_path.clone();
                async move { Ok::<_, std::io::Error>(TokioIo::new(UnixStream::connect(socket_path).await?)) }
            }))
            .await
            .map_err(|source| FunctionError::Transport { name: name.to_string(), source })?;

        let mut client = FunctionRunnerServiceClient::new(channel);
        let result = client
            .run_function(request)
            .await
            .map(|response| response.into_inner())
            .map_err(|source| FunctionError::Rpc { name: name.to_string(), source });

        if config.cleanup == CleanupPolicy::Kill {
            let _ = child.start_kill();
            let _ = child.wait().await;
        } else {
            // Orphan: leave the process running for the surrounding
            // container runtime to reap; drop our handle without waiting.
            drop(child);
        }

        result
    }
}
