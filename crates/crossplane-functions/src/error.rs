//! Error vocabulary for the function pipeline runner.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FunctionError {
    #[error("function '{name}' transport error: {source}")]
    Transport { name: String, #[source] source: tonic::transport::Error },

    #[error("function '{name}' RPC failed: {source}")]
    Rpc { name: String, #[source] source: tonic::Status },

    #[error("function '{name}' runtime has no target configured")]
    MissingTarget { name: String },

    #[error("function '{name}' runtime has no image configured")]
    MissingImage { name: String },

    #[error("in-process function '{name}' is not registered")]
    UnknownInProcessFunction { name: String },

    #[error("failed to spawn one-shot function process for '{name}': {source}")]
    Spawn { name: String, #[source] source: std::io::Error },

    #[error("one-shot function '{name}' did not expose a control socket within {timeout:?}")]
    SocketTimeout { name: String, timeout: std::time::Duration },

    #[error("pipeline exceeded the requirement-iteration cap of {cap}")]
    IterationCapExceeded { cap: u32 },

    #[error("function '{name}' returned a fatal result: {message}")]
    Fatal { name: String, message: String },

    #[error("pipeline step deadline exceeded")]
    DeadlineExceeded,

    #[error("invalid struct document: {0}")]
    InvalidDocument(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FunctionError>;
