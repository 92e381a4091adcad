//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid XRD: {message}")]
    InvalidXrd { message: String },

    #[error("invalid Composition: {message}")]
    InvalidComposition { message: String },

    #[error("failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("referenced PatchSet not found: {name}")]
    PatchSetNotFound { name: String },

    #[error("duplicate step name in pipeline: {name}")]
    DuplicateStepName { name: String },

    #[error("duplicate resource name in composition: {name}")]
    DuplicateResourceName { name: String },

    #[error("invalid version: {0}")]
    InvalidVersion(#[from] semver::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
