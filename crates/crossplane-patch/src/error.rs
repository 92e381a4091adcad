//! Error vocabulary for the patch/transform evaluator.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("invalid field path '{path}': {message}")]
    InvalidFieldPath { path: String, message: String },

    #[error("required field path '{path}' is absent")]
    RequiredFieldAbsent { path: String },

    #[error("field path '{path}' does not resolve to an array, but an index was applied")]
    NotAnArray { path: String },

    #[error("field path '{path}' does not resolve to an object, but a map key was applied")]
    NotAnObject { path: String },

    #[error("array index {index} out of bounds for path '{path}' (len {len})")]
    IndexOutOfBounds { path: String, index: usize, len: usize },

    #[error("no array element in '{path}' matched filter {key}={value}")]
    FilterNoMatch { path: String, key: String, value: String },

    #[error("referenced PatchSet '{name}' not found")]
    PatchSetNotFound { name: String },

    #[error("transform '{kind}' failed: {message}")]
    TransformFailed { kind: String, message: String },

    #[error("combine format string '{format}' expects {expected} variables, got {actual}")]
    CombineArityMismatch { format: String, expected: usize, actual: usize },

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PatchError>;
