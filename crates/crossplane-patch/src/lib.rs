//! Pure patch/transform DSL evaluator (spec.md §4.D).
//!
//! This crate has no I/O: given a set of documents (composite, composed,
//! environment) and a Composition's patches and readiness checks, it computes
//! the same result every time. The composite reconciler (`crossplane-kube`)
//! owns fetching those documents and applying the result to the cluster.

pub mod error;
pub mod fieldpath;
pub mod parser;
pub mod patch;
pub mod readiness;
pub mod transform;

pub use error::{PatchError, Result};
pub use fieldpath::FieldPath;
pub use patch::{apply, PatchContext};
