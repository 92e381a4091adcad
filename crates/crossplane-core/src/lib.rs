//! Core data model for the Crossplane composition engine.
//!
//! This crate has no Kubernetes API-server interaction of its own: it
//! defines the shapes that make up an XRD, a Composition, a
//! CompositionRevision, a Composite Resource, a Composed Resource and an
//! Environment, plus the pure, deterministic helpers every other crate in
//! this workspace builds on (revision hashing, condition aggregation).

pub mod composed;
pub mod composition;
pub mod condition;
pub mod connection;
pub mod environment;
pub mod error;
mod fieldpath_support;
pub mod hash;
pub mod patch_types;
pub mod revision;
pub mod usage;
pub mod xr;
pub mod xrd;

pub use composed::ComposedResource;
pub use composition::{Composition, CompositionMode, CompositionSpec, CompositionStatus};
pub use condition::{Condition, ConditionSet, ConditionStatus};
pub use environment::{Environment, EnvironmentConfig, EnvironmentConfigSpec};
pub use error::{CoreError, Result};
pub use revision::{CompositionRevision, CompositionRevisionSpec, CompositionRevisionStatus};
pub use usage::{ResourceRef, ResourceSelector, Usage, UsageSpec, UsageStatus, UsageTarget};
pub use xr::CompositeResource;
pub use xrd::{CompositeResourceDefinition, CompositeResourceDefinitionSpec, CompositeResourceDefinitionStatus};
