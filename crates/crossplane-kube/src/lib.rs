//! Cluster-facing control loops for the composition engine.
//!
//! `crossplane-core` defines the shapes, `crossplane-patch` and
//! `crossplane-functions` render them; this crate is where rendering meets
//! the object store: the Object Store Abstraction itself, the XRD
//! Definition Controller, the Composition Revision Manager, the Usage
//! Tracker, the GC/Orphan Resolver, and the Composite Reconciler that ties
//! all of them together into one reconcile loop per XR kind.

pub mod composite;
pub mod error;
pub mod gc;
pub mod revision;
pub mod store;
pub mod usage;
pub mod xrd;

pub use composite::{CompositeReconciler, ReconcileOutcome};
pub use error::{KubeError, Requeue, Result};
pub use store::{GroupVersionKindOwned, ObjectKey, ObjectStore, FIELD_MANAGER};
pub use xrd::ControllerRegistry;
