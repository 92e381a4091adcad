//! Standard exit codes for the controller binary.
//!
//! Only startup failures and clean shutdown are distinguishable from the
//! command line; once the reconcile loops are running, failures surface as
//! status conditions on the affected objects rather than process exit codes
//! (spec.md §6 "Exit codes").

#![allow(dead_code)]

/// Normal shutdown (spec.md §6: "0 normal shutdown").
pub const SUCCESS: i32 = 0;

/// General, unclassified startup error.
pub const ERROR: i32 = 1;

/// Could not load or apply the kubeconfig / build a client.
pub const CLIENT_ERROR: i32 = 2;

/// Object store discovery failed on startup (spec.md §6: "object-store
/// unavailable").
pub const DISCOVERY_ERROR: i32 = 3;

/// Invalid CLI arguments (following sysexits.h convention).
pub const USAGE_ERROR: i32 = 64;
