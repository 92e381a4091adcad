//! Connection detail extraction kinds.
//!
//! A connection detail can be pulled from a composed resource's connection
//! secret, from an arbitrary field path on the composed resource, or given
//! as a literal value.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConnectionDetailExtractor {
    FromConnectionSecretKey { from_connection_secret_key: String },
    FromFieldPath { from_field_path: String },
    FromValue { value: String },
}
