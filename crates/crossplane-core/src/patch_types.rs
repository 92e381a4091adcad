//! Data types for the patch/transform DSL (spec.md §4.D).
//!
//! This module holds only the *shape* of patches and transforms as they
//! appear in a Composition. The evaluator that walks these types against a
//! document lives in the `crossplane-patch` crate, which depends on this one.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Whether a patch's source field being absent is tolerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FromFieldPathPolicy {
    #[default]
    Optional,
    Required,
}

/// How array/map values are merged when a patch's target already has a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MergeOptionStrategy {
    #[default]
    Replace,
    Append,
    /// Merge object keys recursively; arrays are replaced.
    Merge,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PatchPolicy {
    #[serde(default)]
    pub from_field_path: FromFieldPathPolicy,
    #[serde(default)]
    pub merge_options: MergeOptionStrategy,
}

/// A named combine source: a field path plus how to format its value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombineVariable {
    pub from_field_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Combine {
    pub variables: Vec<CombineVariable>,
    /// A `fmt.Sprintf`-style format string with one `%s` per variable, in order.
    pub string_format: String,
}

/// One patch in a Composition's (or PatchSet's) ordered patch list.
///
/// Tagged by `type`, matching spec.md §4.D's enumerated variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Patch {
    FromCompositeFieldPath {
        #[serde(rename = "fromFieldPath")]
        from_field_path: String,
        #[serde(rename = "toFieldPath", default)]
        to_field_path: Option<String>,
        #[serde(default)]
        policy: Option<PatchPolicy>,
        #[serde(default)]
        transforms: Vec<Transform>,
    },
    ToCompositeFieldPath {
        #[serde(rename = "fromFieldPath")]
        from_field_path: String,
        #[serde(rename = "toFieldPath", default)]
        to_field_path: Option<String>,
        #[serde(default)]
        policy: Option<PatchPolicy>,
        #[serde(default)]
        transforms: Vec<Transform>,
    },
    CombineFromComposite {
        combine: Combine,
        #[serde(rename = "toFieldPath")]
        to_field_path: String,
        #[serde(default)]
        policy: Option<PatchPolicy>,
        #[serde(default)]
        transforms: Vec<Transform>,
    },
    CombineToComposite {
        combine: Combine,
        #[serde(rename = "toFieldPath")]
        to_field_path: String,
        #[serde(default)]
        policy: Option<PatchPolicy>,
        #[serde(default)]
        transforms: Vec<Transform>,
    },
    PatchSet {
        #[serde(rename = "patchSetName")]
        patch_set_name: String,
    },
    FromEnvironmentFieldPath {
        #[serde(rename = "fromFieldPath")]
        from_field_path: String,
        #[serde(rename = "toFieldPath", default)]
        to_field_path: Option<String>,
        #[serde(default)]
        policy: Option<PatchPolicy>,
        #[serde(default)]
        transforms: Vec<Transform>,
    },
    ToEnvironmentFieldPath {
        #[serde(rename = "fromFieldPath")]
        from_field_path: String,
        #[serde(rename = "toFieldPath", default)]
        to_field_path: Option<String>,
        #[serde(default)]
        policy: Option<PatchPolicy>,
        #[serde(default)]
        transforms: Vec<Transform>,
    },
    CombineFromEnvironment {
        combine: Combine,
        #[serde(rename = "toFieldPath")]
        to_field_path: String,
        #[serde(default)]
        policy: Option<PatchPolicy>,
        #[serde(default)]
        transforms: Vec<Transform>,
    },
    CombineToEnvironment {
        combine: Combine,
        #[serde(rename = "toFieldPath")]
        to_field_path: String,
        #[serde(default)]
        policy: Option<PatchPolicy>,
        #[serde(default)]
        transforms: Vec<Transform>,
    },
}

impl Patch {
    pub fn policy(&self) -> Option<&PatchPolicy> {
        use Patch::*;
        match self {
            FromCompositeFieldPath { policy, .. }
            | ToCompositeFieldPath { policy, .. }
            | CombineFromComposite { policy, .. }
            | CombineToComposite { policy, .. }
            | FromEnvironmentFieldPath { policy, .. }
            | ToEnvironmentFieldPath { policy, .. }
            | CombineFromEnvironment { policy, .. }
            | CombineToEnvironment { policy, .. } => policy.as_ref(),
            PatchSet { .. } => None,
        }
    }

    pub fn transforms(&self) -> &[Transform] {
        use Patch::*;
        match self {
            FromCompositeFieldPath { transforms, .. }
            | ToCompositeFieldPath { transforms, .. }
            | CombineFromComposite { transforms, .. }
            | CombineToComposite { transforms, .. }
            | FromEnvironmentFieldPath { transforms, .. }
            | ToEnvironmentFieldPath { transforms, .. }
            | CombineFromEnvironment { transforms, .. }
            | CombineToEnvironment { transforms, .. } => transforms,
            PatchSet { .. } => &[],
        }
    }
}

/// A named bundle of patches, referenced by composed templates via
/// `Patch::PatchSet`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchSetDefinition {
    pub name: String,
    pub patches: Vec<Patch>,
}

/// One element of a transform FIFO pipeline applied to a patched value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Transform {
    #[serde(rename = "math")]
    Math { math: MathTransform },
    #[serde(rename = "map")]
    Map { map: MapTransform },
    #[serde(rename = "match")]
    Match { #[serde(rename = "match")] match_: MatchTransform },
    #[serde(rename = "string")]
    String { string: StringTransform },
    #[serde(rename = "convert")]
    Convert { convert: ConvertTransform },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MathOp {
    Multiply,
    Clamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MathTransform {
    #[serde(default = "default_math_op")]
    pub op: MathOp,
    #[serde(default)]
    pub multiply: Option<i64>,
    #[serde(default)]
    pub clamp_min: Option<i64>,
    #[serde(default)]
    pub clamp_max: Option<i64>,
}

fn default_math_op() -> MathOp {
    MathOp::Multiply
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapTransform {
    pub pairs: indexmap::IndexMap<String, Json>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchTransform {
    pub patterns: Vec<MatchPattern>,
    #[serde(default)]
    pub fallback_value: Option<Json>,
    #[serde(default)]
    pub fallback_to: Option<FallbackTo>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum FallbackTo {
    #[default]
    Value,
    Input,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MatchPattern {
    Literal { literal: String, result: Json },
    Regexp { regexp: String, result: Json },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StringTransform {
    #[serde(flatten)]
    pub op: StringTransformOp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StringTransformOp {
    Format { fmt: String },
    Convert { convert: StringConvertKind },
    TrimPrefix { trim: String },
    TrimSuffix { trim: String },
    Regexp { regexp: RegexpTransform },
    Join { join: StringJoin },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StringConvertKind {
    ToUpper,
    ToLower,
    ToBase64,
    FromBase64,
    ToJson,
    ToSha1,
    ToSha256,
    ToSha512,
    ToAdler32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegexpTransform {
    pub pattern: String,
    #[serde(default)]
    pub group: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StringJoin {
    pub separator: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConvertTransform {
    ToString,
    ToInt,
    ToInt64,
    ToBool,
    ToFloat64,
    ToObject,
    ToArray,
}
