//! Evaluates a single [`Patch`] (spec.md §4.D) against the composite (XR),
//! composed resource and environment documents for one render.
//!
//! Direction is encoded in the patch variant name: `FromComposite*` reads the
//! XR and writes the composed resource (or vice versa for `ToComposite*`);
//! `*Environment*` variants read/write the [`Environment`] instead of the
//! composed resource. `PatchSet` is resolved against the Composition's
//! declared sets and expanded in place.

use crossplane_core::environment::Environment;
use crossplane_core::patch_types::{
    Combine, FromFieldPathPolicy, MergeOptionStrategy, Patch, PatchPolicy, PatchSetDefinition,
};
use serde_json::Value as Json;

use crate::error::{PatchError, Result};
use crate::fieldpath::{self, FieldPath};
use crate::transform;

/// The two documents a patch may read from or write to, besides the
/// environment (which is carried separately since it is not a per-resource
/// document).
pub struct PatchContext<'a> {
    pub composite: &'a mut Json,
    pub composed: &'a mut Json,
    pub environment: &'a mut Environment,
}

/// Apply `patch` to the documents in `ctx`, expanding `PatchSet` references
/// against `patch_sets`. A `Required` source field that is absent returns
/// `Err`; `Optional` (the default) is a silent no-op, matching spec.md §8
/// "Boundary behaviour".
pub fn apply(patch: &Patch, ctx: &mut PatchContext, patch_sets: &[PatchSetDefinition]) -> Result<()> {
    match patch {
        Patch::FromCompositeFieldPath { from_field_path, to_field_path, policy, transforms } => {
            copy(ctx.composite, ctx.composed, from_field_path, to_field_path.as_deref(), policy, transforms)
        }
        Patch::ToCompositeFieldPath { from_field_path, to_field_path, policy, transforms } => {
            copy(ctx.composed, ctx.composite, from_field_path, to_field_path.as_deref(), policy, transforms)
        }
        Patch::FromEnvironmentFieldPath { from_field_path, to_field_path, policy, transforms } => {
            copy(&ctx.environment.0, ctx.composed, from_field_path, to_field_path.as_deref(), policy, transforms)
        }
        Patch::ToEnvironmentFieldPath { from_field_path, to_field_path, policy, transforms } => {
            let mut env_doc = ctx.environment.0.clone();
            copy(ctx.composed, &mut env_doc, from_field_path, to_field_path.as_deref(), policy, transforms)?;
            ctx.environment.0 = env_doc;
            Ok(())
        }
        Patch::CombineFromComposite { combine, to_field_path, policy, transforms } => {
            combine_into(ctx.composite, ctx.composed, combine, to_field_path, policy, transforms)
        }
        Patch::CombineToComposite { combine, to_field_path, policy, transforms } => {
            combine_into(ctx.composed, ctx.composite, combine, to_field_path, policy, transforms)
        }
        Patch::CombineFromEnvironment { combine, to_field_path, policy, transforms } => {
            combine_into(&ctx.environment.0, ctx.composed, combine, to_field_path, policy, transforms)
        }
        Patch::CombineToEnvironment { combine, to_field_path, policy, transforms } => {
            let mut env_doc = ctx.environment.0.clone();
            combine_into(ctx.composed, &mut env_doc, combine, to_field_path, policy, transforms)?;
            ctx.environment.0 = env_doc;
            Ok(())
        }
        Patch::PatchSet { patch_set_name } => {
            let set = patch_sets
                .iter()
                .find(|p| &p.name == patch_set_name)
                .ok_or_else(|| PatchError::PatchSetNotFound { name: patch_set_name.clone() })?;
            for inner in &set.patches {
                apply(inner, ctx, patch_sets)?;
            }
            Ok(())
        }
    }
}

fn policy_or_default(policy: &Option<PatchPolicy>) -> (FromFieldPathPolicy, MergeOptionStrategy) {
    match policy {
        Some(p) => (p.from_field_path, p.merge_options),
        None => (FromFieldPathPolicy::default(), MergeOptionStrategy::default()),
    }
}

fn copy(
    source_doc: &Json,
    target_doc: &mut Json,
    from_field_path: &str,
    to_field_path: Option<&str>,
    policy: &Option<PatchPolicy>,
    transforms: &[crossplane_core::patch_types::Transform],
) -> Result<()> {
    let from_path = FieldPath::parse(from_field_path)
        .map_err(|e| PatchError::InvalidFieldPath { path: from_field_path.to_string(), message: e.to_string() })?;
    let (from_policy, merge) = policy_or_default(policy);

    let Some(source_value) = fieldpath::get(source_doc, &from_path)? else {
        return match from_policy {
            FromFieldPathPolicy::Required => {
                Err(PatchError::RequiredFieldAbsent { path: from_field_path.to_string() })
            }
            FromFieldPathPolicy::Optional => Ok(()),
        };
    };

    let value = transform::apply_pipeline(transforms, source_value.clone())?;
    let to_field_path = to_field_path.unwrap_or(from_field_path);
    let to_path = FieldPath::parse(to_field_path)
        .map_err(|e| PatchError::InvalidFieldPath { path: to_field_path.to_string(), message: e.to_string() })?;
    write_with_merge(target_doc, &to_path, value, merge)
}

fn combine_into(
    source_doc: &Json,
    target_doc: &mut Json,
    combine: &Combine,
    to_field_path: &str,
    policy: &Option<PatchPolicy>,
    transforms: &[crossplane_core::patch_types::Transform],
) -> Result<()> {
    let (from_policy, merge) = policy_or_default(policy);

    let mut rendered = Vec::with_capacity(combine.variables.len());
    for variable in &combine.variables {
        let path = FieldPath::parse(&variable.from_field_path).map_err(|e| PatchError::InvalidFieldPath {
            path: variable.from_field_path.clone(),
            message: e.to_string(),
        })?;
        match fieldpath::get(source_doc, &path)? {
            Some(v) => rendered.push(json_to_combine_string(v)),
            None => match from_policy {
                FromFieldPathPolicy::Required => {
                    return Err(PatchError::RequiredFieldAbsent { path: variable.from_field_path.clone() });
                }
                FromFieldPathPolicy::Optional => return Ok(()),
            },
        }
    }

    let formatted = sprintf_many(&combine.string_format, &rendered)?;
    let value = transform::apply_pipeline(transforms, Json::String(formatted))?;
    let to_path = FieldPath::parse(to_field_path)
        .map_err(|e| PatchError::InvalidFieldPath { path: to_field_path.to_string(), message: e.to_string() })?;
    write_with_merge(target_doc, &to_path, value, merge)
}

fn json_to_combine_string(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Substitute each `%s`/`%d` verb in `fmt`, in order, with the corresponding
/// entry of `values`.
fn sprintf_many(fmt: &str, values: &[String]) -> Result<String> {
    let mut out = String::with_capacity(fmt.len());
    let mut chars = fmt.chars().peekable();
    let mut value_iter = values.iter();
    let mut consumed = 0usize;

    while let Some(c) = chars.next() {
        if c == '%' {
            if let Some(&next) = chars.peek() {
                if next == 's' || next == 'd' {
                    chars.next();
                    match value_iter.next() {
                        Some(v) => {
                            out.push_str(v);
                            consumed += 1;
                        }
                        None => {
                            return Err(PatchError::CombineArityMismatch {
                                format: fmt.to_string(),
                                expected: consumed + 1,
                                actual: values.len(),
                            });
                        }
                    }
                    continue;
                }
            }
            out.push(c);
        } else {
            out.push(c);
        }
    }

    if value_iter.next().is_some() {
        return Err(PatchError::CombineArityMismatch {
            format: fmt.to_string(),
            expected: consumed,
            actual: values.len(),
        });
    }

    Ok(out)
}

fn write_with_merge(doc: &mut Json, path: &FieldPath, value: Json, merge: MergeOptionStrategy) -> Result<()> {
    match merge {
        MergeOptionStrategy::Replace => fieldpath::set(doc, path, value),
        MergeOptionStrategy::Append => {
            let existing = fieldpath::get(doc, path)?.cloned();
            let merged = match existing {
                Some(Json::Array(mut items)) => {
                    match value {
                        Json::Array(more) => items.extend(more),
                        other => items.push(other),
                    }
                    Json::Array(items)
                }
                _ => match value {
                    Json::Array(items) => Json::Array(items),
                    other => Json::Array(vec![other]),
                },
            };
            fieldpath::set(doc, path, merged)
        }
        MergeOptionStrategy::Merge => {
            let existing = fieldpath::get(doc, path)?.cloned();
            let merged = match (existing, value) {
                (Some(Json::Object(mut base)), Json::Object(overlay)) => {
                    for (k, v) in overlay {
                        base.insert(k, v);
                    }
                    Json::Object(base)
                }
                (_, other) => other,
            };
            fieldpath::set(doc, path, merged)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossplane_core::patch_types::{CombineVariable, FromFieldPathPolicy, MathOp, MathTransform, Transform};
    use serde_json::json;

    fn ctx<'a>(composite: &'a mut Json, composed: &'a mut Json, env: &'a mut Environment) -> PatchContext<'a> {
        PatchContext { composite, composed, environment: env }
    }

    #[test]
    fn from_composite_field_path_copies_with_transform() {
        let mut composite = json!({"spec": {"storageGB": 20}});
        let mut composed = json!({});
        let mut env = Environment::new();
        let patch = Patch::FromCompositeFieldPath {
            from_field_path: "spec.storageGB".to_string(),
            to_field_path: Some("spec.forProvider.size".to_string()),
            policy: None,
            transforms: vec![Transform::Math {
                math: MathTransform { op: MathOp::Multiply, multiply: Some(2), clamp_min: None, clamp_max: None },
            }],
        };
        apply(&patch, &mut ctx(&mut composite, &mut composed, &mut env), &[]).unwrap();
        assert_eq!(composed["spec"]["forProvider"]["size"], json!(40));
    }

    #[test]
    fn required_policy_errors_on_missing_source() {
        let mut composite = json!({});
        let mut composed = json!({});
        let mut env = Environment::new();
        let patch = Patch::FromCompositeFieldPath {
            from_field_path: "spec.missing".to_string(),
            to_field_path: None,
            policy: Some(PatchPolicy { from_field_path: FromFieldPathPolicy::Required, merge_options: Default::default() }),
            transforms: vec![],
        };
        assert!(matches!(
            apply(&patch, &mut ctx(&mut composite, &mut composed, &mut env), &[]),
            Err(PatchError::RequiredFieldAbsent { .. })
        ));
    }

    #[test]
    fn optional_policy_is_noop_on_missing_source() {
        let mut composite = json!({});
        let mut composed = json!({"untouched": true});
        let mut env = Environment::new();
        let patch = Patch::FromCompositeFieldPath {
            from_field_path: "spec.missing".to_string(),
            to_field_path: None,
            policy: None,
            transforms: vec![],
        };
        apply(&patch, &mut ctx(&mut composite, &mut composed, &mut env), &[]).unwrap();
        assert_eq!(composed, json!({"untouched": true}));
    }

    #[test]
    fn to_composite_field_path_copies_observed_back() {
        let mut composite = json!({});
        let mut composed = json!({"status": {"atProvider": {"arn": "abc"}}});
        let mut env = Environment::new();
        let patch = Patch::ToCompositeFieldPath {
            from_field_path: "status.atProvider.arn".to_string(),
            to_field_path: Some("status.arn".to_string()),
            policy: None,
            transforms: vec![],
        };
        apply(&patch, &mut ctx(&mut composite, &mut composed, &mut env), &[]).unwrap();
        assert_eq!(composite["status"]["arn"], json!("abc"));
    }

    #[test]
    fn combine_from_composite_formats_fields() {
        let mut composite = json!({"spec": {"region": "us-east-1", "env": "prod"}});
        let mut composed = json!({});
        let mut env = Environment::new();
        let patch = Patch::CombineFromComposite {
            combine: Combine {
                variables: vec![
                    CombineVariable { from_field_path: "spec.region".to_string() },
                    CombineVariable { from_field_path: "spec.env".to_string() },
                ],
                string_format: "%s-%s".to_string(),
            },
            to_field_path: "spec.forProvider.name".to_string(),
            policy: None,
            transforms: vec![],
        };
        apply(&patch, &mut ctx(&mut composite, &mut composed, &mut env), &[]).unwrap();
        assert_eq!(composed["spec"]["forProvider"]["name"], json!("us-east-1-prod"));
    }

    #[test]
    fn patch_set_expands_nested_patches() {
        let mut composite = json!({"spec": {"size": 1}});
        let mut composed = json!({});
        let mut env = Environment::new();
        let patch_sets = vec![PatchSetDefinition {
            name: "common".to_string(),
            patches: vec![Patch::FromCompositeFieldPath {
                from_field_path: "spec.size".to_string(),
                to_field_path: None,
                policy: None,
                transforms: vec![],
            }],
        }];
        let patch = Patch::PatchSet { patch_set_name: "common".to_string() };
        apply(&patch, &mut ctx(&mut composite, &mut composed, &mut env), &patch_sets).unwrap();
        assert_eq!(composed["spec"]["size"], json!(1));
    }

    #[test]
    fn unknown_patch_set_errors() {
        let mut composite = json!({});
        let mut composed = json!({});
        let mut env = Environment::new();
        let patch = Patch::PatchSet { patch_set_name: "nope".to_string() };
        assert!(matches!(
            apply(&patch, &mut ctx(&mut composite, &mut composed, &mut env), &[]),
            Err(PatchError::PatchSetNotFound { .. })
        ));
    }

    #[test]
    fn identity_round_trip_without_transforms() {
        // spec.md §8 round-trip law: From then To on the same path is an
        // identity when no transforms are involved.
        let mut composite = json!({"spec": {"size": 7}});
        let mut composed = json!({});
        let mut env = Environment::new();
        let from = Patch::FromCompositeFieldPath {
            from_field_path: "spec.size".to_string(),
            to_field_path: Some("spec.size".to_string()),
            policy: None,
            transforms: vec![],
        };
        apply(&from, &mut ctx(&mut composite, &mut composed, &mut env), &[]).unwrap();

        let mut roundtrip_composite = json!({});
        let to = Patch::ToCompositeFieldPath {
            from_field_path: "spec.size".to_string(),
            to_field_path: Some("spec.size".to_string()),
            policy: None,
            transforms: vec![],
        };
        apply(&to, &mut ctx(&mut roundtrip_composite, &mut composed, &mut env), &[]).unwrap();
        assert_eq!(roundtrip_composite["spec"]["size"], composite["spec"]["size"]);
    }
}
