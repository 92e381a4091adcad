//! Evaluates a composed resource's [`ReadinessCheck`]s (spec.md §4.F step 8,
//! SPEC_FULL.md "Readiness check library"). Resources mode only — Pipeline
//! mode composed resources report readiness directly from the function
//! response (spec.md §4.E).
//!
//! A template with an empty `readiness_checks` list is ready as soon as it
//! exists; that default lives with the caller (the composite reconciler),
//! since this module only knows how to evaluate checks that are present.

use crossplane_core::composition::ReadinessCheck;
use serde_json::Value as Json;

use crate::error::Result;
use crate::fieldpath::{self, FieldPath};

pub fn is_ready(check: &ReadinessCheck, observed: &Json) -> Result<bool> {
    match check {
        ReadinessCheck::None => Ok(true),
        ReadinessCheck::NonEmpty { field_path } => {
            let value = get(observed, field_path)?;
            Ok(match value {
                None => false,
                Some(Json::Null) => false,
                Some(Json::String(s)) => !s.is_empty(),
                Some(Json::Array(a)) => !a.is_empty(),
                Some(Json::Object(o)) => !o.is_empty(),
                Some(_) => true,
            })
        }
        ReadinessCheck::MatchString { field_path, match_string } => {
            Ok(get(observed, field_path)?.and_then(Json::as_str) == Some(match_string.as_str()))
        }
        ReadinessCheck::MatchInteger { field_path, match_integer } => {
            Ok(get(observed, field_path)?.and_then(Json::as_i64) == Some(*match_integer))
        }
        ReadinessCheck::MatchTrue { field_path } => Ok(get(observed, field_path)?.and_then(Json::as_bool) == Some(true)),
        ReadinessCheck::MatchFalse { field_path } => {
            Ok(get(observed, field_path)?.and_then(Json::as_bool) == Some(false))
        }
        ReadinessCheck::MatchCondition { match_condition } => {
            let conditions = get(observed, "status.conditions")?
                .and_then(Json::as_array)
                .cloned()
                .unwrap_or_default();
            Ok(conditions.iter().any(|c| {
                c.get("type").and_then(Json::as_str) == Some(match_condition.condition_type.as_str())
                    && c.get("status").and_then(Json::as_str) == Some(match_condition.status.as_str())
            }))
        }
    }
}

/// All checks must pass; an empty list is handled by the caller, not here.
pub fn all_ready(checks: &[ReadinessCheck], observed: &Json) -> Result<bool> {
    for check in checks {
        if !is_ready(check, observed)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn get<'a>(doc: &'a Json, path: &str) -> Result<Option<&'a Json>> {
    let compiled = FieldPath::parse(path).map_err(|e| crate::error::PatchError::InvalidFieldPath {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    fieldpath::get(doc, &compiled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossplane_core::composition::MatchConditionReadiness;
    use serde_json::json;

    #[test]
    fn non_empty_rejects_missing_and_empty_string() {
        let check = ReadinessCheck::NonEmpty { field_path: "status.atProvider.arn".to_string() };
        assert!(!is_ready(&check, &json!({})).unwrap());
        assert!(!is_ready(&check, &json!({"status": {"atProvider": {"arn": ""}}})).unwrap());
        assert!(is_ready(&check, &json!({"status": {"atProvider": {"arn": "x"}}})).unwrap());
    }

    #[test]
    fn match_condition_checks_type_and_status() {
        let check = ReadinessCheck::MatchCondition {
            match_condition: MatchConditionReadiness { condition_type: "Ready".to_string(), status: "True".to_string() },
        };
        let observed = json!({"status": {"conditions": [{"type": "Ready", "status": "True"}]}});
        assert!(is_ready(&check, &observed).unwrap());

        let not_ready = json!({"status": {"conditions": [{"type": "Ready", "status": "False"}]}});
        assert!(!is_ready(&check, &not_ready).unwrap());
    }

    #[test]
    fn all_ready_requires_every_check() {
        let checks = vec![
            ReadinessCheck::MatchTrue { field_path: "status.a".to_string() },
            ReadinessCheck::MatchTrue { field_path: "status.b".to_string() },
        ];
        assert!(all_ready(&checks, &json!({"status": {"a": true, "b": true}})).unwrap());
        assert!(!all_ready(&checks, &json!({"status": {"a": true, "b": false}})).unwrap());
    }
}
