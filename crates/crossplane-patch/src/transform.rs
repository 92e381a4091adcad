//! Applies the transform FIFO pipeline (spec.md §4.D) to a patched value.
//!
//! Each [`Transform`] variant consumes a `Json` and produces a `Json`;
//! `apply_pipeline` folds the list in declared order. Transforms are pure and
//! side-effect-free — no transform ever reads or writes anything but its own
//! input value.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use base64::Engine as _;
use crossplane_core::patch_types::{
    ConvertTransform, FallbackTo, MapTransform, MatchPattern, MatchTransform, MathOp, MathTransform,
    RegexpTransform, StringConvertKind, StringJoin, StringTransform, StringTransformOp, Transform,
};
use regex::Regex;
use serde_json::Value as Json;
use sha2::{Digest, Sha256, Sha512};
use sha1::Sha1;

use crate::error::{PatchError, Result};

pub fn apply_pipeline(transforms: &[Transform], mut value: Json) -> Result<Json> {
    for t in transforms {
        value = apply_one(t, value)?;
    }
    Ok(value)
}

fn apply_one(transform: &Transform, value: Json) -> Result<Json> {
    match transform {
        Transform::Math { math } => apply_math(math, value),
        Transform::Map { map } => apply_map(map, value),
        Transform::Match { match_ } => apply_match(match_, value),
        Transform::String { string } => apply_string(string, value),
        Transform::Convert { convert } => apply_convert(*convert, value),
    }
}

fn as_i64(value: &Json, kind: &str) -> Result<i64> {
    value.as_i64().ok_or_else(|| PatchError::TransformFailed {
        kind: kind.to_string(),
        message: format!("expected an integer, got {value}"),
    })
}

fn apply_math(math: &MathTransform, value: Json) -> Result<Json> {
    let n = as_i64(&value, "math")?;
    let result = match math.op {
        MathOp::Multiply => {
            let factor = math.multiply.ok_or_else(|| PatchError::TransformFailed {
                kind: "math".to_string(),
                message: "multiply op requires a `multiply` factor".to_string(),
            })?;
            n * factor
        }
        MathOp::Clamp => {
            let mut clamped = n;
            if let Some(min) = math.clamp_min {
                clamped = clamped.max(min);
            }
            if let Some(max) = math.clamp_max {
                clamped = clamped.min(max);
            }
            clamped
        }
    };
    Ok(Json::Number(result.into()))
}

fn apply_map(map: &MapTransform, value: Json) -> Result<Json> {
    let key = match &value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    };
    map.pairs.get(&key).cloned().ok_or_else(|| PatchError::TransformFailed {
        kind: "map".to_string(),
        message: format!("no entry for key '{key}'"),
    })
}

fn apply_match(m: &MatchTransform, value: Json) -> Result<Json> {
    let input = match &value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    };

    for pattern in &m.patterns {
        let matched = match pattern {
            MatchPattern::Literal { literal, .. } => literal == &input,
            MatchPattern::Regexp { regexp, .. } => Regex::new(regexp)?.is_match(&input),
        };
        if matched {
            return Ok(match pattern {
                MatchPattern::Literal { result, .. } | MatchPattern::Regexp { result, .. } => result.clone(),
            });
        }
    }

    match (&m.fallback_to, &m.fallback_value) {
        (Some(FallbackTo::Input), _) | (None, None) => Ok(value),
        (_, Some(fallback)) => Ok(fallback.clone()),
    }
}

fn apply_string(s: &StringTransform, value: Json) -> Result<Json> {
    match &s.op {
        StringTransformOp::Format { fmt } => {
            let rendered = sprintf_one(fmt, &value)?;
            Ok(Json::String(rendered))
        }
        StringTransformOp::Convert { convert } => apply_string_convert(*convert, value),
        StringTransformOp::TrimPrefix { trim } => {
            let s = as_str(&value, "string.trimPrefix")?;
            Ok(Json::String(s.strip_prefix(trim.as_str()).unwrap_or(s).to_string()))
        }
        StringTransformOp::TrimSuffix { trim } => {
            let s = as_str(&value, "string.trimSuffix")?;
            Ok(Json::String(s.strip_suffix(trim.as_str()).unwrap_or(s).to_string()))
        }
        StringTransformOp::Regexp { regexp } => apply_string_regexp(regexp, value),
        StringTransformOp::Join { join } => apply_string_join(join, value),
    }
}

fn as_str(value: &Json, kind: &str) -> Result<&str> {
    value.as_str().ok_or_else(|| PatchError::TransformFailed {
        kind: kind.to_string(),
        message: format!("expected a string, got {value}"),
    })
}

/// A single-argument stand-in for Go's `fmt.Sprintf`: one `%s`/`%d` verb
/// substituted with `value`'s string/number representation.
fn sprintf_one(fmt: &str, value: &Json) -> Result<String> {
    let rendered = match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    };
    if let Some(pos) = fmt.find("%s").or_else(|| fmt.find("%d")) {
        let mut out = String::with_capacity(fmt.len() + rendered.len());
        out.push_str(&fmt[..pos]);
        out.push_str(&rendered);
        out.push_str(&fmt[pos + 2..]);
        Ok(out)
    } else {
        Ok(fmt.clone())
    }
}

fn apply_string_convert(kind: StringConvertKind, value: Json) -> Result<Json> {
    let s = as_str(&value, "string.convert").map(str::to_string);
    let result = match kind {
        StringConvertKind::ToUpper => Json::String(s?.to_uppercase()),
        StringConvertKind::ToLower => Json::String(s?.to_lowercase()),
        StringConvertKind::ToBase64 => {
            Json::String(base64::engine::general_purpose::STANDARD.encode(s?.as_bytes()))
        }
        StringConvertKind::FromBase64 => {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(s?.as_bytes())
                .map_err(|e| PatchError::TransformFailed {
                    kind: "string.convert.fromBase64".to_string(),
                    message: e.to_string(),
                })?;
            Json::String(String::from_utf8(decoded).map_err(|e| PatchError::TransformFailed {
                kind: "string.convert.fromBase64".to_string(),
                message: e.to_string(),
            })?)
        }
        StringConvertKind::ToJson => Json::String(serde_json::to_string(&value)?),
        StringConvertKind::ToSha1 => {
            let mut hasher = Sha1::new();
            hasher.update(s?.as_bytes());
            Json::String(hex::encode(hasher.finalize()))
        }
        StringConvertKind::ToSha256 => {
            let mut hasher = Sha256::new();
            hasher.update(s?.as_bytes());
            Json::String(hex::encode(hasher.finalize()))
        }
        StringConvertKind::ToSha512 => {
            let mut hasher = Sha512::new();
            hasher.update(s?.as_bytes());
            Json::String(hex::encode(hasher.finalize()))
        }
        StringConvertKind::ToAdler32 => {
            let mut hasher = DefaultHasher::new();
            s?.hash(&mut hasher);
            Json::String(format!("{:x}", hasher.finish() as u32))
        }
    };
    Ok(result)
}

fn apply_string_regexp(r: &RegexpTransform, value: Json) -> Result<Json> {
    let s = as_str(&value, "string.regexp")?;
    let re = Regex::new(&r.pattern)?;
    let captures = re.captures(s).ok_or_else(|| PatchError::TransformFailed {
        kind: "string.regexp".to_string(),
        message: format!("pattern '{}' did not match '{}'", r.pattern, s),
    })?;
    let group = r.group.unwrap_or(0) as usize;
    let matched = captures.get(group).ok_or_else(|| PatchError::TransformFailed {
        kind: "string.regexp".to_string(),
        message: format!("no capture group {group}"),
    })?;
    Ok(Json::String(matched.as_str().to_string()))
}

fn apply_string_join(join: &StringJoin, value: Json) -> Result<Json> {
    let items = value.as_array().ok_or_else(|| PatchError::TransformFailed {
        kind: "string.join".to_string(),
        message: format!("expected an array, got {value}"),
    })?;
    let parts: Vec<String> = items
        .iter()
        .map(|v| match v {
            Json::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    Ok(Json::String(parts.join(&join.separator)))
}

fn apply_convert(kind: ConvertTransform, value: Json) -> Result<Json> {
    let result = match kind {
        ConvertTransform::ToString => Json::String(match &value {
            Json::String(s) => s.clone(),
            other => other.to_string(),
        }),
        ConvertTransform::ToInt | ConvertTransform::ToInt64 => {
            let n = match &value {
                Json::Number(n) => n.as_i64().ok_or_else(|| PatchError::TransformFailed {
                    kind: "convert".to_string(),
                    message: format!("{value} is not an integer"),
                })?,
                Json::String(s) => s.trim().parse::<i64>().map_err(|e| PatchError::TransformFailed {
                    kind: "convert".to_string(),
                    message: e.to_string(),
                })?,
                Json::Bool(b) => *b as i64,
                other => {
                    return Err(PatchError::TransformFailed {
                        kind: "convert".to_string(),
                        message: format!("cannot convert {other} to int"),
                    });
                }
            };
            Json::Number(n.into())
        }
        ConvertTransform::ToBool => {
            let b = match &value {
                Json::Bool(b) => *b,
                Json::String(s) => s.parse::<bool>().map_err(|e| PatchError::TransformFailed {
                    kind: "convert".to_string(),
                    message: e.to_string(),
                })?,
                other => {
                    return Err(PatchError::TransformFailed {
                        kind: "convert".to_string(),
                        message: format!("cannot convert {other} to bool"),
                    });
                }
            };
            Json::Bool(b)
        }
        ConvertTransform::ToFloat64 => {
            let f = match &value {
                Json::Number(n) => n.as_f64().ok_or_else(|| PatchError::TransformFailed {
                    kind: "convert".to_string(),
                    message: format!("{value} is not a number"),
                })?,
                Json::String(s) => s.trim().parse::<f64>().map_err(|e| PatchError::TransformFailed {
                    kind: "convert".to_string(),
                    message: e.to_string(),
                })?,
                other => {
                    return Err(PatchError::TransformFailed {
                        kind: "convert".to_string(),
                        message: format!("cannot convert {other} to float64"),
                    });
                }
            };
            serde_json::Number::from_f64(f)
                .map(Json::Number)
                .ok_or_else(|| PatchError::TransformFailed {
                    kind: "convert".to_string(),
                    message: "not a finite float".to_string(),
                })?
        }
        ConvertTransform::ToObject => {
            if value.is_object() {
                value
            } else {
                return Err(PatchError::TransformFailed {
                    kind: "convert".to_string(),
                    message: format!("{value} is not an object"),
                });
            }
        }
        ConvertTransform::ToArray => {
            if value.is_array() {
                value
            } else {
                return Err(PatchError::TransformFailed {
                    kind: "convert".to_string(),
                    message: format!("{value} is not an array"),
                });
            }
        }
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use serde_json::json;

    #[test]
    fn math_multiply() {
        let t = Transform::Math {
            math: MathTransform { op: MathOp::Multiply, multiply: Some(2), clamp_min: None, clamp_max: None },
        };
        assert_eq!(apply_one(&t, json!(20)).unwrap(), json!(40));
    }

    #[test]
    fn math_clamp() {
        let t = Transform::Math {
            math: MathTransform { op: MathOp::Clamp, multiply: None, clamp_min: Some(1), clamp_max: Some(10) },
        };
        assert_eq!(apply_one(&t, json!(100)).unwrap(), json!(10));
        assert_eq!(apply_one(&t, json!(-5)).unwrap(), json!(1));
    }

    #[test]
    fn map_lookup() {
        let mut pairs = IndexMap::new();
        pairs.insert("small".to_string(), json!(1));
        pairs.insert("large".to_string(), json!(10));
        let t = Transform::Map { map: MapTransform { pairs } };
        assert_eq!(apply_one(&t, json!("large")).unwrap(), json!(10));
        assert!(apply_one(&t, json!("huge")).is_err());
    }

    #[test]
    fn match_first_literal_wins() {
        let t = Transform::Match {
            match_: MatchTransform {
                patterns: vec![
                    MatchPattern::Literal { literal: "a".into(), result: json!(1) },
                    MatchPattern::Regexp { regexp: "^a.*".into(), result: json!(2) },
                ],
                fallback_value: Some(json!(0)),
                fallback_to: None,
            },
        };
        assert_eq!(apply_one(&t, json!("a")).unwrap(), json!(1));
        assert_eq!(apply_one(&t, json!("abc")).unwrap(), json!(2));
        assert_eq!(apply_one(&t, json!("z")).unwrap(), json!(0));
    }

    #[test]
    fn string_to_upper() {
        let t = Transform::String {
            string: StringTransform { op: StringTransformOp::Convert { convert: StringConvertKind::ToUpper } },
        };
        assert_eq!(apply_one(&t, json!("abc")).unwrap(), json!("ABC"));
    }

    #[test]
    fn string_base64_round_trips() {
        let enc = Transform::String {
            string: StringTransform { op: StringTransformOp::Convert { convert: StringConvertKind::ToBase64 } },
        };
        let dec = Transform::String {
            string: StringTransform { op: StringTransformOp::Convert { convert: StringConvertKind::FromBase64 } },
        };
        let encoded = apply_one(&enc, json!("hello")).unwrap();
        assert_eq!(apply_one(&dec, encoded).unwrap(), json!("hello"));
    }

    #[test]
    fn convert_to_int_from_string() {
        let t = Transform::Convert { convert: ConvertTransform::ToInt };
        assert_eq!(apply_one(&t, json!("42")).unwrap(), json!(42));
    }

    #[test]
    fn pipeline_applies_in_order() {
        let transforms = vec![
            Transform::Math { math: MathTransform { op: MathOp::Multiply, multiply: Some(2), clamp_min: None, clamp_max: None } },
            Transform::Convert { convert: ConvertTransform::ToString },
        ];
        assert_eq!(apply_pipeline(&transforms, json!(21)).unwrap(), json!("42"));
    }
}
