//! Evaluates a compiled [`FieldPath`](crate::parser::FieldPath) against a
//! `serde_json::Value` document: get, set and delete.
//!
//! This is the only place in the workspace that understands the bracket/index
//! grammar (`a.b[0].c`, `a[key=value].c`, `a[dotted.map.key]`) — everything
//! else operates on values already extracted by this module.

use serde_json::Value as Json;

use crate::error::{PatchError, Result};
use crate::parser::Segment;

pub use crate::parser::FieldPath;

/// Read the value at `path` within `doc`, or `None` if any intermediate
/// segment is absent. Type mismatches (e.g. indexing into a scalar) are
/// errors, not `None`, so a `Required` patch policy can distinguish "missing"
/// from "malformed".
pub fn get<'a>(doc: &'a Json, path: &FieldPath) -> Result<Option<&'a Json>> {
    let mut current = doc;
    for (i, segment) in path.0.iter().enumerate() {
        let described = describe_prefix(path, i + 1);
        match segment {
            Segment::Field(name) => match current {
                Json::Object(map) => match map.get(name) {
                    Some(v) => current = v,
                    None => return Ok(None),
                },
                Json::Null => return Ok(None),
                _ => return Err(PatchError::NotAnObject { path: described }),
            },
            Segment::MapKey(key) => match current {
                Json::Object(map) => match map.get(key) {
                    Some(v) => current = v,
                    None => return Ok(None),
                },
                Json::Null => return Ok(None),
                _ => return Err(PatchError::NotAnObject { path: described }),
            },
            Segment::Index(idx) => match current {
                Json::Array(items) => match items.get(*idx) {
                    Some(v) => current = v,
                    None => return Ok(None),
                },
                Json::Null => return Ok(None),
                _ => return Err(PatchError::NotAnArray { path: described }),
            },
            Segment::Filter { key, value } => match current {
                Json::Array(items) => {
                    match items.iter().find(|item| field_equals_str(item, key, value)) {
                        Some(v) => current = v,
                        None => return Ok(None),
                    }
                }
                Json::Null => return Ok(None),
                _ => return Err(PatchError::NotAnArray { path: described }),
            },
        }
    }
    Ok(Some(current))
}

/// Write `value` at `path` within `doc`, creating intermediate objects and
/// arrays as needed. A filter segment that matches no existing array element
/// appends a fresh object carrying `key: value` and descends into it, so
/// patches can both update and introduce array elements.
pub fn set(doc: &mut Json, path: &FieldPath, value: Json) -> Result<()> {
    set_segments(doc, &path.0, value)
}

fn set_segments(current: &mut Json, segments: &[Segment], value: Json) -> Result<()> {
    let Some((head, rest)) = segments.split_first() else {
        *current = value;
        return Ok(());
    };

    match head {
        Segment::Field(name) | Segment::MapKey(name) => {
            if !current.is_object() {
                *current = Json::Object(Default::default());
            }
            let map = current.as_object_mut().expect("just coerced to object");
            let entry = map.entry(name.clone()).or_insert(Json::Null);
            set_segments(entry, rest, value)
        }
        Segment::Index(idx) => {
            if !current.is_array() {
                *current = Json::Array(Vec::new());
            }
            let items = current.as_array_mut().expect("just coerced to array");
            while items.len() <= *idx {
                items.push(Json::Null);
            }
            set_segments(&mut items[*idx], rest, value)
        }
        Segment::Filter { key, value: filter_value } => {
            if !current.is_array() {
                *current = Json::Array(Vec::new());
            }
            let items = current.as_array_mut().expect("just coerced to array");
            let position = items.iter().position(|item| field_equals_str(item, key, filter_value));
            let index = match position {
                Some(i) => i,
                None => {
                    let mut obj = serde_json::Map::new();
                    obj.insert(key.clone(), Json::String(filter_value.clone()));
                    items.push(Json::Object(obj));
                    items.len() - 1
                }
            };
            set_segments(&mut items[index], rest, value)
        }
    }
}

/// Stringified comparison used by filter expressions: `[name=foo]` matches
/// both `"foo"` and the bare JSON value `foo` if it happens to be a string.
fn field_equals_str(item: &Json, key: &str, expected: &str) -> bool {
    match item.get(key) {
        Some(Json::String(s)) => s == expected,
        Some(other) => other.to_string().trim_matches('"') == expected,
        None => false,
    }
}

fn describe_prefix(path: &FieldPath, up_to: usize) -> String {
    path.0[..up_to]
        .iter()
        .map(segment_repr)
        .collect::<Vec<_>>()
        .join(".")
        .replace(".[", "[")
}

fn segment_repr(segment: &Segment) -> String {
    match segment {
        Segment::Field(f) => f.clone(),
        Segment::MapKey(k) => format!("[{k}]"),
        Segment::Index(i) => format!("[{i}]"),
        Segment::Filter { key, value } => format!("[{key}={value}]"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(s: &str) -> FieldPath {
        FieldPath::parse(s).unwrap()
    }

    #[test]
    fn get_plain_path() {
        let doc = json!({"spec": {"size": 3}});
        assert_eq!(get(&doc, &path("spec.size")).unwrap(), Some(&json!(3)));
    }

    #[test]
    fn get_missing_path_is_none() {
        let doc = json!({"spec": {}});
        assert_eq!(get(&doc, &path("spec.size")).unwrap(), None);
    }

    #[test]
    fn get_through_scalar_errors() {
        let doc = json!({"spec": 3});
        assert!(get(&doc, &path("spec.size")).is_err());
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let mut doc = json!({});
        set(&mut doc, &path("spec.forProvider.size"), json!(40)).unwrap();
        assert_eq!(doc, json!({"spec": {"forProvider": {"size": 40}}}));
    }

    #[test]
    fn set_grows_array_to_index() {
        let mut doc = json!({});
        set(&mut doc, &path("items[2]"), json!("x")).unwrap();
        assert_eq!(doc, json!({"items": [null, null, "x"]}));
    }

    #[test]
    fn get_filter_finds_matching_element() {
        let doc = json!({"containers": [{"name": "sidecar"}, {"name": "app", "image": "x"}]});
        assert_eq!(
            get(&doc, &path("containers[name=app].image")).unwrap(),
            Some(&json!("x"))
        );
    }

    #[test]
    fn set_filter_appends_when_no_match() {
        let mut doc = json!({"containers": []});
        set(&mut doc, &path("containers[name=app].image"), json!("y")).unwrap();
        assert_eq!(
            doc,
            json!({"containers": [{"name": "app", "image": "y"}]})
        );
    }

    #[test]
    fn set_filter_updates_existing_match() {
        let mut doc = json!({"containers": [{"name": "app", "image": "old"}]});
        set(&mut doc, &path("containers[name=app].image"), json!("new")).unwrap();
        assert_eq!(
            doc,
            json!({"containers": [{"name": "app", "image": "new"}]})
        );
    }

    #[test]
    fn get_map_key_with_dots() {
        let doc = json!({"labels": {"app.kubernetes.io/name": "demo"}});
        assert_eq!(
            get(&doc, &path("labels[app.kubernetes.io/name]")).unwrap(),
            Some(&json!("demo"))
        );
    }
}
