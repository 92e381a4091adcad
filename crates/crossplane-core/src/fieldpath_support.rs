//! Minimal dot-path get/set used internally by [`crate::environment::Environment`].
//!
//! This intentionally does not support the bracket/index grammar
//! (`a.b[0].c`, `a[key=value].c`) — that full grammar, and its compiled
//! representation, lives in the `crossplane-patch` crate's evaluator, which
//! is the only place that needs it.

use serde_json::Value as Json;

pub fn get_dotted<'a>(value: &'a Json, path: &str) -> Option<&'a Json> {
    let mut current = value;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = current.get(segment)?;
    }
    Some(current)
}

pub fn set_dotted(value: &mut Json, path: &str, new_value: Json) {
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    set_segments(value, &segments, new_value);
}

fn set_segments(value: &mut Json, segments: &[&str], new_value: Json) {
    let Some((head, rest)) = segments.split_first() else {
        *value = new_value;
        return;
    };
    if !value.is_object() {
        *value = Json::Object(Default::default());
    }
    let map = value.as_object_mut().expect("just coerced to object");
    let entry = map.entry(head.to_string()).or_insert(Json::Object(Default::default()));
    if rest.is_empty() {
        *entry = new_value;
    } else {
        set_segments(entry, rest, new_value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_and_set_round_trip() {
        let mut v = json!({});
        set_dotted(&mut v, "a.b", json!(3));
        assert_eq!(get_dotted(&v, "a.b").unwrap(), 3);
    }
}
